//! # slot-timer
//! A fixed number of countdown timers advanced by a periodic tick, with
//! front ends for sharing them between tasks and interrupt handlers.
//!
//! - [`TimerManager`]: the timer table itself. No locking, no allocation on
//!   the tick path.
//! - [`LockingAdapter`]: guards the table with a critical section.
//! - [`command_queue`]: funnels every mutation, ticks included, through a
//!   bounded FIFO served by one [`TimerServer`].
//! - [`IntervalTickSource`]: drives ticks from a tokio interval on hosted
//!   targets.
//!
//! ```
//! use slot_timer::{TimerId, TimerManager};
//!
//! let mut timers = TimerManager::<8>::new(1000).unwrap();
//! timers.on_timeout_event(|id: TimerId| println!("timer {id} fired"));
//! let id = timers.add_new(100, false).unwrap();
//! for _ in 0..100 {
//!     timers.process_tick();
//! }
//! assert!(!timers.slot(id).unwrap().is_active());
//! ```

pub mod errors;
pub mod locking;
pub mod manager;
pub mod queue;
pub mod service;
pub mod tick;
pub mod timer;

pub use errors::TimerError;
pub use locking::{CriticalRegion, ExclusiveRegion, LockingAdapter, NoLock, Serializing};
pub use manager::{ExpiryBatch, TimerManager, TimerStatistics, DEFAULT_TICK_FREQUENCY_HZ};
pub use queue::{
    command_queue, Completion, Pending, Serviced, TimerClient, TimerServer, Wait,
    DEFAULT_QUEUE_DEPTH,
};
pub use service::TimerService;
pub use tick::{IntervalTickSource, TickSource};
pub use timer::{SharedCallback, SlotState, TimeoutCallback, TimerId, TimerSlot};
