use std::fmt;
use std::sync::Arc;

/// Identifies a timer by the index of the slot it occupies.
///
/// Ids stay valid until the timer is removed, after which the slot (and the
/// id) can be handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimerId(usize);

impl TimerId {
    /// Wraps a raw slot index. The index is not checked against any manager.
    pub const fn new(index: usize) -> Self {
        TimerId(index)
    }

    /// The slot index this id refers to.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents the state of a timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Not owned by any timer.
    Free,
    /// Owned and counting down.
    Active,
    /// Owned but stopped: cancelled, or a one-shot that already fired.
    Inactive,
}

/// One fixed entry of the timer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSlot {
    pub(crate) allocated: bool,
    pub(crate) active: bool,
    pub(crate) timeout_ms: u32,
    pub(crate) ticks_left: u64,
    pub(crate) auto_reload: bool,
}

impl TimerSlot {
    pub(crate) const FREE: TimerSlot = TimerSlot {
        allocated: false,
        active: false,
        timeout_ms: 0,
        ticks_left: 0,
        auto_reload: false,
    };

    /// Lifecycle state derived from the allocation and activity flags.
    pub fn state(&self) -> SlotState {
        match (self.allocated, self.active) {
            (false, _) => SlotState::Free,
            (true, true) => SlotState::Active,
            (true, false) => SlotState::Inactive,
        }
    }

    /// Whether a timer owns this slot.
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Whether the slot is counting down.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Configured period in milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Ticks remaining until the next expiry.
    pub fn ticks_left(&self) -> u64 {
        self.ticks_left
    }

    /// Whether the timer rearms itself after expiring.
    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }
}

/// A trait for timer expiry callbacks.
///
/// The callback runs in whatever context drives the tick: an interrupt
/// handler, a tick task or the command-queue service loop. Keep it short and
/// non-blocking.
pub trait TimeoutCallback: Send + Sync {
    /// Called once per expiry with the id of the timer that fired.
    fn on_timeout(&self, id: TimerId);
}

impl<F> TimeoutCallback for F
where
    F: Fn(TimerId) + Send + Sync,
{
    fn on_timeout(&self, id: TimerId) {
        self(id)
    }
}

/// Installed callbacks are shared so a tick batch can hold its own handle
/// while the callback is being replaced.
pub type SharedCallback = Arc<dyn TimeoutCallback>;
