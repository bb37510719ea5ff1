use std::sync::Arc;
#[cfg(feature = "logging")]
use log::{debug, warn};

use crate::errors::TimerError;
use crate::timer::{SharedCallback, TimeoutCallback, TimerId, TimerSlot};

/// Tick frequency used by [`TimerManager::default`].
pub const DEFAULT_TICK_FREQUENCY_HZ: u32 = 1000;

/// Counters maintained by the tick step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStatistics {
    /// Number of ticks processed since construction.
    pub ticks_processed: u64,
    /// Number of expiries recorded, whether or not a callback was installed.
    pub expirations: u64,
}

/// Timers that expired during one tick, in ascending id order.
///
/// Holds its own handle to the callback that was installed when the tick was
/// scanned, so it can be dispatched after any lock around the manager has
/// been released.
pub struct ExpiryBatch<const CAPACITY: usize> {
    ids: [TimerId; CAPACITY],
    len: usize,
    callback: Option<SharedCallback>,
}

impl<const CAPACITY: usize> ExpiryBatch<CAPACITY> {
    pub fn ids(&self) -> &[TimerId] {
        &self.ids[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Invokes the captured callback once per expired id.
    pub fn dispatch(self) {
        if let Some(cb) = &self.callback {
            for &id in self.ids() {
                cb.on_timeout(id);
            }
        }
    }
}

/// A fixed table of `CAPACITY` countdown timers advanced by [`process_tick`].
///
/// The manager does no synchronization of its own. Either keep it in a
/// single context, or hand it to
/// [`LockingAdapter`](crate::locking::LockingAdapter) or
/// [`command_queue`](crate::queue::command_queue).
///
/// [`process_tick`]: TimerManager::process_tick
pub struct TimerManager<const CAPACITY: usize> {
    slots: [TimerSlot; CAPACITY],
    tick_frequency_hz: u32,
    callback: Option<SharedCallback>,
    statistics: TimerStatistics,
}

impl<const CAPACITY: usize> TimerManager<CAPACITY> {
    /// Creates a manager whose timeouts are converted to ticks at
    /// `tick_frequency_hz`.
    pub fn new(tick_frequency_hz: u32) -> Result<Self, TimerError> {
        if tick_frequency_hz == 0 {
            return Err(TimerError::InvalidParameter(
                "Tick frequency must be greater than zero.".into(),
            ));
        }
        Ok(Self::with_frequency(tick_frequency_hz))
    }

    /// Empty table at an already validated, non-zero frequency.
    fn with_frequency(tick_frequency_hz: u32) -> Self {
        TimerManager {
            slots: [TimerSlot::FREE; CAPACITY],
            tick_frequency_hz,
            callback: None,
            statistics: TimerStatistics::default(),
        }
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Tick rate used to convert milliseconds to ticks.
    pub fn tick_frequency_hz(&self) -> u32 {
        self.tick_frequency_hz
    }

    /// Copy of the slot behind `id`, or `None` if the id is out of range.
    pub fn slot(&self, id: TimerId) -> Option<TimerSlot> {
        self.slots.get(id.index()).copied()
    }

    /// Number of slots currently owned by a timer.
    pub fn allocated_count(&self) -> usize {
        self.slots.iter().filter(|s| s.allocated).count()
    }

    /// Counters accumulated since construction.
    pub fn statistics(&self) -> TimerStatistics {
        self.statistics
    }

    /// Allocates the lowest free slot and starts counting down.
    pub fn add_new(&mut self, timeout_ms: u32, auto_reload: bool) -> Result<TimerId, TimerError> {
        let Some(ix) = self.slots.iter().position(|s| !s.allocated) else {
            #[cfg(feature = "logging")]
            warn!("No free timer slot for a {}ms timer.", timeout_ms);
            return Err(TimerError::CapacityExhausted(CAPACITY));
        };

        self.slots[ix] = TimerSlot {
            allocated: true,
            active: true,
            timeout_ms,
            ticks_left: self.compute_ticks(timeout_ms),
            auto_reload,
        };
        #[cfg(feature = "logging")]
        debug!("Timer {} added ({}ms, auto_reload={}).", ix, timeout_ms, auto_reload);
        Ok(TimerId::new(ix))
    }

    /// Stops the timer but keeps its slot and configured timeout.
    ///
    /// Clears auto-reload: a resumed timer runs as a one-shot.
    pub fn cancel_timer(&mut self, id: TimerId) -> Result<(), TimerError> {
        let slot = self.allocated_mut(id)?;
        slot.active = false;
        slot.ticks_left = 0;
        slot.auto_reload = false;
        Ok(())
    }

    /// Frees the slot so the id can be handed out again.
    pub fn remove_timer(&mut self, id: TimerId) -> Result<(), TimerError> {
        let slot = self.allocated_mut(id)?;
        *slot = TimerSlot::FREE;
        #[cfg(feature = "logging")]
        debug!("Timer {} removed.", id);
        Ok(())
    }

    /// Sets a new timeout and restarts the countdown from it. Does not
    /// change whether the timer is active.
    pub fn change_timeout(&mut self, id: TimerId, new_timeout_ms: u32) -> Result<(), TimerError> {
        let ticks = self.compute_ticks(new_timeout_ms);
        let slot = self.allocated_mut(id)?;
        slot.timeout_ms = new_timeout_ms;
        slot.ticks_left = ticks;
        Ok(())
    }

    /// Restarts the countdown from the stored timeout and marks the timer
    /// active.
    pub fn resume(&mut self, id: TimerId) -> Result<(), TimerError> {
        let freq = self.tick_frequency_hz;
        let slot = self.allocated_mut(id)?;
        slot.ticks_left = ticks_for(freq, slot.timeout_ms);
        slot.active = true;
        Ok(())
    }

    /// Installs the expiry callback, returning the one it replaces.
    pub fn on_timeout_event<C>(&mut self, callback: C) -> Option<SharedCallback>
    where
        C: TimeoutCallback + 'static,
    {
        self.install_callback(Arc::new(callback))
    }

    /// Installs an already shared callback, returning the one it replaces.
    pub fn install_callback(&mut self, callback: SharedCallback) -> Option<SharedCallback> {
        self.callback.replace(callback)
    }

    /// Runs one tick: scans the table and invokes the callback for every
    /// timer that expired.
    ///
    /// Bounded by `CAPACITY`, never allocates and never blocks.
    pub fn process_tick(&mut self) {
        self.collect_expired().dispatch();
    }

    /// Scanning half of [`process_tick`](Self::process_tick).
    ///
    /// Advances every active timer by one tick and returns the expired ids
    /// together with the current callback, without invoking it.
    pub fn collect_expired(&mut self) -> ExpiryBatch<CAPACITY> {
        let mut batch = ExpiryBatch {
            ids: [TimerId::default(); CAPACITY],
            len: 0,
            callback: self.callback.clone(),
        };
        let freq = self.tick_frequency_hz;

        for (ix, slot) in self.slots.iter_mut().enumerate() {
            if !slot.allocated || !slot.active {
                continue;
            }

            slot.ticks_left = slot.ticks_left.saturating_sub(1);
            if slot.ticks_left != 0 {
                continue;
            }

            batch.ids[batch.len] = TimerId::new(ix);
            batch.len += 1;

            if slot.auto_reload {
                slot.ticks_left = ticks_for(freq, slot.timeout_ms);
            } else {
                slot.active = false;
            }
        }

        self.statistics.ticks_processed += 1;
        self.statistics.expirations += batch.len as u64;
        batch
    }

    fn compute_ticks(&self, timeout_ms: u32) -> u64 {
        ticks_for(self.tick_frequency_hz, timeout_ms)
    }

    fn allocated_mut(&mut self, id: TimerId) -> Result<&mut TimerSlot, TimerError> {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.allocated => Ok(slot),
            _ => Err(TimerError::InvalidHandle(id)),
        }
    }
}

impl<const CAPACITY: usize> Default for TimerManager<CAPACITY> {
    fn default() -> Self {
        Self::with_frequency(DEFAULT_TICK_FREQUENCY_HZ)
    }
}

/// Ticks in `timeout_ms` at `freq` Hz, truncated toward zero.
fn ticks_for(freq: u32, timeout_ms: u32) -> u64 {
    (u64::from(freq) * u64::from(timeout_ms)) / 1000
}
