//! Critical-section wrapper around a [`TimerManager`].
//!
//! Every call takes an exclusive region for as long as it touches the timer
//! table. Tick processing only holds the region for the scan; the expiry
//! callback runs after the region is released, so it may call back into the
//! adapter.

use std::cell::RefCell;
use std::sync::Arc;

use crate::errors::TimerError;
use crate::manager::{TimerManager, TimerStatistics};
use crate::timer::{SharedCallback, TimeoutCallback, TimerId, TimerSlot};

/// Enter/exit discipline for the exclusive region guarding the manager.
///
/// Task code and interrupt handlers get separate entry points because many
/// targets need different primitives for the two.
pub trait ExclusiveRegion {
    /// Runs `f` inside the region from task context.
    fn enter<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Runs `f` inside the region from interrupt context.
    fn enter_from_isr<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// Marker for regions that really exclude every other context.
///
/// # Safety
///
/// While one `enter`/`enter_from_isr` closure is running, no other call to
/// either method on any clone of the region may run its closure, from any
/// thread or interrupt.
pub unsafe trait Serializing: ExclusiveRegion {}

/// Region backed by the `critical-section` crate.
///
/// On bare-metal targets the installed implementation masks interrupts, so
/// the same primitive serves both entry points. The hosted implementation is
/// a process-wide lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriticalRegion;

impl ExclusiveRegion for CriticalRegion {
    fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| f())
    }

    fn enter_from_isr<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| f())
    }
}

unsafe impl Serializing for CriticalRegion {}

/// No-op region for single-context firmware.
///
/// An adapter over `NoLock` is not `Sync`, so it cannot be shared between
/// threads; reaching it from an interrupt handler and a task at the same
/// time is the caller's responsibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl ExclusiveRegion for NoLock {
    fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    fn enter_from_isr<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

/// Serializes access to one [`TimerManager`] through an [`ExclusiveRegion`].
pub struct LockingAdapter<const CAPACITY: usize, L = CriticalRegion> {
    region: L,
    manager: RefCell<TimerManager<CAPACITY>>,
}

// SAFETY: the manager is only borrowed inside the region, and `Serializing`
// guarantees at most one context is inside it at a time.
unsafe impl<const CAPACITY: usize, L> Sync for LockingAdapter<CAPACITY, L> where
    L: Serializing + Sync
{
}

impl<const CAPACITY: usize> LockingAdapter<CAPACITY, CriticalRegion> {
    /// Wraps `manager` in a critical-section guarded adapter.
    pub fn new(manager: TimerManager<CAPACITY>) -> Self {
        Self::with_region(manager, CriticalRegion)
    }
}

impl<const CAPACITY: usize, L: ExclusiveRegion> LockingAdapter<CAPACITY, L> {
    /// Wraps `manager` behind a caller supplied exclusive region.
    pub fn with_region(manager: TimerManager<CAPACITY>, region: L) -> Self {
        LockingAdapter {
            region,
            manager: RefCell::new(manager),
        }
    }

    /// Allocates and starts a timer.
    pub fn add_timer(&self, timeout_ms: u32, auto_reload: bool) -> Result<TimerId, TimerError> {
        self.with_manager(|m| m.add_new(timeout_ms, auto_reload))
    }

    /// Stops a timer without releasing its slot.
    pub fn cancel_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.with_manager(|m| m.cancel_timer(id))
    }

    /// Stops a timer and frees its slot.
    pub fn remove_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.with_manager(|m| m.remove_timer(id))
    }

    /// Sets a new period and restarts the countdown.
    pub fn change_timeout(&self, id: TimerId, new_timeout_ms: u32) -> Result<(), TimerError> {
        self.with_manager(|m| m.change_timeout(id, new_timeout_ms))
    }

    /// Restarts a timer with its configured period.
    pub fn resume(&self, id: TimerId) -> Result<(), TimerError> {
        self.with_manager(|m| m.resume(id))
    }

    /// Installs the expiry callback. It is allocated before entering the
    /// region and the replaced one is dropped after leaving it.
    pub fn set_timeout_callback<C>(&self, callback: C)
    where
        C: TimeoutCallback + 'static,
    {
        self.install_callback(Arc::new(callback));
    }

    /// Installs an already shared expiry callback.
    pub fn install_callback(&self, callback: SharedCallback) {
        let previous = self.with_manager(|m| m.install_callback(callback));
        drop(previous);
    }

    /// Tick entry point for interrupt handlers.
    pub fn process_tick_from_isr(&self) {
        let batch = self
            .region
            .enter_from_isr(|| self.manager.borrow_mut().collect_expired());
        batch.dispatch();
    }

    /// Tick entry point for task context.
    pub fn process_tick_from_task(&self) {
        let batch = self.with_manager(|m| m.collect_expired());
        batch.dispatch();
    }

    /// Copy of the slot behind `id`.
    pub fn slot(&self, id: TimerId) -> Option<TimerSlot> {
        self.with_manager(|m| m.slot(id))
    }

    /// Counters accumulated by the wrapped manager.
    pub fn statistics(&self) -> TimerStatistics {
        self.with_manager(|m| m.statistics())
    }

    /// Takes the manager back out of the adapter.
    pub fn into_inner(self) -> TimerManager<CAPACITY> {
        self.manager.into_inner()
    }

    fn with_manager<R>(&self, f: impl FnOnce(&mut TimerManager<CAPACITY>) -> R) -> R {
        self.region.enter(|| f(&mut self.manager.borrow_mut()))
    }
}
