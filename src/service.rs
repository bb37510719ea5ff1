//! One interface over the locking and queued front ends, so callers (and
//! tick sources) can be written once for either concurrency regime.

use async_trait::async_trait;

use crate::errors::TimerError;
use crate::locking::{LockingAdapter, Serializing};
use crate::queue::{TimerClient, Wait};
use crate::timer::{SharedCallback, TimerId};

/// A thread-safe handle to a timer table.
#[async_trait]
pub trait TimerService: Send + Sync {
    async fn add_timer(&self, timeout_ms: u32, auto_reload: bool) -> Result<TimerId, TimerError>;

    async fn cancel_timer(&self, id: TimerId) -> Result<(), TimerError>;

    async fn remove_timer(&self, id: TimerId) -> Result<(), TimerError>;

    async fn resume_timer(&self, id: TimerId) -> Result<(), TimerError>;

    async fn change_timeout(&self, id: TimerId, new_timeout_ms: u32) -> Result<(), TimerError>;

    async fn set_timeout_callback(&self, callback: SharedCallback) -> Result<(), TimerError>;

    /// Advances the table by one tick without waiting. Suitable for a tick
    /// source callback.
    fn process_tick(&self) -> Result<(), TimerError>;
}

#[async_trait]
impl<const CAPACITY: usize, L> TimerService for LockingAdapter<CAPACITY, L>
where
    L: Serializing + Send + Sync,
{
    async fn add_timer(&self, timeout_ms: u32, auto_reload: bool) -> Result<TimerId, TimerError> {
        LockingAdapter::add_timer(self, timeout_ms, auto_reload)
    }

    async fn cancel_timer(&self, id: TimerId) -> Result<(), TimerError> {
        LockingAdapter::cancel_timer(self, id)
    }

    async fn remove_timer(&self, id: TimerId) -> Result<(), TimerError> {
        LockingAdapter::remove_timer(self, id)
    }

    async fn resume_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.resume(id)
    }

    async fn change_timeout(&self, id: TimerId, new_timeout_ms: u32) -> Result<(), TimerError> {
        LockingAdapter::change_timeout(self, id, new_timeout_ms)
    }

    async fn set_timeout_callback(&self, callback: SharedCallback) -> Result<(), TimerError> {
        self.install_callback(callback);
        Ok(())
    }

    fn process_tick(&self) -> Result<(), TimerError> {
        self.process_tick_from_task();
        Ok(())
    }
}

/// Waits indefinitely for queue room and for each command to be applied.
#[async_trait]
impl TimerService for TimerClient {
    async fn add_timer(&self, timeout_ms: u32, auto_reload: bool) -> Result<TimerId, TimerError> {
        let pending = self
            .request_add_timer(timeout_ms, auto_reload, Wait::Forever)
            .await?;
        pending.wait().await?.value
    }

    async fn cancel_timer(&self, id: TimerId) -> Result<(), TimerError> {
        let pending = self.request_cancel_timer(id, Wait::Forever).await?;
        pending.wait().await?.value
    }

    async fn remove_timer(&self, id: TimerId) -> Result<(), TimerError> {
        let pending = self.request_remove_timer(id, Wait::Forever).await?;
        pending.wait().await?.value
    }

    async fn resume_timer(&self, id: TimerId) -> Result<(), TimerError> {
        let pending = self.request_resume(id, Wait::Forever).await?;
        pending.wait().await?.value
    }

    async fn change_timeout(&self, id: TimerId, new_timeout_ms: u32) -> Result<(), TimerError> {
        let pending = self
            .request_change_timeout(id, new_timeout_ms, Wait::Forever)
            .await?;
        pending.wait().await?.value
    }

    async fn set_timeout_callback(&self, callback: SharedCallback) -> Result<(), TimerError> {
        let pending = self
            .request_shared_callback_install(callback, Wait::Forever)
            .await?;
        pending.wait().await.map(|_| ())
    }

    fn process_tick(&self) -> Result<(), TimerError> {
        self.request_process_tick_from_isr()
    }
}
