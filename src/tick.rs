//! Periodic tick sources.
//!
//! On hardware the tick comes from a timer interrupt. [`IntervalTickSource`]
//! stands in for it on hosted targets by running the tick callback from a
//! tokio task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "logging")]
use log::debug;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::errors::TimerError;

/// Something that calls a function at a fixed frequency and keeps a
/// monotonic clock.
pub trait TickSource {
    /// Starts calling `on_tick` `frequency_hz` times per second. A source
    /// that is already running is restarted.
    fn start<F>(&mut self, frequency_hz: u32, on_tick: F) -> Result<(), TimerError>
    where
        F: FnMut() + Send + 'static;

    /// Stops delivering ticks. The counters keep their values.
    fn stop(&mut self);

    /// Ticks delivered since the last successful `start`.
    fn elapsed_ticks(&self) -> u64;

    /// Milliseconds since the last successful `start`, or 0 if never started.
    fn elapsed_ms(&self) -> u64;
}

/// Tick source driven by [`tokio::time::interval`].
///
/// Late ticks are delivered in a burst rather than skipped, so the tick
/// count tracks elapsed time.
#[derive(Default)]
pub struct IntervalTickSource {
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
    started_at: Option<Instant>,
}

impl IntervalTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl TickSource for IntervalTickSource {
    fn start<F>(&mut self, frequency_hz: u32, mut on_tick: F) -> Result<(), TimerError>
    where
        F: FnMut() + Send + 'static,
    {
        if frequency_hz == 0 {
            return Err(TimerError::InvalidParameter(
                "Tick frequency must be greater than zero.".into(),
            ));
        }
        let period = Duration::from_nanos(1_000_000_000 / u64::from(frequency_hz));
        if period.is_zero() {
            return Err(TimerError::InvalidParameter(
                "Tick frequency is too high for a nanosecond period.".into(),
            ));
        }
        let runtime = Handle::try_current().map_err(|_| TimerError::TickSourceUnavailable)?;

        self.stop();

        let started_at = Instant::now();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);

        #[cfg(feature = "logging")]
        debug!("Starting tick source at {} Hz.", frequency_hz);

        self.handle = Some(runtime.spawn(async move {
            let mut interval = time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                counter.fetch_add(1, Ordering::Relaxed);
                on_tick();
            }
        }));
        self.ticks = ticks;
        self.started_at = Some(started_at);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            #[cfg(feature = "logging")]
            debug!("Stopping tick source.");
            handle.abort();
        }
    }

    fn elapsed_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Drop for IntervalTickSource {
    fn drop(&mut self) {
        self.stop();
    }
}
