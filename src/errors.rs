//! Error handling module for slot-timer.

use thiserror::Error;

use crate::timer::TimerId;

/// Custom error type for timer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Every timer slot is already allocated.
    #[error("All {0} timer slots are allocated.")]
    CapacityExhausted(usize),

    /// The id is out of range or its slot is not allocated.
    #[error("Timer {0} is out of range or not allocated.")]
    InvalidHandle(TimerId),

    /// The command queue had no room and the caller asked not to wait.
    #[error("Command queue is full.")]
    QueueFull,

    /// The command queue stayed full for the whole wait period.
    #[error("Timed out waiting for room in the command queue.")]
    EnqueueTimeout,

    /// The other end of the command queue is gone.
    #[error("Command queue is closed.")]
    QueueClosed,

    /// A tick source could not find a runtime to drive it.
    #[error("Tick source requires a running tokio runtime.")]
    TickSourceUnavailable,
}
