//! Queue-level error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The receiving side of the queue has gone away.
    #[error("message queue is closed")]
    Closed,
}
