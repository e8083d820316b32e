//! `queue` crate — the messages that drive the workflow engine and the
//! in-process queue that delivers them.
//!
//! Messages are delivered one at a time: the receiver loop awaits the
//! handler before pulling the next message.

pub mod error;
pub mod messages;
pub mod receiver;

pub use error::QueueError;
pub use messages::{Message, PodMessage, WorkflowAction, WorkflowMessage};
pub use receiver::{MessageDispatcher, MessageHandler, MessageQueue, QueueHandle};
