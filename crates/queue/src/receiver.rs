//! In-process message queue.
//!
//! [`MessageQueue::new`] returns the queue and a cloneable
//! [`MessageDispatcher`]. Once started, the queue hands every message to a
//! [`MessageHandler`] and waits for it to finish before taking the next one.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{Message, QueueError};

/// Receives every message taken off the queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: Message);
}

// ---------------------------------------------------------------------------
// MessageDispatcher
// ---------------------------------------------------------------------------

/// Sending side of the queue.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageDispatcher {
    pub fn send(&self, msg: impl Into<Message>) -> Result<(), QueueError> {
        let msg = msg.into();
        debug!("dispatching {:?}", msg);
        self.tx.send(msg).map_err(|_| QueueError::Closed)
    }
}

// ---------------------------------------------------------------------------
// MessageQueue
// ---------------------------------------------------------------------------

pub struct MessageQueue {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl MessageQueue {
    pub fn new() -> (Self, MessageDispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, MessageDispatcher { tx })
    }

    /// Spawn the receiver loop on the current tokio runtime.
    pub fn start(self, handler: Arc<dyn MessageHandler>) -> QueueHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(self.rx, handler, stop_rx));
        info!("message queue started");
        QueueHandle { stop_tx, task }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Message>,
    handler: Arc<dyn MessageHandler>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            next = rx.recv() => match next {
                Some(msg) => handler.handle(msg).await,
                None => break,
            },
        }
    }
    info!("message queue stopped");
}

/// Controls a started queue.
pub struct QueueHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl QueueHandle {
    /// Ask the receiver loop to stop after the message it is handling.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the receiver loop to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PodMessage, WorkflowMessage};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, msg: Message) {
            // A slow handler must still see messages strictly in order.
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen.lock().unwrap().push(msg);
        }
    }

    #[tokio::test]
    async fn messages_are_handled_in_order() {
        let (queue, dispatcher) = MessageQueue::new();
        let recorder = Arc::new(Recorder::default());
        let handle = queue.start(recorder.clone());

        dispatcher.send(WorkflowMessage::start("r-workflow-1")).unwrap();
        dispatcher.send(PodMessage::completed("instance-1", 0)).unwrap();
        drop(dispatcher);
        handle.join().await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Message::Workflow(_)));
        assert!(matches!(seen[1], Message::Pod(_)));
    }

    #[tokio::test]
    async fn send_after_queue_is_gone_fails() {
        let (queue, dispatcher) = MessageQueue::new();
        drop(queue);
        assert_eq!(
            dispatcher.send(WorkflowMessage::stop("r-workflow-1")),
            Err(QueueError::Closed)
        );
    }

    #[tokio::test]
    async fn stop_ends_the_receiver_loop() {
        let (queue, dispatcher) = MessageQueue::new();
        let handle = queue.start(Arc::new(Recorder::default()));
        handle.stop();
        handle.join().await;
        assert_eq!(
            dispatcher.send(WorkflowMessage::stop("r-workflow-1")),
            Err(QueueError::Closed)
        );
    }
}
