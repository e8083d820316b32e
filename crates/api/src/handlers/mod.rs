pub mod running_workflows;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use queue::{Message, MessageHandler, MessageQueue, QueueHandle};
    use store::InMemoryStore;

    use crate::AppState;

    /// State backed by an in-memory store. The queue is returned unstarted
    /// so sent messages stay buffered.
    pub fn state() -> (AppState, Arc<InMemoryStore>, MessageQueue) {
        let store = Arc::new(InMemoryStore::new());
        let (queue, dispatcher) = MessageQueue::new();
        let state = AppState {
            store: store.clone(),
            dispatcher,
        };
        (state, store, queue)
    }

    /// Collects whatever the handlers send to the engine.
    #[derive(Default)]
    pub struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    impl Recorder {
        pub async fn wait_for(&self, count: usize) -> Vec<Message> {
            let poll = async {
                loop {
                    {
                        let seen = self.seen.lock().unwrap();
                        if seen.len() >= count {
                            return seen.clone();
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            };
            tokio::time::timeout(Duration::from_secs(5), poll)
                .await
                .expect("messages arrived in time")
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, msg: Message) {
            self.seen.lock().unwrap().push(msg);
        }
    }

    pub fn recording_state() -> (AppState, Arc<InMemoryStore>, Arc<Recorder>, QueueHandle) {
        let (state, store, queue) = state();
        let recorder = Arc::new(Recorder::default());
        let handle = queue.start(recorder.clone());
        (state, store, recorder, handle)
    }
}
