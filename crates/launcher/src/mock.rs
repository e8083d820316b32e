//! `MockLauncher` — a test double for `InstanceLauncher`.
//!
//! It records every launch request and creates Instance records in the
//! store, but runs nothing. Tests drive step completion by sending
//! `PodMessage`s for the recorded instance ids.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use store::RunStateStore;

use crate::{InstanceLauncher, LaunchError, LaunchParameters, Launched};

/// Behaviour injected into `MockLauncher` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Create an instance and report success.
    Launch,
    /// Refuse every launch with the given code and message.
    Reject { error_num: i32, message: String },
}

pub struct MockLauncher {
    store: Arc<dyn RunStateStore>,
    behaviour: MockBehaviour,
    /// Every launch request seen (in call order).
    pub calls: Arc<Mutex<Vec<LaunchParameters>>>,
    /// Instance ids handed out (in call order).
    pub instances: Arc<Mutex<Vec<String>>>,
}

impl MockLauncher {
    /// Create a mock that launches every request.
    pub fn new(store: Arc<dyn RunStateStore>) -> Self {
        Self::with_behaviour(store, MockBehaviour::Launch)
    }

    /// Create a mock that rejects every request.
    pub fn rejecting(
        store: Arc<dyn RunStateStore>,
        error_num: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::with_behaviour(
            store,
            MockBehaviour::Reject {
                error_num,
                message: message.into(),
            },
        )
    }

    pub fn with_behaviour(store: Arc<dyn RunStateStore>, behaviour: MockBehaviour) -> Self {
        Self {
            store,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            instances: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of launch requests received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<LaunchParameters> {
        self.calls.lock().unwrap().clone()
    }

    /// The most recently created instance id.
    pub fn last_instance(&self) -> Option<String> {
        self.instances.lock().unwrap().last().cloned()
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceLauncher for MockLauncher {
    async fn launch(&self, params: LaunchParameters) -> Result<Launched, LaunchError> {
        self.calls.lock().unwrap().push(params.clone());

        if let MockBehaviour::Reject { error_num, message } = &self.behaviour {
            return Err(LaunchError::Rejected {
                error_num: *error_num,
                message: message.clone(),
            });
        }

        let step_id = params
            .running_workflow_step_id
            .as_deref()
            .ok_or(LaunchError::MissingStep)?;
        let instance = self.store.create_instance(step_id).await?;
        self.instances.lock().unwrap().push(instance.id.clone());

        Ok(Launched {
            instance_id: instance.id,
            task_id: format!("task-{}", Uuid::new_v4()),
            command: format!(
                "{}/{}",
                params.specification.collection, params.specification.job
            ),
        })
    }
}
