//! The `InstanceLauncher` trait — the contract every launcher must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use store::Specification;

use crate::LaunchError;

/// Everything a launcher needs to create an Instance for a workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchParameters {
    /// Project the instance runs in.
    pub project_id: String,
    /// A symbolic name for the instance (the step name).
    pub name: String,
    pub launching_user_name: String,
    pub launching_user_api_token: String,
    pub specification: Specification,
    /// When present these replace any `variables` in the specification.
    pub specification_variables: Option<Map<String, Value>>,
    /// Instances launched with a debug flag are left behind for inspection.
    pub debug: Option<String>,
    pub running_workflow_id: Option<String>,
    pub running_workflow_step_id: Option<String>,
}

impl LaunchParameters {
    /// The variables the job command should be rendered with.
    pub fn variables(&self) -> Map<String, Value> {
        self.specification_variables
            .as_ref()
            .or(self.specification.variables.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// A successfully launched instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launched {
    pub instance_id: String,
    pub task_id: String,
    /// The rendered command the instance runs.
    pub command: String,
}

#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    /// Start the job described by `params`.
    ///
    /// Returning `Ok` means the instance exists; its completion arrives later
    /// as a `PodMessage` carrying the returned `instance_id`.
    async fn launch(&self, params: LaunchParameters) -> Result<Launched, LaunchError>;
}
