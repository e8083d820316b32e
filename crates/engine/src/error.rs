//! Engine-level error types.

use thiserror::Error;

/// Error number recorded against a run that failed for an internal reason.
pub const INTERNAL_ERROR_NUM: i32 = 99;

/// A definition whose variable connections cannot be followed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    /// A replicating step's variable is not fed by any prior step.
    #[error("replicate variable '{variable}' of step '{step}' is not connected to a prior step")]
    UntracedReplicateVariable { step: String, variable: String },

    /// A prior step's recorded variables lack the connected variable.
    #[error("step '{step}' needs '{variable}' from step '{prior_step}' but it was not recorded")]
    MissingPriorStepVariable {
        step: String,
        prior_step: String,
        variable: String,
    },

    /// A connector names a step that has no running record.
    #[error("step '{step}' is connected to step '{prior_step}' which has not run")]
    PriorStepNotRun { step: String, prior_step: String },
}

/// Why a step's variables could not be prepared for launch.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// The job command cannot be rendered with the resolved variables.
    #[error("{0}")]
    Command(#[from] launcher::CommandError),

    #[error("job {collection}/{job}/{version} is not in the catalog")]
    UnknownJob {
        collection: String,
        job: String,
        version: String,
    },

    #[error("replicate variable '{variable}' of step '{step}' has no values")]
    NoReplicaValues { step: String, variable: String },
}

impl ResolveError {
    /// Code recorded against the failed step and run.
    pub fn error_num(&self) -> i32 {
        match self {
            Self::Wiring(_) => INTERNAL_ERROR_NUM,
            _ => 1,
        }
    }
}

/// Errors produced while the engine handles a message.
///
/// None of these are user errors. When the owning running workflow is known
/// it is still driven to a failed terminal state before the error is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("running workflow '{0}' not found")]
    RunningWorkflowNotFound(String),

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("running workflow step '{0}' not found")]
    RunningWorkflowStepNotFound(String),

    #[error("instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("step '{step}' is not part of workflow '{workflow}'")]
    UnknownStep { workflow: String, step: String },

    #[error("workflow definition cannot be decoded: {0}")]
    Definition(#[from] serde_json::Error),

    /// Persistence error from the store crate.
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}
