//! Launch error type.

use thiserror::Error;

use crate::CommandError;

/// Errors returned by [`crate::InstanceLauncher::launch`].
///
/// These are *launch* failures: the job never started. A job that starts
/// and then exits non-zero is reported through a `PodMessage` instead.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The launcher refused the request with its own code.
    #[error("{message}")]
    Rejected { error_num: i32, message: String },

    #[error("job {collection}/{job}/{version} is not in the catalog")]
    UnknownJob {
        collection: String,
        job: String,
        version: String,
    },

    #[error("cannot render command: {0}")]
    Command(#[from] CommandError),

    /// Workflow launches must name the running workflow step.
    #[error("no running workflow step id was provided")]
    MissingStep,

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("cannot start process: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Numeric code recorded against the failed step and workflow.
    pub fn error_num(&self) -> i32 {
        match self {
            Self::Rejected { error_num, .. } => *error_num,
            Self::UnknownJob { .. } => 2,
            Self::Command(_) => 3,
            Self::MissingStep => 4,
            Self::Store(_) => 5,
            Self::Io(_) => 6,
        }
    }
}
