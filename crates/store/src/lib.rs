//! `store` crate — the run-state store the workflow engine reads and writes.
//!
//! Provides typed record structs, the [`RunStateStore`] trait the engine is
//! written against, an in-memory implementation, and the job catalog loader.
//! No orchestration logic lives here.

pub mod error;
pub mod jobs;
pub mod memory;
pub mod models;
pub mod repository;

pub use error::StoreError;
pub use jobs::JobCatalog;
pub use memory::InMemoryStore;
pub use models::{
    Instance, Job, JobDefinition, JobOutput, NewRunningWorkflow, RunningWorkflow,
    RunningWorkflowStep, Specification, Workflow,
};
pub use repository::RunStateStore;
