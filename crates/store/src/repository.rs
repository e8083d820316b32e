//! The `RunStateStore` trait — one method per store operation.
//!
//! Reads return `Ok(None)` when the record does not exist. Every mutation is
//! a single call so an implementation can make its read-modify-write atomic;
//! callers never fetch, edit and write back a whole record themselves.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    models::{Instance, Job, NewRunningWorkflow, RunningWorkflow, RunningWorkflowStep, Workflow},
    StoreError,
};

#[async_trait]
pub trait RunStateStore: Send + Sync {
    // ------ workflows ------

    /// Store a workflow definition document and return the new record.
    async fn create_workflow(&self, definition: Value) -> Result<Workflow, StoreError>;

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>, StoreError>;

    // ------ running workflows ------

    async fn create_running_workflow(
        &self,
        new: NewRunningWorkflow,
    ) -> Result<RunningWorkflow, StoreError>;

    async fn get_running_workflow(
        &self,
        running_workflow_id: &str,
    ) -> Result<Option<RunningWorkflow>, StoreError>;

    /// Mark a running workflow as finished.
    ///
    /// The terminal state is written once; later calls leave it untouched.
    async fn set_running_workflow_done(
        &self,
        running_workflow_id: &str,
        success: bool,
        error_num: Option<i32>,
        error_msg: Option<String>,
    ) -> Result<(), StoreError>;

    // ------ running workflow steps ------

    async fn create_running_workflow_step(
        &self,
        running_workflow_id: &str,
        step: &str,
        replica: u32,
        replicas: u32,
        prior_running_workflow_step_id: Option<&str>,
    ) -> Result<RunningWorkflowStep, StoreError>;

    async fn get_running_workflow_step(
        &self,
        running_workflow_step_id: &str,
    ) -> Result<Option<RunningWorkflowStep>, StoreError>;

    /// The first step record (lowest replica) with the given step name.
    async fn get_running_workflow_step_by_name(
        &self,
        name: &str,
        running_workflow_id: &str,
    ) -> Result<Option<RunningWorkflowStep>, StoreError>;

    /// All step records of a running workflow, in creation order.
    async fn get_running_workflow_steps(
        &self,
        running_workflow_id: &str,
    ) -> Result<Vec<RunningWorkflowStep>, StoreError>;

    /// Step records of a running workflow that are not yet done.
    async fn get_running_steps(
        &self,
        running_workflow_id: &str,
    ) -> Result<Vec<RunningWorkflowStep>, StoreError>;

    async fn set_running_workflow_step_variables(
        &self,
        running_workflow_step_id: &str,
        variables: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Mark a step as finished. Written once, like the running workflow.
    async fn set_running_workflow_step_done(
        &self,
        running_workflow_step_id: &str,
        success: bool,
        error_num: Option<i32>,
        error_msg: Option<String>,
    ) -> Result<(), StoreError>;

    /// The values a completed step produced for a `files` typed output.
    async fn get_running_workflow_step_output_values_for_output(
        &self,
        running_workflow_step_id: &str,
        output_variable: &str,
    ) -> Result<Vec<Value>, StoreError>;

    // ------ instances ------

    async fn create_instance(&self, running_workflow_step_id: &str)
        -> Result<Instance, StoreError>;

    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, StoreError>;

    // ------ job catalog ------

    async fn get_job(
        &self,
        collection: &str,
        job: &str,
        version: &str,
    ) -> Result<Option<Job>, StoreError>;
}
