//! Record structs for every table the engine touches.
//!
//! These are *persistence* models — they carry no orchestration behaviour.
//! The typed workflow definition lives in the `engine` crate; here it is
//! kept as the JSON document the user submitted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A stored workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    /// Full workflow definition document (name, steps, variables, …)
    pub definition: Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// running_workflows
// ---------------------------------------------------------------------------

/// Everything needed to create a [`RunningWorkflow`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRunningWorkflow {
    pub workflow_id: String,
    pub project_id: String,
    pub name: String,
    pub running_user: String,
    pub running_user_api_token: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub debug: Option<String>,
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningWorkflow {
    pub id: String,
    pub workflow_id: String,
    pub project_id: String,
    pub name: String,
    pub running_user: String,
    pub running_user_api_token: String,
    /// Values supplied by the user when the run was requested.
    pub variables: Map<String, Value>,
    pub debug: Option<String>,
    pub done: bool,
    pub success: bool,
    pub error_num: Option<i32>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// running_workflow_steps
// ---------------------------------------------------------------------------

/// One execution of a step (or one replica of it) within a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningWorkflowStep {
    pub id: String,
    /// The step name from the workflow definition.
    pub name: String,
    pub running_workflow_id: String,
    pub prior_running_workflow_step_id: Option<String>,
    /// 1-based replica index, 0 when the step is not replicated.
    pub replica: u32,
    /// Total number of replicas launched for this step (1 when not replicated).
    pub replicas: u32,
    /// The variables the step's command was rendered with.
    pub variables: Map<String, Value>,
    pub done: bool,
    pub success: bool,
    pub error_num: Option<i32>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// instances
// ---------------------------------------------------------------------------

/// A launched job process for a running workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub running_workflow_step_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// jobs (read-only catalog)
// ---------------------------------------------------------------------------

/// The job a workflow step runs, plus any static variables for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub collection: String,
    pub job: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
}

/// Output type marking an output that yields a list of files.
pub const FILES_OUTPUT_TYPE: &str = "files";

/// A declared job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(rename = "type")]
    pub output_type: String,
}

impl JobOutput {
    pub fn is_files(&self) -> bool {
        self.output_type == FILES_OUTPUT_TYPE
    }
}

/// The parts of a job definition the engine inspects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default)]
    pub outputs: BTreeMap<String, JobOutput>,
}

/// A job catalog entry keyed by (collection, job, version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub collection: String,
    pub job: String,
    pub version: String,
    /// Jinja-style command template.
    pub command: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub definition: JobDefinition,
}

impl Job {
    /// Returns `true` if `output` is declared with the `files` type.
    pub fn output_is_files(&self, output: &str) -> bool {
        self.definition
            .outputs
            .get(output)
            .is_some_and(JobOutput::is_files)
    }
}
