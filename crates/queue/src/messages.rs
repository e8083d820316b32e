//! Inbound engine messages.

use chrono::Utc;
use serde::{Deserialize, Serialize};

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// WorkflowMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowAction {
    Start,
    Stop,
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

/// Asks the engine to start (or stop) an existing running workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub action: WorkflowAction,
    /// ID of the RunningWorkflow record.
    pub running_workflow: String,
    pub timestamp: String,
}

impl WorkflowMessage {
    pub fn start(running_workflow: impl Into<String>) -> Self {
        Self {
            action: WorkflowAction::Start,
            running_workflow: running_workflow.into(),
            timestamp: now(),
        }
    }

    pub fn stop(running_workflow: impl Into<String>) -> Self {
        Self {
            action: WorkflowAction::Stop,
            running_workflow: running_workflow.into(),
            timestamp: now(),
        }
    }
}

// ---------------------------------------------------------------------------
// PodMessage
// ---------------------------------------------------------------------------

/// Reports on the process backing an Instance.
///
/// Only messages with an exit code mark the end of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMessage {
    /// ID of the Instance record.
    pub instance: String,
    #[serde(default)]
    pub task: Option<String>,
    pub has_exit_code: bool,
    #[serde(default)]
    pub exit_code: i32,
    pub phase: String,
    pub timestamp: String,
}

impl PodMessage {
    /// The message sent when an instance's process has exited.
    pub fn completed(instance: impl Into<String>, exit_code: i32) -> Self {
        Self {
            instance: instance.into(),
            task: None,
            has_exit_code: true,
            exit_code,
            phase: "Completed".to_owned(),
            timestamp: now(),
        }
    }

    /// A progress message without an exit code.
    pub fn phase(instance: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            task: None,
            has_exit_code: false,
            exit_code: 0,
            phase: phase.into(),
            timestamp: now(),
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Workflow(WorkflowMessage),
    Pod(PodMessage),
}

impl From<WorkflowMessage> for Message {
    fn from(msg: WorkflowMessage) -> Self {
        Self::Workflow(msg)
    }
}

impl From<PodMessage> for Message {
    fn from(msg: PodMessage) -> Self {
        Self::Pod(msg)
    }
}
