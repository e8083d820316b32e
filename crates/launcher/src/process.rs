//! `ProcessLauncher` — runs job commands as local shell processes.
//!
//! Each project gets its own directory under the configured project root.
//! When a process exits, a `PodMessage` carrying its exit code is sent back
//! through the message queue, just as a cluster would report a finished pod.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use queue::{MessageDispatcher, PodMessage};
use store::RunStateStore;

use crate::{command, InstanceLauncher, LaunchError, LaunchParameters, Launched};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Directory holding one sub-directory per project.
    pub project_root: PathBuf,
    /// Shell used to run the rendered command (`<shell> -c <command>`).
    pub shell: String,
}

impl Default for ProcessLauncherConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("project-root"),
            shell: "sh".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessLauncher
// ---------------------------------------------------------------------------

pub struct ProcessLauncher {
    store: Arc<dyn RunStateStore>,
    dispatcher: MessageDispatcher,
    config: ProcessLauncherConfig,
}

impl ProcessLauncher {
    pub fn new(
        store: Arc<dyn RunStateStore>,
        dispatcher: MessageDispatcher,
        config: ProcessLauncherConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Directory a project's instances run in.
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.config.project_root.join(project_id)
    }
}

#[async_trait]
impl InstanceLauncher for ProcessLauncher {
    #[instrument(skip(self, params), fields(step = %params.name, project = %params.project_id))]
    async fn launch(&self, params: LaunchParameters) -> Result<Launched, LaunchError> {
        let step_id = params
            .running_workflow_step_id
            .as_deref()
            .ok_or(LaunchError::MissingStep)?;

        let spec = &params.specification;
        let job = self
            .store
            .get_job(&spec.collection, &spec.job, &spec.version)
            .await?
            .ok_or_else(|| LaunchError::UnknownJob {
                collection: spec.collection.clone(),
                job: spec.job.clone(),
                version: spec.version.clone(),
            })?;
        let command = command::render(&job.command, &params.variables())?;

        let dir = self.project_dir(&params.project_id);
        tokio::fs::create_dir_all(&dir).await?;

        let instance = self.store.create_instance(step_id).await?;
        let task_id = format!("task-{}", Uuid::new_v4());

        let mut child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&command)
            .current_dir(&dir)
            .spawn()?;
        info!(
            "launched instance {} (task={}) in {}: {}",
            instance.id,
            task_id,
            dir.display(),
            command
        );

        let dispatcher = self.dispatcher.clone();
        let instance_id = instance.id.clone();
        let task = task_id.clone();
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                // A process killed by a signal has no exit code.
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    error!("waiting for instance {} failed: {}", instance_id, e);
                    -1
                }
            };
            info!("instance {} exited with code {}", instance_id, exit_code);
            if let Err(e) = dispatcher.send(PodMessage::completed(instance_id, exit_code).with_task(task)) {
                warn!("cannot report instance completion: {}", e);
            }
        });

        Ok(Launched {
            instance_id: instance.id,
            task_id,
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue::{Message, MessageQueue};
    use serde_json::json;
    use store::{InMemoryStore, JobCatalog, Specification};

    const JOBS: &str = r#"
collection: unit-test-jobs
jobs:
  smiles-to-file:
    command: echo {{ smiles }} > {{ outputFile }}
  fail:
    command: exit 3
"#;

    fn params(job: &str, variables: serde_json::Value) -> LaunchParameters {
        LaunchParameters {
            project_id: "project-1".into(),
            name: "step-1".into(),
            launching_user_name: "dlister".into(),
            launching_user_api_token: "token".into(),
            specification: Specification {
                collection: "unit-test-jobs".into(),
                job: job.into(),
                version: "1.0.0".into(),
                variables: None,
            },
            specification_variables: variables.as_object().cloned(),
            debug: None,
            running_workflow_id: Some("r-workflow-1".into()),
            running_workflow_step_id: Some("r-workflow-step-1".into()),
        }
    }

    fn launcher(root: &std::path::Path) -> (ProcessLauncher, MessageQueue) {
        let store = Arc::new(InMemoryStore::with_jobs(
            JobCatalog::from_yaml_str(JOBS).unwrap(),
        ));
        let (queue, dispatcher) = MessageQueue::new();
        let config = ProcessLauncherConfig {
            project_root: root.to_path_buf(),
            ..Default::default()
        };
        (ProcessLauncher::new(store, dispatcher, config), queue)
    }

    // Pulls the completion message straight off the receiving end.
    async fn next_pod_message(queue: MessageQueue) -> PodMessage {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        struct Forward(tokio::sync::mpsc::UnboundedSender<Message>);
        #[async_trait]
        impl queue::MessageHandler for Forward {
            async fn handle(&self, msg: Message) {
                let _ = self.0.send(msg);
            }
        }
        let handle = queue.start(Arc::new(Forward(tx)));
        let msg = rx.recv().await.expect("a message");
        handle.stop();
        match msg {
            Message::Pod(pod) => pod,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_process_reports_exit_code_zero() {
        let root = tempfile::tempdir().unwrap();
        let (launcher, queue) = launcher(root.path());

        let launched = launcher
            .launch(params(
                "smiles-to-file",
                json!({ "smiles": "CCO", "outputFile": "ethanol.smi" }),
            ))
            .await
            .expect("launch");
        assert_eq!(launched.command, "echo CCO > ethanol.smi");

        let pod = next_pod_message(queue).await;
        assert_eq!(pod.instance, launched.instance_id);
        assert!(pod.has_exit_code);
        assert_eq!(pod.exit_code, 0);

        let written = std::fs::read_to_string(root.path().join("project-1/ethanol.smi")).unwrap();
        assert_eq!(written.trim(), "CCO");
    }

    #[tokio::test]
    async fn failing_process_reports_its_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let (launcher, queue) = launcher(root.path());

        launcher.launch(params("fail", json!({}))).await.expect("launch");

        let pod = next_pod_message(queue).await;
        assert_eq!(pod.exit_code, 3);
    }

    #[tokio::test]
    async fn unknown_job_is_a_launch_error() {
        let root = tempfile::tempdir().unwrap();
        let (launcher, _queue) = launcher(root.path());

        let err = launcher.launch(params("missing", json!({}))).await.unwrap_err();
        assert!(matches!(err, LaunchError::UnknownJob { .. }));
        assert_eq!(err.error_num(), 2);
    }

    #[tokio::test]
    async fn unrenderable_command_is_a_launch_error() {
        let root = tempfile::tempdir().unwrap();
        let (launcher, _queue) = launcher(root.path());

        let err = launcher
            .launch(params("smiles-to-file", json!({ "smiles": "CCO" })))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Command(_)));
    }
}
