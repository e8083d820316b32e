//! End-to-end runs of the example workflows.
//!
//! Each test wires the engine to the in-process message queue and the
//! process launcher, so job commands really run (with `sh`) inside a
//! temporary project directory and report back through `PodMessage`s.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use engine::{EngineConfig, ValidationLevel, WorkflowEngine, WorkflowValidator};
use launcher::{ProcessLauncher, ProcessLauncherConfig};
use queue::{MessageDispatcher, MessageQueue, QueueHandle, WorkflowMessage};
use store::{InMemoryStore, JobCatalog, NewRunningWorkflow, RunStateStore, RunningWorkflow};

const PROJECT_ID: &str = "project-00000000-0000-0000-0000-000000000001";

fn test_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join(name)
}

fn load_definition(name: &str) -> Value {
    let path = test_file(&format!("workflow-definitions/{name}.yaml"));
    let text = std::fs::read_to_string(&path).expect("definition file");
    serde_yaml::from_str(&text).expect("definition YAML")
}

struct TestEngine {
    store: Arc<InMemoryStore>,
    dispatcher: MessageDispatcher,
    handle: QueueHandle,
    project_root: TempDir,
}

impl TestEngine {
    fn start() -> Self {
        let project_root = tempfile::tempdir().expect("project root");
        let jobs = JobCatalog::from_path(test_file("jobs.yaml")).expect("job catalog");
        let store = Arc::new(InMemoryStore::with_jobs(jobs));

        let (queue, dispatcher) = MessageQueue::new();
        let launcher = Arc::new(ProcessLauncher::new(
            store.clone(),
            dispatcher.clone(),
            ProcessLauncherConfig {
                project_root: project_root.path().to_path_buf(),
                ..Default::default()
            },
        ));
        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            launcher,
            EngineConfig::default(),
        ));
        let handle = queue.start(engine);

        Self {
            store,
            dispatcher,
            handle,
            project_root,
        }
    }

    /// Create the workflow and a running workflow for it, then send START.
    async fn start_workflow(&self, name: &str, variables: Value) -> String {
        let definition = load_definition(name);
        let workflow = self.store.create_workflow(definition).await.unwrap();
        let rwf = self
            .store
            .create_running_workflow(NewRunningWorkflow {
                workflow_id: workflow.id,
                project_id: PROJECT_ID.into(),
                name: name.into(),
                running_user: "dlister".into(),
                running_user_api_token: "1234567890".into(),
                variables: variables.as_object().cloned().unwrap_or_default(),
                debug: None,
            })
            .await
            .unwrap();
        self.dispatcher
            .send(WorkflowMessage::start(&rwf.id))
            .expect("queue is open");
        rwf.id
    }

    /// Poll until the running workflow is done.
    async fn wait_for_workflow(&self, id: &str) -> RunningWorkflow {
        let poll = async {
            loop {
                let rwf = self
                    .store
                    .get_running_workflow(id)
                    .await
                    .unwrap()
                    .expect("running workflow");
                if rwf.done {
                    return rwf;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), poll)
            .await
            .expect("workflow finished in time")
    }

    fn project_file(&self, name: &str) -> PathBuf {
        self.project_root.path().join(PROJECT_ID).join(name)
    }

    async fn stop(self) {
        self.handle.stop();
        self.handle.join().await;
    }
}

#[tokio::test]
async fn example_two_step_nop() {
    let engine = TestEngine::start();

    let id = engine.start_workflow("example-two-step-nop", json!({})).await;
    let rwf = engine.wait_for_workflow(&id).await;

    assert!(rwf.success, "{:?}", rwf.error_msg);
    let steps = engine.store.get_running_workflow_steps(&id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.done && s.success));

    engine.stop().await;
}

#[tokio::test]
async fn example_nop_fail() {
    let engine = TestEngine::start();

    let id = engine.start_workflow("example-nop-fail", json!({})).await;
    let rwf = engine.wait_for_workflow(&id).await;

    assert!(!rwf.success);
    assert_eq!(rwf.error_num, Some(1));
    assert_eq!(rwf.error_msg.as_deref(), Some("Job failed"));
    let steps = engine.store.get_running_workflow_steps(&id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].done);
    assert!(!steps[0].success);

    engine.stop().await;
}

#[tokio::test]
async fn example_smiles_to_file() {
    let engine = TestEngine::start();
    let output_file = "ethanol.smi";
    assert!(!engine.project_file(output_file).exists());

    let id = engine
        .start_workflow(
            "example-smiles-to-file",
            json!({ "smiles": "CCO", "outputFile": output_file }),
        )
        .await;
    let rwf = engine.wait_for_workflow(&id).await;

    assert!(rwf.success, "{:?}", rwf.error_msg);
    let steps = engine.store.get_running_workflow_steps(&id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].success);

    let content = std::fs::read_to_string(engine.project_file(output_file)).expect("output file");
    assert_eq!(content.trim(), "CCO");

    engine.stop().await;
}

#[tokio::test]
async fn example_smiles_chain_joins_prior_step_outputs() {
    let engine = TestEngine::start();

    let id = engine
        .start_workflow(
            "example-smiles-chain",
            json!({ "firstSmiles": "CCO", "secondSmiles": "c1ccccc1" }),
        )
        .await;
    let rwf = engine.wait_for_workflow(&id).await;

    assert!(rwf.success, "{:?}", rwf.error_msg);
    let content = std::fs::read_to_string(engine.project_file("combined.smi")).expect("combined file");
    assert_eq!(content.lines().collect::<Vec<_>>(), vec!["CCO", "c1ccccc1"]);

    engine.stop().await;
}

#[tokio::test]
async fn example_definitions_pass_run_validation() {
    let cases = [
        ("example-two-step-nop", json!({})),
        ("example-nop-fail", json!({})),
        (
            "example-smiles-to-file",
            json!({ "smiles": "CCO", "outputFile": "ethanol.smi" }),
        ),
        (
            "example-smiles-chain",
            json!({ "firstSmiles": "CCO", "secondSmiles": "c1ccccc1" }),
        ),
    ];
    for (name, variables) in cases {
        let result = WorkflowValidator::validate(
            ValidationLevel::Run,
            &load_definition(name),
            variables.as_object(),
        );
        assert!(result.is_ok(), "{name}: {:?}", result.error_msg);
    }
}
