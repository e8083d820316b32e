//! In-memory implementation of [`RunStateStore`].
//!
//! Each logical table sits behind its own lock and every trait method does
//! its read-modify-write while holding that lock, so concurrent engine
//! invocations never interleave inside a single mutation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    jobs::JobCatalog,
    models::{Instance, Job, NewRunningWorkflow, RunningWorkflow, RunningWorkflowStep, Workflow},
    RunStateStore, StoreError,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    running_workflows: RwLock<HashMap<String, RunningWorkflow>>,
    /// Kept as a list so creation order is preserved.
    running_workflow_steps: RwLock<Vec<RunningWorkflowStep>>,
    instances: RwLock<HashMap<String, Instance>>,
    /// Realised `files` outputs keyed by (step id, output variable).
    step_outputs: RwLock<HashMap<(String, String), Vec<Value>>>,
    jobs: JobCatalog,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that serves jobs from the given catalog.
    pub fn with_jobs(jobs: JobCatalog) -> Self {
        Self {
            jobs,
            ..Self::default()
        }
    }

    /// Record the values a step produced for one of its outputs.
    ///
    /// Without this the output values fall back to whatever the step
    /// recorded for the variable of the same name.
    pub async fn set_running_workflow_step_output_values(
        &self,
        running_workflow_step_id: &str,
        output_variable: &str,
        values: Vec<Value>,
    ) {
        self.step_outputs.write().await.insert(
            (running_workflow_step_id.to_owned(), output_variable.to_owned()),
            values,
        );
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[async_trait]
impl RunStateStore for InMemoryStore {
    async fn create_workflow(&self, definition: Value) -> Result<Workflow, StoreError> {
        let workflow = Workflow {
            id: new_id("workflow"),
            definition,
            created_at: Utc::now(),
        };
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        debug!("created workflow {}", workflow.id);
        Ok(workflow)
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>, StoreError> {
        Ok(self.workflows.read().await.get(workflow_id).cloned())
    }

    async fn create_running_workflow(
        &self,
        new: NewRunningWorkflow,
    ) -> Result<RunningWorkflow, StoreError> {
        if !self.workflows.read().await.contains_key(&new.workflow_id) {
            return Err(StoreError::not_found("workflow", &new.workflow_id));
        }
        let running_workflow = RunningWorkflow {
            id: new_id("r-workflow"),
            workflow_id: new.workflow_id,
            project_id: new.project_id,
            name: new.name,
            running_user: new.running_user,
            running_user_api_token: new.running_user_api_token,
            variables: new.variables,
            debug: new.debug,
            done: false,
            success: false,
            error_num: None,
            error_msg: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.running_workflows
            .write()
            .await
            .insert(running_workflow.id.clone(), running_workflow.clone());
        debug!("created running workflow {}", running_workflow.id);
        Ok(running_workflow)
    }

    async fn get_running_workflow(
        &self,
        running_workflow_id: &str,
    ) -> Result<Option<RunningWorkflow>, StoreError> {
        Ok(self
            .running_workflows
            .read()
            .await
            .get(running_workflow_id)
            .cloned())
    }

    async fn set_running_workflow_done(
        &self,
        running_workflow_id: &str,
        success: bool,
        error_num: Option<i32>,
        error_msg: Option<String>,
    ) -> Result<(), StoreError> {
        let mut table = self.running_workflows.write().await;
        let record = table
            .get_mut(running_workflow_id)
            .ok_or_else(|| StoreError::not_found("running workflow", running_workflow_id))?;
        if record.done {
            warn!(
                "running workflow {} is already done (success={}), ignoring update",
                running_workflow_id, record.success
            );
            return Ok(());
        }
        record.done = true;
        record.success = success;
        record.error_num = error_num;
        record.error_msg = error_msg;
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn create_running_workflow_step(
        &self,
        running_workflow_id: &str,
        step: &str,
        replica: u32,
        replicas: u32,
        prior_running_workflow_step_id: Option<&str>,
    ) -> Result<RunningWorkflowStep, StoreError> {
        if !self
            .running_workflows
            .read()
            .await
            .contains_key(running_workflow_id)
        {
            return Err(StoreError::not_found("running workflow", running_workflow_id));
        }
        let record = RunningWorkflowStep {
            id: new_id("r-workflow-step"),
            name: step.to_owned(),
            running_workflow_id: running_workflow_id.to_owned(),
            prior_running_workflow_step_id: prior_running_workflow_step_id.map(str::to_owned),
            replica,
            replicas,
            variables: Map::new(),
            done: false,
            success: false,
            error_num: None,
            error_msg: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.running_workflow_steps.write().await.push(record.clone());
        debug!(
            "created running workflow step {} (step={} replica={}/{})",
            record.id, step, replica, replicas
        );
        Ok(record)
    }

    async fn get_running_workflow_step(
        &self,
        running_workflow_step_id: &str,
    ) -> Result<Option<RunningWorkflowStep>, StoreError> {
        Ok(self
            .running_workflow_steps
            .read()
            .await
            .iter()
            .find(|s| s.id == running_workflow_step_id)
            .cloned())
    }

    async fn get_running_workflow_step_by_name(
        &self,
        name: &str,
        running_workflow_id: &str,
    ) -> Result<Option<RunningWorkflowStep>, StoreError> {
        Ok(self
            .running_workflow_steps
            .read()
            .await
            .iter()
            .filter(|s| s.running_workflow_id == running_workflow_id && s.name == name)
            .min_by_key(|s| s.replica)
            .cloned())
    }

    async fn get_running_workflow_steps(
        &self,
        running_workflow_id: &str,
    ) -> Result<Vec<RunningWorkflowStep>, StoreError> {
        Ok(self
            .running_workflow_steps
            .read()
            .await
            .iter()
            .filter(|s| s.running_workflow_id == running_workflow_id)
            .cloned()
            .collect())
    }

    async fn get_running_steps(
        &self,
        running_workflow_id: &str,
    ) -> Result<Vec<RunningWorkflowStep>, StoreError> {
        Ok(self
            .running_workflow_steps
            .read()
            .await
            .iter()
            .filter(|s| s.running_workflow_id == running_workflow_id && !s.done)
            .cloned()
            .collect())
    }

    async fn set_running_workflow_step_variables(
        &self,
        running_workflow_step_id: &str,
        variables: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut table = self.running_workflow_steps.write().await;
        let record = table
            .iter_mut()
            .find(|s| s.id == running_workflow_step_id)
            .ok_or_else(|| {
                StoreError::not_found("running workflow step", running_workflow_step_id)
            })?;
        record.variables = variables;
        Ok(())
    }

    async fn set_running_workflow_step_done(
        &self,
        running_workflow_step_id: &str,
        success: bool,
        error_num: Option<i32>,
        error_msg: Option<String>,
    ) -> Result<(), StoreError> {
        let mut table = self.running_workflow_steps.write().await;
        let record = table
            .iter_mut()
            .find(|s| s.id == running_workflow_step_id)
            .ok_or_else(|| {
                StoreError::not_found("running workflow step", running_workflow_step_id)
            })?;
        if record.done {
            warn!(
                "running workflow step {} is already done, ignoring update",
                running_workflow_step_id
            );
            return Ok(());
        }
        record.done = true;
        record.success = success;
        record.error_num = error_num;
        record.error_msg = error_msg;
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_running_workflow_step_output_values_for_output(
        &self,
        running_workflow_step_id: &str,
        output_variable: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let key = (
            running_workflow_step_id.to_owned(),
            output_variable.to_owned(),
        );
        if let Some(values) = self.step_outputs.read().await.get(&key) {
            return Ok(values.clone());
        }

        let step = self
            .get_running_workflow_step(running_workflow_step_id)
            .await?
            .ok_or_else(|| {
                StoreError::not_found("running workflow step", running_workflow_step_id)
            })?;
        let values = match step.variables.get(output_variable) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.clone(),
            Some(value) => vec![value.clone()],
        };
        Ok(values)
    }

    async fn create_instance(
        &self,
        running_workflow_step_id: &str,
    ) -> Result<Instance, StoreError> {
        let instance = Instance {
            id: new_id("instance"),
            running_workflow_step_id: running_workflow_step_id.to_owned(),
            created_at: Utc::now(),
        };
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, StoreError> {
        Ok(self.instances.read().await.get(instance_id).cloned())
    }

    async fn get_job(
        &self,
        collection: &str,
        job: &str,
        version: &str,
    ) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.get(collection, job, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_run() -> (InMemoryStore, RunningWorkflow) {
        let store = InMemoryStore::new();
        let workflow = store
            .create_workflow(json!({ "name": "wf", "steps": [] }))
            .await
            .expect("workflow");
        let run = store
            .create_running_workflow(NewRunningWorkflow {
                workflow_id: workflow.id,
                project_id: "project-1".into(),
                name: "run".into(),
                running_user: "dlister".into(),
                ..Default::default()
            })
            .await
            .expect("running workflow");
        (store, run)
    }

    #[tokio::test]
    async fn running_workflow_requires_existing_workflow() {
        let store = InMemoryStore::new();
        let result = store
            .create_running_workflow(NewRunningWorkflow {
                workflow_id: "workflow-missing".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn terminal_state_is_written_once() {
        let (store, run) = store_with_run().await;

        store
            .set_running_workflow_done(&run.id, false, Some(3), Some("Job failed".into()))
            .await
            .unwrap();
        store
            .set_running_workflow_done(&run.id, true, None, None)
            .await
            .unwrap();

        let run = store.get_running_workflow(&run.id).await.unwrap().unwrap();
        assert!(run.done);
        assert!(!run.success);
        assert_eq!(run.error_num, Some(3));
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn steps_keep_creation_order_and_running_filter() {
        let (store, run) = store_with_run().await;
        let first = store
            .create_running_workflow_step(&run.id, "step-1", 0, 1, None)
            .await
            .unwrap();
        let second = store
            .create_running_workflow_step(&run.id, "step-2", 0, 1, Some(&first.id))
            .await
            .unwrap();
        store
            .set_running_workflow_step_done(&first.id, true, None, None)
            .await
            .unwrap();

        let steps = store.get_running_workflow_steps(&run.id).await.unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["step-1", "step-2"]);

        let running = store.get_running_steps(&run.id).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, second.id);
        assert_eq!(
            running[0].prior_running_workflow_step_id.as_deref(),
            Some(first.id.as_str())
        );
    }

    #[tokio::test]
    async fn step_by_name_returns_lowest_replica() {
        let (store, run) = store_with_run().await;
        for replica in 1..=3 {
            store
                .create_running_workflow_step(&run.id, "split", replica, 3, None)
                .await
                .unwrap();
        }
        let step = store
            .get_running_workflow_step_by_name("split", &run.id)
            .await
            .unwrap()
            .expect("step");
        assert_eq!(step.replica, 1);
        assert!(store
            .get_running_workflow_step_by_name("split", "r-workflow-other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn output_values_prefer_realised_outputs() {
        let (store, run) = store_with_run().await;
        let step = store
            .create_running_workflow_step(&run.id, "split", 0, 1, None)
            .await
            .unwrap();
        let mut variables = Map::new();
        variables.insert("outputFile".into(), json!("chunk.smi"));
        store
            .set_running_workflow_step_variables(&step.id, variables)
            .await
            .unwrap();

        let fallback = store
            .get_running_workflow_step_output_values_for_output(&step.id, "outputFile")
            .await
            .unwrap();
        assert_eq!(fallback, vec![json!("chunk.smi")]);

        store
            .set_running_workflow_step_output_values(
                &step.id,
                "outputFile",
                vec![json!("chunk-1.smi"), json!("chunk-2.smi")],
            )
            .await;
        let realised = store
            .get_running_workflow_step_output_values_for_output(&step.id, "outputFile")
            .await
            .unwrap();
        assert_eq!(realised.len(), 2);
    }

    #[tokio::test]
    async fn instance_links_back_to_step() {
        let (store, run) = store_with_run().await;
        let step = store
            .create_running_workflow_step(&run.id, "step-1", 0, 1, None)
            .await
            .unwrap();
        let instance = store.create_instance(&step.id).await.unwrap();
        let fetched = store.get_instance(&instance.id).await.unwrap().unwrap();
        assert_eq!(fetched.running_workflow_step_id, step.id);
        assert!(store.get_instance("instance-missing").await.unwrap().is_none());
    }
}
