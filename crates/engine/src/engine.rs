//! Workflow engine.
//!
//! `WorkflowEngine` is a stateless message handler; every piece of run state
//! lives in the [`RunStateStore`]:
//! 1. A START message launches the first step of a running workflow.
//! 2. A `PodMessage` reports a finished instance. Success advances the run
//!    to the next step (or finishes it), failure ends the run.
//! 3. A STOP message ends a run that has nothing in flight.
//!
//! Steps that replicate over a `files` output launch one record and instance
//! per value. The step after them waits until every replica has succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use launcher::{InstanceLauncher, LaunchParameters};
use queue::{Message, MessageHandler, PodMessage, WorkflowAction, WorkflowMessage};
use store::{Job, RunStateStore, RunningWorkflow, RunningWorkflowStep};

use crate::decoder;
use crate::error::{EngineError, ResolveError, WiringError, INTERNAL_ERROR_NUM};
use crate::models::{Step, WorkflowDefinition};
use crate::resolver::{self, PriorStepVariables};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Error message recorded against a stopped run.
    pub stop_message: String,
    /// Pass a running workflow's debug flag on to the launcher.
    pub forward_debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_message: "User stopped".to_owned(),
            forward_debug: true,
        }
    }
}

/// Message recorded against a step whose job exits non-zero.
const JOB_FAILED: &str = "Job failed";

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    store: Arc<dyn RunStateStore>,
    launcher: Arc<dyn InstanceLauncher>,
    config: EngineConfig,
}

/// One launch planned for a step: its replica index and, for replicas, the
/// value of the replicating variable.
struct PlannedReplica {
    replica: u32,
    value: Option<(String, Value)>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn RunStateStore>,
        launcher: Arc<dyn InstanceLauncher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            launcher,
            config,
        }
    }

    /// Handle one workflow or pod message to completion.
    ///
    /// # Errors
    /// Returns `EngineError` for records that cannot be found, definitions
    /// that cannot be decoded or store failures. When the running workflow
    /// is known it has already been marked as failed.
    pub async fn handle_message(&self, msg: Message) -> Result<(), EngineError> {
        debug!("message: {:?}", msg);
        match msg {
            Message::Workflow(msg) => self.handle_workflow_message(msg).await,
            Message::Pod(msg) => self.handle_pod_message(msg).await,
        }
    }

    // ------------------------------------------------------------------
    // Workflow messages
    // ------------------------------------------------------------------

    #[instrument(skip(self, msg), fields(running_workflow = %msg.running_workflow, action = %msg.action))]
    async fn handle_workflow_message(&self, msg: WorkflowMessage) -> Result<(), EngineError> {
        match msg.action {
            WorkflowAction::Start => self.start(&msg.running_workflow).await,
            WorkflowAction::Stop => self.stop(&msg.running_workflow).await,
        }
    }

    async fn start(&self, running_workflow_id: &str) -> Result<(), EngineError> {
        let rwf = self
            .store
            .get_running_workflow(running_workflow_id)
            .await?
            .ok_or_else(|| EngineError::RunningWorkflowNotFound(running_workflow_id.to_owned()))?;
        if rwf.done {
            warn!("running workflow {} is already done, ignoring START", rwf.id);
            return Ok(());
        }
        // Redelivered START: the first delivery already created step records.
        let existing = self.store.get_running_workflow_steps(&rwf.id).await?;
        if !existing.is_empty() {
            warn!(
                "running workflow {} already has {} step record(s), ignoring START",
                rwf.id,
                existing.len()
            );
            return Ok(());
        }

        let result = self.launch_first_step(&rwf).await;
        self.fail_run_on_error(&rwf.id, result).await
    }

    async fn launch_first_step(&self, rwf: &RunningWorkflow) -> Result<(), EngineError> {
        let definition = self.load_definition(rwf).await?;
        match definition.steps.first() {
            Some(first) => self.launch_step(rwf, &definition, first, None).await,
            None => {
                info!("workflow '{}' has no steps, nothing to run", definition.name);
                self.store
                    .set_running_workflow_done(&rwf.id, true, None, None)
                    .await?;
                Ok(())
            }
        }
    }

    async fn stop(&self, running_workflow_id: &str) -> Result<(), EngineError> {
        let Some(rwf) = self.store.get_running_workflow(running_workflow_id).await? else {
            info!("running workflow {} does not exist, ignoring STOP", running_workflow_id);
            return Ok(());
        };
        if rwf.done {
            info!("running workflow {} is already done, ignoring STOP", rwf.id);
            return Ok(());
        }

        let running = self.store.get_running_steps(&rwf.id).await?;
        if !running.is_empty() {
            info!(
                "running workflow {} has {} step(s) in flight, ignoring STOP",
                rwf.id,
                running.len()
            );
            return Ok(());
        }

        info!("stopping running workflow {}", rwf.id);
        self.store
            .set_running_workflow_done(&rwf.id, false, None, Some(self.config.stop_message.clone()))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pod messages
    // ------------------------------------------------------------------

    #[instrument(skip(self, msg), fields(instance = %msg.instance))]
    async fn handle_pod_message(&self, msg: PodMessage) -> Result<(), EngineError> {
        if !msg.has_exit_code {
            warn!("PodMessage without an exit code (phase={}), ignoring", msg.phase);
            return Ok(());
        }

        let instance = self
            .store
            .get_instance(&msg.instance)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(msg.instance.clone()))?;
        let step = self
            .store
            .get_running_workflow_step(&instance.running_workflow_step_id)
            .await?
            .ok_or_else(|| {
                EngineError::RunningWorkflowStepNotFound(instance.running_workflow_step_id.clone())
            })?;
        let rwf = self
            .store
            .get_running_workflow(&step.running_workflow_id)
            .await?
            .ok_or_else(|| EngineError::RunningWorkflowNotFound(step.running_workflow_id.clone()))?;

        if step.done {
            // Redelivered message.
            warn!("step '{}' ({}) is already done, ignoring", step.name, step.id);
            return Ok(());
        }

        if msg.exit_code != 0 {
            self.set_step_error(&rwf.id, Some(&step.id), msg.exit_code, JOB_FAILED)
                .await?;
            return Ok(());
        }

        self.store
            .set_running_workflow_step_done(&step.id, true, None, None)
            .await?;
        info!(
            "step '{}' succeeded (replica {}/{})",
            step.name, step.replica, step.replicas
        );

        if rwf.done {
            info!("running workflow {} is already done, not advancing", rwf.id);
            return Ok(());
        }

        let result = self.advance(&rwf, &step).await;
        self.fail_run_on_error(&rwf.id, result).await
    }

    /// Launch the step after `finished`, or finish the run when it was the
    /// last one.
    async fn advance(
        &self,
        rwf: &RunningWorkflow,
        finished: &RunningWorkflowStep,
    ) -> Result<(), EngineError> {
        if finished.replica > 0 {
            let succeeded = self
                .step_records(&rwf.id, &finished.name)
                .await?
                .iter()
                .filter(|s| s.done && s.success)
                .count();
            if (succeeded as u32) < finished.replicas {
                info!(
                    "waiting for step '{}' replicas ({}/{} done)",
                    finished.name, succeeded, finished.replicas
                );
                return Ok(());
            }
        }

        let definition = self.load_definition(rwf).await?;
        let index = definition
            .steps
            .iter()
            .position(|s| s.name == finished.name)
            .ok_or_else(|| EngineError::UnknownStep {
                workflow: definition.name.clone(),
                step: finished.name.clone(),
            })?;

        match definition.steps.get(index + 1) {
            Some(next) => {
                self.launch_step(rwf, &definition, next, Some(&finished.id))
                    .await
            }
            None => {
                info!("running workflow {} finished successfully", rwf.id);
                self.store
                    .set_running_workflow_done(&rwf.id, true, None, None)
                    .await?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Launching
    // ------------------------------------------------------------------

    /// Create the step record(s) for `step`, resolve their variables and
    /// launch them.
    ///
    /// Preparation and launch failures end the run and are not returned as
    /// errors; only store and lookup failures are.
    #[instrument(skip(self, rwf, definition, step), fields(running_workflow = %rwf.id, step = %step.name))]
    async fn launch_step(
        &self,
        rwf: &RunningWorkflow,
        definition: &WorkflowDefinition,
        step: &Step,
        prior_step_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let plan = match self.plan_replicas(rwf, definition, step).await? {
            Ok(plan) => plan,
            Err(e) => return self.fail_unlaunched(rwf, step, prior_step_id, e).await,
        };
        let replicas = plan.len() as u32;

        let spec = &step.specification;
        let Some(job) = self
            .store
            .get_job(&spec.collection, &spec.job, &spec.version)
            .await?
        else {
            let e = ResolveError::UnknownJob {
                collection: spec.collection.clone(),
                job: spec.job.clone(),
                version: spec.version.clone(),
            };
            return self.fail_unlaunched(rwf, step, prior_step_id, e).await;
        };
        let prior_steps = match self.prior_step_variables(rwf, step).await? {
            Ok(prior_steps) => prior_steps,
            Err(e) => return self.fail_unlaunched(rwf, step, prior_step_id, e).await,
        };

        for planned in plan {
            let record = self
                .store
                .create_running_workflow_step(
                    &rwf.id,
                    &step.name,
                    planned.replica,
                    replicas,
                    prior_step_id,
                )
                .await?;

            let variables = match prepare_variables(
                rwf,
                definition,
                step,
                &job,
                &prior_steps,
                planned.value,
            ) {
                Ok(variables) => variables,
                Err(e) => return self.fail_preparation(rwf, &record, e).await,
            };
            self.store
                .set_running_workflow_step_variables(&record.id, variables.clone())
                .await?;

            let params = LaunchParameters {
                project_id: rwf.project_id.clone(),
                name: step.name.clone(),
                launching_user_name: rwf.running_user.clone(),
                launching_user_api_token: rwf.running_user_api_token.clone(),
                specification: step.specification.clone(),
                specification_variables: Some(variables),
                debug: rwf.debug.clone().filter(|_| self.config.forward_debug),
                running_workflow_id: Some(rwf.id.clone()),
                running_workflow_step_id: Some(record.id.clone()),
            };
            match self.launcher.launch(params).await {
                Ok(launched) => info!(
                    "launched step '{}' replica {}/{} as instance {} (command={})",
                    step.name, planned.replica, replicas, launched.instance_id, launched.command
                ),
                Err(e) => {
                    error!("launching step '{}' failed: {}", step.name, e);
                    return self
                        .set_step_error(&rwf.id, Some(&record.id), e.error_num(), &e.to_string())
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Decide how many times `step` runs. The inner `Err` is a preparation
    /// failure that ends the run.
    async fn plan_replicas(
        &self,
        rwf: &RunningWorkflow,
        definition: &WorkflowDefinition,
        step: &Step,
    ) -> Result<Result<Vec<PlannedReplica>, ResolveError>, EngineError> {
        let single = vec![PlannedReplica {
            replica: 0,
            value: None,
        }];
        let driver = match decoder::get_step_replication_driver(step) {
            Ok(Some(driver)) => driver,
            Ok(None) => return Ok(Ok(single)),
            Err(e) => return Ok(Err(e.into())),
        };

        let source = decoder::get_step(definition, &driver.source_step_name).ok_or_else(|| {
            EngineError::UnknownStep {
                workflow: definition.name.clone(),
                step: driver.source_step_name.clone(),
            }
        })?;
        let spec = &source.specification;
        let source_is_files = self
            .store
            .get_job(&spec.collection, &spec.job, &spec.version)
            .await?
            .is_some_and(|job| job.output_is_files(&driver.source_variable));
        if !source_is_files {
            debug!(
                "'{}' of step '{}' is not a files output, step '{}' runs once",
                driver.source_variable, driver.source_step_name, step.name
            );
            return Ok(Ok(single));
        }

        let mut values = Vec::new();
        for record in self.step_records(&rwf.id, &driver.source_step_name).await? {
            values.extend(
                self.store
                    .get_running_workflow_step_output_values_for_output(
                        &record.id,
                        &driver.source_variable,
                    )
                    .await?,
            );
        }
        if values.is_empty() {
            return Ok(Err(ResolveError::NoReplicaValues {
                step: step.name.clone(),
                variable: driver.variable,
            }));
        }

        info!("step '{}' replicates over {} values", step.name, values.len());
        Ok(Ok(values
            .into_iter()
            .zip(1..)
            .map(|(value, replica)| PlannedReplica {
                replica,
                value: Some((driver.variable.clone(), value)),
            })
            .collect()))
    }

    /// Fetch the variables recorded by every prior step `step` is connected
    /// to. Replicated prior steps contribute one array per variable.
    async fn prior_step_variables(
        &self,
        rwf: &RunningWorkflow,
        step: &Step,
    ) -> Result<Result<Vec<PriorStepVariables>, ResolveError>, EngineError> {
        let mut prior_steps = Vec::new();
        for (step_name, connectors) in decoder::get_step_prior_step_variable_mapping(step) {
            let records = self.step_records(&rwf.id, &step_name).await?;
            let variables = match records.as_slice() {
                [] => {
                    return Ok(Err(WiringError::PriorStepNotRun {
                        step: step.name.clone(),
                        prior_step: step_name,
                    }
                    .into()))
                }
                [only] if only.replica == 0 => only.variables.clone(),
                replicas => resolver::aggregate_replica_variables(
                    &replicas.iter().map(|r| r.variables.clone()).collect::<Vec<_>>(),
                ),
            };
            prior_steps.push(PriorStepVariables {
                step_name,
                connectors,
                variables,
            });
        }
        Ok(Ok(prior_steps))
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    /// Record a step that could not even be planned, then fail it.
    async fn fail_unlaunched(
        &self,
        rwf: &RunningWorkflow,
        step: &Step,
        prior_step_id: Option<&str>,
        e: ResolveError,
    ) -> Result<(), EngineError> {
        let record = self
            .store
            .create_running_workflow_step(&rwf.id, &step.name, 0, 1, prior_step_id)
            .await?;
        self.fail_preparation(rwf, &record, e).await
    }

    async fn fail_preparation(
        &self,
        rwf: &RunningWorkflow,
        record: &RunningWorkflowStep,
        e: ResolveError,
    ) -> Result<(), EngineError> {
        warn!("step '{}' failed preparation: {}", record.name, e);
        self.set_step_error(&rwf.id, Some(&record.id), e.error_num(), &e.to_string())
            .await
    }

    /// Mark the step (if there is one) failed, then the running workflow.
    async fn set_step_error(
        &self,
        running_workflow_id: &str,
        running_workflow_step_id: Option<&str>,
        error_num: i32,
        error_msg: &str,
    ) -> Result<(), EngineError> {
        warn!(
            "step failed (running_workflow={} step={:?} error={} error_msg={})",
            running_workflow_id, running_workflow_step_id, error_num, error_msg
        );
        if let Some(step_id) = running_workflow_step_id {
            self.store
                .set_running_workflow_step_done(
                    step_id,
                    false,
                    Some(error_num),
                    Some(error_msg.to_owned()),
                )
                .await?;
        }
        self.store
            .set_running_workflow_done(
                running_workflow_id,
                false,
                Some(error_num),
                Some(error_msg.to_owned()),
            )
            .await?;
        Ok(())
    }

    /// Drive the run to a failed state when handling it hit an internal
    /// error, then hand the error back.
    async fn fail_run_on_error(
        &self,
        running_workflow_id: &str,
        result: Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let Err(e) = result else {
            return Ok(());
        };
        error!("running workflow {} failed: {}", running_workflow_id, e);
        if let Err(store_err) = self
            .store
            .set_running_workflow_done(
                running_workflow_id,
                false,
                Some(INTERNAL_ERROR_NUM),
                Some(e.to_string()),
            )
            .await
        {
            error!("cannot mark running workflow {} as failed: {}", running_workflow_id, store_err);
        }
        Err(e)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_definition(&self, rwf: &RunningWorkflow) -> Result<WorkflowDefinition, EngineError> {
        let workflow = self
            .store
            .get_workflow(&rwf.workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(rwf.workflow_id.clone()))?;
        Ok(WorkflowDefinition::from_value(&workflow.definition)?)
    }

    /// Records of one step of a run, in replica order.
    async fn step_records(
        &self,
        running_workflow_id: &str,
        step_name: &str,
    ) -> Result<Vec<RunningWorkflowStep>, EngineError> {
        let mut records: Vec<_> = self
            .store
            .get_running_workflow_steps(running_workflow_id)
            .await?
            .into_iter()
            .filter(|s| s.name == step_name)
            .collect();
        records.sort_by_key(|s| s.replica);
        Ok(records)
    }
}

/// Resolve the variables of one step record and check its command renders.
fn prepare_variables(
    rwf: &RunningWorkflow,
    definition: &WorkflowDefinition,
    step: &Step,
    job: &Job,
    prior_steps: &[PriorStepVariables],
    replica_value: Option<(String, Value)>,
) -> Result<Map<String, Value>, ResolveError> {
    let run_variables = resolver::run_variables(definition, &rwf.variables);
    let mut variables = resolver::resolve(
        &step.name,
        step.specification.variables.as_ref(),
        &run_variables,
        &decoder::get_step_workflow_variable_mapping(step),
        prior_steps,
    )?;
    if let Some((name, value)) = replica_value {
        variables.insert(name, value);
    }

    launcher::render(&job.command, &variables)?;
    Ok(variables)
}

#[async_trait]
impl MessageHandler for WorkflowEngine {
    async fn handle(&self, msg: Message) {
        if let Err(e) = self.handle_message(msg).await {
            error!("failed to handle message: {}", e);
        }
    }
}
