//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a workflow definition file at a given level.
//! - `run`      — run a workflow locally and wait for it to finish.
//! - `serve`    — start the engine and the REST API server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{EngineConfig, ValidationLevel, WorkflowEngine, WorkflowValidator};
use launcher::{ProcessLauncher, ProcessLauncherConfig};
use queue::{MessageDispatcher, MessageQueue, QueueHandle, WorkflowMessage};
use store::{InMemoryStore, JobCatalog, NewRunningWorkflow, RunStateStore};

#[derive(Parser)]
#[command(
    name = "workflow-engine",
    about = "Runs multi-step job workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Where jobs come from and where they run.
#[derive(clap::Args)]
struct EngineArgs {
    /// Job catalog YAML file(s).
    #[arg(long = "jobs", env = "JOB_DEFINITIONS", value_delimiter = ',', required = true)]
    jobs: Vec<PathBuf>,
    /// Directory holding one sub-directory per project.
    #[arg(long, env = "PROJECT_ROOT", default_value = "project-root")]
    project_root: PathBuf,
    /// Shell used to run job commands.
    #[arg(long, default_value = "sh")]
    shell: String,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition (YAML or JSON).
    Validate {
        path: PathBuf,
        #[arg(long, default_value = "create")]
        level: ValidationLevel,
        /// Run variable as NAME=VALUE. VALUE is read as JSON when it parses.
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, Value)>,
    },
    /// Run a workflow to completion and print the outcome.
    Run {
        #[arg(long)]
        workflow: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, default_value = "project-local")]
        project_id: String,
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, Value)>,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
    /// Start the engine and the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn parse_variable(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((name.to_owned(), value))
}

fn load_definition(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
}

/// A store loaded with the job catalog and an engine consuming the queue.
struct LocalEngine {
    store: Arc<InMemoryStore>,
    dispatcher: MessageDispatcher,
    handle: QueueHandle,
}

fn start_engine(args: &EngineArgs) -> Result<LocalEngine> {
    let mut catalog = JobCatalog::default();
    for path in &args.jobs {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read job catalog {}", path.display()))?;
        catalog.extend_from_yaml_str(&content)?;
    }
    info!("Loaded {} job definitions", catalog.len());

    std::fs::create_dir_all(&args.project_root).with_context(|| {
        format!("cannot create project root {}", args.project_root.display())
    })?;

    let store = Arc::new(InMemoryStore::with_jobs(catalog));
    let (queue, dispatcher) = MessageQueue::new();
    let launcher = Arc::new(ProcessLauncher::new(
        store.clone(),
        dispatcher.clone(),
        ProcessLauncherConfig {
            project_root: args.project_root.clone(),
            shell: args.shell.clone(),
        },
    ));
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        launcher,
        EngineConfig::default(),
    ));
    let handle = queue.start(engine);

    Ok(LocalEngine {
        store,
        dispatcher,
        handle,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate {
            path,
            level,
            variables,
        } => {
            let definition = load_definition(&path)?;
            let variables: Map<String, Value> = variables.into_iter().collect();
            let result = WorkflowValidator::validate(level, &definition, Some(&variables));
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_ok() {
                std::process::exit(1);
            }
        }
        Command::Run {
            workflow,
            engine,
            project_id,
            variables,
            timeout,
        } => {
            let definition = load_definition(&workflow)?;
            let variables: Map<String, Value> = variables.into_iter().collect();
            let result =
                WorkflowValidator::validate(ValidationLevel::Run, &definition, Some(&variables));
            if !result.is_ok() {
                println!("{}", serde_json::to_string_pretty(&result)?);
                std::process::exit(1);
            }

            let local = start_engine(&engine)?;
            let name = definition
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("workflow")
                .to_owned();
            let stored = local.store.create_workflow(definition).await?;
            let rwf = local
                .store
                .create_running_workflow(NewRunningWorkflow {
                    workflow_id: stored.id,
                    project_id,
                    name,
                    running_user: "local".into(),
                    running_user_api_token: String::new(),
                    variables,
                    debug: None,
                })
                .await?;
            local.dispatcher.send(WorkflowMessage::start(&rwf.id))?;
            info!("Started running workflow {}", rwf.id);

            let wait = async {
                loop {
                    match local.store.get_running_workflow(&rwf.id).await? {
                        Some(current) if current.done => return Ok::<_, anyhow::Error>(current),
                        Some(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                        None => bail!("running workflow {} disappeared", rwf.id),
                    }
                }
            };
            let finished = tokio::time::timeout(Duration::from_secs(timeout), wait)
                .await
                .with_context(|| format!("workflow did not finish within {timeout}s"))??;
            let steps = local.store.get_running_workflow_steps(&rwf.id).await?;

            local.handle.stop();
            local.handle.join().await;

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "running_workflow": finished,
                    "steps": steps,
                }))?
            );
            if !finished.success {
                std::process::exit(1);
            }
        }
        Command::Serve { bind, engine } => {
            let local = start_engine(&engine)?;
            info!("Starting API server on {bind}");
            let state = api::AppState {
                store: local.store.clone(),
                dispatcher: local.dispatcher.clone(),
            };
            api::serve(bind, state).await?;
            local.handle.stop();
            local.handle.join().await;
        }
    }

    Ok(())
}
