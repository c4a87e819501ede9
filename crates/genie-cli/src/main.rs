mod presenter;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use genie_core::backend::{HttpBackend, HttpBackendConfig, JobBackend};
use genie_core::models::{
    CoreError, CoreErrorKind, JobId, Query, RunId, RunRecord, RunSnapshot, RunState, Tool,
};
use genie_core::orchestration::{
    CoordinatorConfig, FailurePolicy, OrchestrationResult, SaveRun, SubmissionCoordinator,
};
use genie_core::persistence::RunStore;
use genie_core::sqlite::SqliteStore;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

use crate::presenter::{StderrReporter, TerminalPresenter};

#[derive(Parser)]
#[command(name = "genie", version, about = "Submit design queries and follow their progress")]
struct Cli {
    /// Base URL of the design backend
    #[arg(long, env = "GENIE_SERVER", default_value = "http://localhost:5000", global = true)]
    server: String,
    /// SQLite database recording submitted runs
    #[arg(long, env = "GENIE_HISTORY_DB", global = true)]
    history_db: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a query and follow it to completion
    Submit {
        /// JSON file holding the query object
        query_file: PathBuf,
        /// Override the query's app
        #[arg(long)]
        tool: Option<Tool>,
        /// Merge a JSON file into the query under KEY
        #[arg(long = "context", value_name = "KEY=JSON_FILE")]
        context: Vec<String>,
        /// Save the results once the run finishes
        #[arg(long)]
        save: bool,
        /// Continue with the next job when one fails
        #[arg(long)]
        skip_failed: bool,
        /// Give up (and cancel) after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Ask the backend to cancel a job
    Cancel { job_id: String },
    /// List recently submitted runs
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List the available tools
    Tools,
}

/// Background work still running when a command returns (remote cancels,
/// stream readers) gets this long before the process exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("genie: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(kind = ?error.kind, app = ?error.app, job = ?error.job, "command failed");
            eprintln!("genie: {}", error.message);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> OrchestrationResult<()> {
    let history_db = cli.history_db.clone().or_else(default_history_path);

    match cli.command {
        Command::Submit {
            query_file,
            tool,
            context,
            save,
            skip_failed,
            timeout,
        } => {
            let settings = SubmitSettings {
                server: cli.server,
                history_db,
                save,
                failure_policy: if skip_failed {
                    FailurePolicy::SkipFailedJobs
                } else {
                    FailurePolicy::Halt
                },
                timeout: timeout.map(Duration::from_secs),
            };
            submit(&query_file, tool, &context, settings).await
        }
        Command::Cancel { job_id } => cancel(&cli.server, JobId::new(job_id)).await,
        Command::History { limit } => history(history_db, limit).await,
        Command::Tools => {
            for tool in Tool::ALL {
                let merge = match tool {
                    Tool::Save => "links",
                    other => other.merge_mode().as_str(),
                };
                println!("{:<18} {merge}", tool.as_str());
            }
            Ok(())
        }
    }
}

struct SubmitSettings {
    server: String,
    history_db: Option<PathBuf>,
    save: bool,
    failure_policy: FailurePolicy,
    timeout: Option<Duration>,
}

async fn submit(
    query_file: &Path,
    tool: Option<Tool>,
    context: &[String],
    settings: SubmitSettings,
) -> OrchestrationResult<()> {
    let mut document = read_json(query_file)?;
    if let Some(tool) = tool
        && let Value::Object(object) = &mut document
    {
        object.insert("app".to_string(), Value::String(tool.as_str().to_string()));
    }
    let mut query = Query::from_json(document)?;

    let mut context_values = Map::new();
    for entry in context {
        let Some((key, path)) = entry.split_once('=') else {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("context '{entry}' must look like KEY=JSON_FILE"),
            ));
        };
        let value = read_json(Path::new(path))?;
        query = query.with_context(key, value.clone());
        context_values.insert(key.to_string(), value);
    }

    let config = match query.tool() {
        Some(tool) => CoordinatorConfig::for_tool(tool),
        None => CoordinatorConfig::new(query.app.clone()),
    }
    .with_failure_policy(settings.failure_policy);

    let backend: Arc<dyn JobBackend> =
        Arc::new(HttpBackend::new(HttpBackendConfig::new(settings.server))?);
    let mut builder = SubmissionCoordinator::builder(config, backend)
        .presenter(Arc::new(TerminalPresenter))
        .error_reporter(Arc::new(StderrReporter));
    if let Some(store) = open_history(settings.history_db.as_deref()).await {
        builder = builder.run_store(store);
    }
    let coordinator = builder.build();

    let run_id = coordinator.submit(query).await?;
    let snapshot = follow(&coordinator, run_id, settings.timeout).await?;
    print_results(&coordinator)?;

    match snapshot.state {
        RunState::Finished => {}
        RunState::Cancelled => {
            return Err(CoreError::new(CoreErrorKind::Cancelled, "run cancelled"));
        }
        _ => {
            return Err(CoreError::new(
                CoreErrorKind::JobError,
                format!("run ended in state '{}': {}", snapshot.state, snapshot.update.message),
            ));
        }
    }

    if settings.save {
        let save = SaveRun::from_coordinator(&coordinator);
        let save_id = save.save(context_values).await?;
        let saved = follow(save.coordinator(), save_id, settings.timeout).await?;
        if !save.saved() {
            return Err(CoreError::new(
                CoreErrorKind::JobError,
                format!("save ended in state '{}': {}", saved.state, saved.update.message),
            ));
        }
        print_results(&coordinator)?;
    }

    Ok(())
}

/// Waits for `run_id` to end. A timeout cancels the run before reporting.
async fn follow(
    coordinator: &SubmissionCoordinator,
    run_id: RunId,
    timeout: Option<Duration>,
) -> OrchestrationResult<RunSnapshot> {
    match coordinator.wait_for_terminal(run_id, timeout).await {
        Err(error) if error.kind == CoreErrorKind::Timeout => {
            coordinator.cancel().await?;
            Err(error)
        }
        outcome => outcome,
    }
}

fn print_results(coordinator: &SubmissionCoordinator) -> OrchestrationResult<()> {
    let Some(results) = coordinator.results().snapshot()? else {
        return Ok(());
    };
    let rendered = serde_json::to_string_pretty(&results.to_json()).map_err(|error| {
        CoreError::new(CoreErrorKind::Internal, format!("unable to render results: {error}"))
    })?;
    println!("{rendered}");
    Ok(())
}

async fn cancel(server: &str, job_id: JobId) -> OrchestrationResult<()> {
    let backend = HttpBackend::new(HttpBackendConfig::new(server))?;
    let requested = job_id.clone();
    tokio::task::spawn_blocking(move || backend.cancel(&requested))
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("cancel request join failure: {join_error}"),
            )
        })??;
    println!("cancellation requested for job {job_id}");
    Ok(())
}

async fn history(history_db: Option<PathBuf>, limit: usize) -> OrchestrationResult<()> {
    let Some(path) = history_db else {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            "no history database configured; pass --history-db or set GENIE_HISTORY_DB",
        ));
    };

    let runs = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::new(path);
        store.migrate_to_latest()?;
        store.list_recent_runs(limit)
    })
    .await
    .map_err(|join_error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("history query join failure: {join_error}"),
        )
    })??;

    if runs.is_empty() {
        println!("no runs recorded");
    }
    for run in &runs {
        println!("{}", history_line(run));
    }
    Ok(())
}

fn history_line(run: &RunRecord) -> String {
    let created = OffsetDateTime::from(run.created_at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "-".to_string());
    let message = run.message.as_deref().unwrap_or("");
    format!(
        "{created}  {:<18} #{:<4} {:<10} {:>3} results  {message}",
        run.label, run.run_id.0, run.state, run.result_count
    )
}

/// Opens and migrates the history store. Failures only disable history.
async fn open_history(path: Option<&Path>) -> Option<Arc<dyn RunStore>> {
    let path = path?.to_path_buf();
    let store = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::new(path);
        store.migrate_to_latest().map(|()| store)
    })
    .await;

    match store {
        Ok(Ok(store)) => Some(Arc::new(store)),
        Ok(Err(error)) => {
            tracing::warn!(message = %error.message, "run history disabled");
            None
        }
        Err(join_error) => {
            tracing::warn!(error = %join_error, "run history disabled");
            None
        }
    }
}

fn default_history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".genie").join("history.sqlite3"))
}

fn read_json(path: &Path) -> OrchestrationResult<Value> {
    let raw = fs::read_to_string(path).map_err(|error| {
        CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("unable to read '{}': {error}", path.display()),
        )
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("'{}' is not valid JSON: {error}", path.display()),
        )
    })
}
