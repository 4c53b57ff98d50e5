//! Bulkops CLI
//!
//! Runs bulk moves, reports task status and previews imports against a
//! Jira site configured in the bulkops config file.

use anyhow::{bail, Context, Result};
use bulkops_core::models::{BulkOperationRules, Config, StepName};
use bulkops_core::storage::init_data_dir;
use bulkops_engine::events::MappingEventType;
use bulkops_engine::{
    BulkMoveController, BulkOpsEvent, ConfigManager, EventManager, ImportSession, MappingEvent,
    TaskEvent, TaskOrchestrator,
};
use bulkops_jira::{JiraAuth, JiraClient, JiraGateway};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "bulkops")]
#[command(about = "Bulk move and bulk edit orchestration for Jira work items", long_about = None)]
struct Args {
    /// Log level; defaults to the configured level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Update the saved configuration, optionally storing the API token in the keyring
    Configure(ConfigureArgs),

    /// Move the work items matched by a query to another project
    Move {
        #[arg(long)]
        jql: String,

        /// Target project id or key
        #[arg(long)]
        target: String,

        /// Explicit issue type mapping: <sourceProjectId>/<sourceIssueTypeId>=<targetIssueTypeId>
        #[arg(long = "map")]
        mappings: Vec<String>,

        /// Default for a mandatory field: <targetIssueTypeId>.<fieldId>=<value>
        #[arg(long = "default")]
        defaults: Vec<String>,

        /// Keep the current value of a field: <targetIssueTypeId>.<fieldId>
        #[arg(long = "retain")]
        retained: Vec<String>,

        /// Send the bulk change notification email
        #[arg(long)]
        notify: bool,
    },

    /// Show the outcome of a bulk task
    Status { task_id: String },

    /// Parse an import file and show how its columns match the target fields
    ImportPreview {
        file: PathBuf,

        #[arg(long)]
        project: String,

        #[arg(long)]
        issue_type: String,
    },
}

#[derive(clap::Args, Debug)]
struct ConfigureArgs {
    /// Restore the default configuration before applying the other options
    #[arg(long)]
    reset: bool,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Store the token from BULKOPS_API_TOKEN in the OS keyring
    #[arg(long)]
    store_token: bool,

    /// JSON file holding the bulk operation rules
    #[arg(long)]
    rules: Option<PathBuf>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    submit_retry_limit: Option<u32>,

    #[arg(long)]
    submit_retry_delay_ms: Option<u64>,

    /// Log level saved as the default
    #[arg(long)]
    default_log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new()?;
    let config = config_manager.get().await;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    init_logging(&log_level)?;
    tracing::debug!("Config file: {}", config_manager.path().display());

    match args.command {
        Command::Configure(configure_args) => configure(&config_manager, configure_args).await,
        Command::Move {
            jql,
            target,
            mappings,
            defaults,
            retained,
            notify,
        } => {
            let gateway = connect(&config)?;
            run_move(gateway, &config, &jql, &target, &mappings, &defaults, &retained, notify).await
        }
        Command::Status { task_id } => {
            let gateway = connect(&config)?;
            let orchestrator = TaskOrchestrator::new(gateway, Arc::new(EventManager::new()), &config.tasks);
            match orchestrator.poll_outcome(&task_id).await? {
                Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                None => println!("Outcome of task {} is not available yet", task_id),
            }
            Ok(())
        }
        Command::ImportPreview {
            file,
            project,
            issue_type,
        } => {
            let gateway = connect(&config)?;
            import_preview(gateway, &config, &file, &project, &issue_type).await
        }
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let data_dir = init_data_dir()?;
    let log_file_path = data_dir.join("bulkops.log");

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    // stdout carries command output, so logs go to stderr and the file
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    let stderr_writer = std::io::stderr.with_max_level(tracing::Level::INFO);
    let file_writer = log_file.with_max_level(tracing::Level::DEBUG);

    tracing_subscriber::fmt()
        .with_writer(stderr_writer.and(file_writer))
        .with_env_filter(log_level)
        .with_ansi(false)
        .init();

    tracing::debug!("Log file: {}", log_file_path.display());
    Ok(())
}

async fn configure(manager: &ConfigManager, args: ConfigureArgs) -> Result<()> {
    if args.reset {
        manager.reset_to_default().await?;
        println!("Restored the default configuration");
    }

    if let Some(path) = &args.rules {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules from {}", path.display()))?;
        let rules: BulkOperationRules = serde_json::from_str(&content)
            .with_context(|| format!("Invalid rules in {}", path.display()))?;
        manager.update_rules(rules).await?;
    }

    if args.poll_interval_ms.is_some() || args.submit_retry_limit.is_some() || args.submit_retry_delay_ms.is_some() {
        manager
            .update_task_config(args.poll_interval_ms, args.submit_retry_limit, args.submit_retry_delay_ms)
            .await?;
    }

    if let Some(level) = &args.default_log_level {
        manager.set_log_level(level).await?;
    }

    let config = manager.set_jira(args.base_url, args.username).await?;
    println!("Saved configuration to {}", manager.path().display());

    if args.store_token {
        let username = config
            .jira
            .username
            .context("A username is required to store the API token")?;
        let token = std::env::var(bulkops_jira::auth::TOKEN_ENV_VAR)
            .with_context(|| format!("{} is not set", bulkops_jira::auth::TOKEN_ENV_VAR))?;
        JiraAuth::new(username, token).store()?;
        println!("API token stored in the keyring");
    }
    Ok(())
}

fn connect(config: &Config) -> Result<Arc<dyn JiraGateway>> {
    let base_url = config
        .jira
        .base_url
        .as_deref()
        .context("No Jira site configured; run `bulkops configure --base-url …`")?;
    let username = config
        .jira
        .username
        .as_deref()
        .context("No Jira user configured; run `bulkops configure --username …`")?;

    let auth = JiraAuth::resolve(username)?;
    let client = JiraClient::new(base_url, auth)?;
    tracing::info!("Connected to {}", base_url);
    Ok(Arc::new(client))
}

/// Splits `<typeId>.<fieldId>` into its parts
fn parse_field_ref(value: &str) -> Result<(String, String)> {
    match value.split_once('.') {
        Some((type_id, field_id)) if !type_id.is_empty() && !field_id.is_empty() => {
            Ok((type_id.to_string(), field_id.to_string()))
        }
        _ => bail!("Expected <issueTypeId>.<fieldId>, got {:?}", value),
    }
}

/// Waits for the deferred issue type mapping notification
async fn wait_for_mapping(events: &mut broadcast::Receiver<BulkOpsEvent>, timeout: Duration) -> bool {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(BulkOpsEvent::Mapping(MappingEvent {
                    event_type: MappingEventType::StepNotified { all_mapped, .. },
                    ..
                })) => return all_mapped,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.unwrap_or(false)
}

#[allow(clippy::too_many_arguments)]
async fn run_move(
    gateway: Arc<dyn JiraGateway>,
    config: &Config,
    jql: &str,
    target: &str,
    mappings: &[String],
    defaults: &[String],
    retained: &[String],
    notify: bool,
) -> Result<()> {
    let events = Arc::new(EventManager::new());
    let controller = BulkMoveController::new(gateway, config, events.clone())?;
    let mut mapping_events = events.subscribe();

    let items = controller.search(jql).await?;
    let selection = controller.set_selection(items).await?;
    if !selection.is_valid() {
        bail!("{}", selection.validity.describe());
    }
    println!(
        "Selected {} work items ({} including subtasks)",
        selection.len(),
        controller.in_play_items().await.len()
    );

    let report = controller.set_target_project(target).await?;
    println!(
        "Mapped {} issue types automatically, {} unmapped",
        report.new_count - report.original_count,
        report.unmapped.len()
    );

    for mapping in mappings {
        let (source, target_type) = mapping
            .split_once('=')
            .with_context(|| format!("Invalid mapping {:?}", mapping))?;
        let (source_project, source_type) = source
            .split_once('/')
            .with_context(|| format!("Invalid mapping source {:?}", source))?;
        controller
            .map_issue_type(source_project, source_type, target_type)
            .await?;
    }

    for default in defaults {
        let (field_ref, value) = default
            .split_once('=')
            .with_context(|| format!("Invalid default {:?}", default))?;
        let (type_id, field_id) = parse_field_ref(field_ref)?;
        controller.select_text_value(&type_id, &field_id, value).await?;
    }

    for retain in retained {
        let (type_id, field_id) = parse_field_ref(retain)?;
        controller.retain_field_value(&type_id, &field_id, true).await?;
    }

    let delay = Duration::from_millis(config.workflow.mapping_notification_delay_ms) + Duration::from_secs(5);
    if !wait_for_mapping(&mut mapping_events, delay).await {
        tracing::warn!("Issue type mapping was not confirmed");
    }

    let missing = controller
        .workflow()
        .incomplete_upstream_steps(StepName::MoveOrEdit)
        .await?;
    if missing.contains(&StepName::FieldMapping) {
        for type_id in controller.fields().tracked_issue_type_ids().await {
            for info in controller.fields().fields_needing_defaults(&type_id).await {
                println!(
                    "Issue type {} needs a value for {} ({}): --default {}.{}=<value>",
                    type_id, info.field.name, info.field.id, type_id, info.field.id
                );
            }
        }
    }

    let submission = controller.execute(notify).await?;
    let Some(task_id) = submission.task_id.clone() else {
        for error in &submission.errors {
            eprintln!("{}", error.message);
        }
        bail!(
            "Bulk move rejected (status {})",
            submission.status_code.unwrap_or_default()
        );
    };
    println!("Bulk move submitted as task {}", task_id);

    let mut task_events = events.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = task_events.recv().await {
            if let BulkOpsEvent::Task(TaskEvent {
                event_type: bulkops_engine::events::TaskEventType::Progress { status, progress_percent },
                ..
            }) = event
            {
                println!("{} {}%", status.as_str(), progress_percent);
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = controller.await_task(&task_id, cancel).await;
    interrupt.abort();
    progress.abort();

    match outcome? {
        Some(outcome) if outcome.status.is_success() => {
            println!("Task {} complete", task_id);
            Ok(())
        }
        Some(outcome) => {
            for message in outcome.failure_messages() {
                eprintln!("{}", message);
            }
            bail!("Task {} finished as {}", task_id, outcome.status.as_str())
        }
        None => {
            println!(
                "Stopped waiting; the move continues on the server. Check it with `bulkops status {}`",
                task_id
            );
            Ok(())
        }
    }
}

async fn import_preview(
    gateway: Arc<dyn JiraGateway>,
    config: &Config,
    file: &std::path::Path,
    project: &str,
    issue_type: &str,
) -> Result<()> {
    let mut session = ImportSession::new(
        gateway,
        config.import.clone(),
        Arc::new(EventManager::new()),
        Duration::from_millis(config.workflow.debounce_ms),
    )?;

    let table = session.load_path(file).await?;
    println!(
        "{}: {} rows, {} skipped",
        table.file_name,
        table.issue_count(),
        table.skipped_rows.len()
    );
    for (column, column_type) in table.header.iter().zip(&table.column_types) {
        println!("  column {:?}: {:?}", column, column_type);
    }
    let has_rows = table.issue_count() > 0;

    session.select_target(project, issue_type).await?;
    for column_match in session.matcher().matches() {
        println!(
            "  {} <- {:?}{}",
            column_match.field.name,
            column_match.column_name,
            if column_match.user_selected { " (selected)" } else { "" }
        );
    }
    for field in session.fields().iter().filter(|f| f.needs_user_default()) {
        if session.matcher().match_for_field(&field.key).is_none() {
            println!("  {} is required but has no column", field.name);
        }
    }

    if has_rows {
        let first = session.field_values(0)?;
        println!("First row: {}", serde_json::to_string_pretty(&first)?);
    }
    Ok(())
}
