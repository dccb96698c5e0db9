//! Remediator CLI
//!
//! Runs the alert remediation server, dry-runs remediation plans through the
//! command validator, and inspects persisted session context.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use remediator::alerts::AlertIngestor;
use remediator::config::{RemediatorConfig, DEFAULT_CONFIG_PATH};
use remediator::context::{ContextStore, FileContextStore};
use remediator::server::{run_server, ServerState};
use remediator::tools::{CommandValidator, ProposedPlan};

/// Alert-driven remediation orchestrator
#[derive(Parser)]
#[command(name = "remediator")]
#[command(about = "Alert-driven remediation orchestrator - diagnoses, validates, executes and reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log format (json or text)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// [SERVER] Receive Alertmanager webhooks and run remediation sessions
    Server {
        /// Address to bind to
        #[arg(long, env = "REMEDIATOR_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,

        /// Path to remediator config file
        #[arg(long, env = "REMEDIATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Dry-run a remediation plan through the command validator
    Validate {
        /// JSON file with `{ "rationale": ..., "commands": [...] }`
        #[arg(long)]
        plan: PathBuf,

        /// Namespace used for commands that do not name one
        #[arg(long, default_value = "default")]
        namespace: String,

        /// Path to remediator config file (validator section is used)
        #[arg(long, env = "REMEDIATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Show context persisted by the file store
    Inspect {
        /// Session store directory
        #[arg(long, env = "REMEDIATOR_STORE_DIR")]
        store_dir: PathBuf,

        /// Session to show (lists sessions when omitted)
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Server { addr, config } => run_server_command(&addr, &config).await,
        Commands::Validate {
            plan,
            namespace,
            config,
        } => run_validate_command(&plan, &namespace, &config),
        Commands::Inspect { store_dir, session } => {
            run_inspect_command(store_dir, session.as_deref()).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("remediator=info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn load_config(path: &std::path::Path) -> Result<RemediatorConfig> {
    let config = RemediatorConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?
        .with_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// =============================================================================
// Server Command Handler
// =============================================================================

/// Run the remediation HTTP server.
async fn run_server_command(addr: &str, config_path: &std::path::Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "═".repeat(60).cyan());
    println!("{}", "REMEDIATOR SERVER".cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    println!();
    println!("  Address:      {}", addr.green());
    println!("  Config:       {}", config_path.display().to_string().green());
    println!(
        "  Store:        {}",
        match config.store.backend {
            remediator::config::StoreBackend::Memory => "memory".to_string(),
            remediator::config::StoreBackend::File => config.store.dir.display().to_string(),
        }
        .cyan()
    );
    println!(
        "  Diagnosis:    {}",
        config
            .collaborators
            .diagnosis_url
            .as_deref()
            .map_or_else(|| "not configured".red(), |url| url.cyan())
    );
    println!(
        "  Report:       {}",
        config
            .collaborators
            .report_url
            .as_deref()
            .map_or_else(|| "not configured".red(), |url| url.cyan())
    );
    println!("  Policy:       {:?}", config.execution.policy);
    println!(
        "  Concurrency:  {}",
        config.ingest.max_concurrent_sessions
    );
    println!();

    let orchestrator =
        remediator::build_orchestrator(&config).context("Failed to initialize orchestrator")?;
    let ingestor = AlertIngestor::new(orchestrator, &config.ingest);
    let state = Arc::new(ServerState::new(ingestor));

    println!("{}", format!("Starting server on {addr}...").cyan());
    run_server(state, addr).await
}

// =============================================================================
// Validate Command Handler
// =============================================================================

fn run_validate_command(
    plan_path: &std::path::Path,
    namespace: &str,
    config_path: &std::path::Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let content = std::fs::read_to_string(plan_path)
        .with_context(|| format!("Failed to read plan {}", plan_path.display()))?;
    let plan: ProposedPlan = serde_json::from_str(&content).context("Failed to parse plan")?;

    let validation = CommandValidator::new(&config.validator).validate_plan(&plan, namespace);

    println!("{}", "═".repeat(60).cyan());
    println!("{}", "PLAN VALIDATION".cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    for verdict in &validation.verdicts {
        match (verdict.result.data(), verdict.result.error()) {
            (Some(command), _) => {
                println!("  {} #{} {}", "✓".green(), verdict.index, command);
            }
            (_, Some(error)) => {
                println!("  {} #{} {}", "✗".red(), verdict.index, verdict.command);
                println!("      {}", error.message.red());
                if let Some(suggestion) = &error.suggestion {
                    println!("      {}", suggestion.dimmed());
                }
            }
            (None, None) => {}
        }
    }
    println!();

    if let Some(rejection) = &validation.rejection {
        println!("{}", format!("REJECTED: {rejection}").red().bold());
        std::process::exit(1);
    }
    println!("{}", "ACCEPTED".green().bold());
    Ok(())
}

// =============================================================================
// Inspect Command Handler
// =============================================================================

async fn run_inspect_command(store_dir: PathBuf, session: Option<&str>) -> Result<()> {
    let store = FileContextStore::new(store_dir);

    let Some(session_id) = session else {
        let sessions = store.sessions().await.context("Failed to list sessions")?;
        println!("{}", format!("{} sessions", sessions.len()).cyan().bold());
        for id in sessions {
            let keys = store.keys(&id).await.unwrap_or_default();
            let keys: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
            println!("  {} {}", id.green(), keys.join(", ").dimmed());
        }
        return Ok(());
    };

    let keys = store
        .keys(session_id)
        .await
        .with_context(|| format!("Failed to read session {session_id}"))?;
    if keys.is_empty() {
        anyhow::bail!("No context stored for session {session_id}");
    }

    println!("{}", "═".repeat(60).cyan());
    println!("{}", format!("SESSION {session_id}").cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    for key in keys {
        let entry = store.get(session_id, key).await?;
        println!(
            "{} {}",
            key.as_str().yellow().bold(),
            format!("(by {} at {})", entry.written_by, entry.written_at.to_rfc3339()).dimmed()
        );
        println!("{}", serde_json::to_string_pretty(&entry.value)?);
        println!();
    }
    Ok(())
}
