mod config;
mod render;
mod session;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{default_config_path, default_store_path, WalletConfig};
use render::{render_navigation, render_task_list};
use session::Session;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;
use wallet_core::{CredentialState, CredentialType, EligibilityFlag};
use wallet_tasks::{ChannelNavigator, ConnectionResolver, TaskActivator};

#[derive(Parser, Debug)]
#[command(name = "pending-tasks")]
#[command(about = "Pending credential tasks for the wallet holder", long_about = None)]
struct Cli {
    /// Agent fixture (JSON) standing in for the identity agent
    #[arg(long, global = true, env = "PENDING_TASKS_FIXTURE")]
    fixture: Option<PathBuf>,
    /// SQLite store holding the eligibility record
    #[arg(long, global = true, env = "PENDING_TASKS_STORE")]
    store: Option<PathBuf>,
    #[arg(long, global = true, env = "PENDING_TASKS_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Show the pending tasks
    List(ListArgs),
    /// Open the task at a 1-based position in the list
    Activate(ActivateArgs),
    /// Manage the trusted traveler eligibility record
    Eligibility {
        #[command(subcommand)]
        action: EligibilityCommands,
    },
    /// Move a credential to a new state, as the agent would
    Emit(EmitArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ActivateArgs {
    index: usize,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum EligibilityCommands {
    Set(EligibilitySetArgs),
    Clear,
}

#[derive(Args, Debug)]
struct EligibilitySetArgs {
    /// labResult, exemption or vaccination
    credential_type: String,
    /// Store the record with hasCredential = false
    #[arg(long)]
    off: bool,
}

#[derive(Args, Debug)]
struct EmitArgs {
    credential_id: String,
    state: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = WalletConfig::load(&config_path)?;
    let store_path = cli.store.clone().unwrap_or_else(default_store_path);
    let session = Session::open(config, cli.fixture.as_deref(), &store_path)?;

    match cli.command {
        Commands::List(args) => list_tasks(&session, &args).await,
        Commands::Activate(args) => activate_task(&session, &args).await,
        Commands::Eligibility { action } => match action {
            EligibilityCommands::Set(args) => set_eligibility(&session, &args),
            EligibilityCommands::Clear => clear_eligibility(&session),
        },
        Commands::Emit(args) => emit_state(&session, &args).await,
    }
}

/// Logs stay silent unless `PENDING_TASKS_LOG_STDOUT` names a truthy value, so
/// they never interleave with the rendered task list.
fn log_to_stderr(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = if log_to_stderr(std::env::var("PENDING_TASKS_LOG_STDOUT").ok().as_deref()) {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init();
}

async fn list_tasks(session: &Session, args: &ListArgs) -> Result<()> {
    let aggregator = session.spawn_aggregator();
    let snapshot = session.load_tasks(&aggregator).await?;
    aggregator.shutdown().await;

    if args.json {
        let payload = serde_json::to_string_pretty(&snapshot)?;
        println!("{}", payload);
        return Ok(());
    }
    print!("{}", render_task_list(&snapshot));
    Ok(())
}

async fn activate_task(session: &Session, args: &ActivateArgs) -> Result<()> {
    let aggregator = session.spawn_aggregator();
    let snapshot = session.load_tasks(&aggregator).await?;
    aggregator.shutdown().await;

    let task = args
        .index
        .checked_sub(1)
        .and_then(|index| snapshot.tasks.get(index))
        .ok_or_else(|| {
            anyhow!(
                "No task at position {} ({} pending)",
                args.index,
                snapshot.tasks.len()
            )
        })?;

    let (navigator, mut navigations) = ChannelNavigator::new();
    let activator = TaskActivator::new(
        ConnectionResolver::new(session.agent.clone()),
        session.namer.clone(),
        Arc::new(navigator),
    );
    let target = activator
        .activate_task(task)
        .await
        .with_context(|| format!("Failed to open '{}'", task.label()))?;

    match target {
        Some(_) => {
            while let Ok(navigation) = navigations.try_recv() {
                print!("{}", render_navigation(&navigation));
            }
        }
        None => println!("Nothing to open for '{}'", task.label()),
    }
    Ok(())
}

fn set_eligibility(session: &Session, args: &EligibilitySetArgs) -> Result<()> {
    let credential_type = CredentialType::from_tag(args.credential_type.trim());
    if let CredentialType::Unrecognized(tag) = &credential_type {
        warn!(event = "eligibility_type_unrecognized", credential_type = %tag);
    }
    let flag = EligibilityFlag {
        has_credential: !args.off,
        credential_type,
    };
    let key = &session.config.eligibility_key;
    session
        .store
        .write_eligibility(key, &flag)
        .context("Failed to write eligibility record")?;
    info!(
        event = "eligibility_written",
        key = %key,
        has_credential = flag.has_credential,
        credential_type = %flag.credential_type
    );
    println!(
        "Eligibility set: {} (hasCredential = {})",
        flag.credential_type, flag.has_credential
    );
    Ok(())
}

fn clear_eligibility(session: &Session) -> Result<()> {
    let key = &session.config.eligibility_key;
    let removed = session
        .store
        .remove(key)
        .context("Failed to clear eligibility record")?;
    if removed {
        println!("Eligibility record cleared.");
    } else {
        println!("No eligibility record stored.");
    }
    Ok(())
}

async fn emit_state(session: &Session, args: &EmitArgs) -> Result<()> {
    if session.fixture_path().is_none() {
        bail!("emit needs --fixture to record the new state");
    }
    let state = args
        .state
        .parse::<CredentialState>()
        .map_err(anyhow::Error::msg)?;

    let aggregator = session.spawn_aggregator();
    session.load_tasks(&aggregator).await?;
    let record = session
        .agent
        .update_state(&args.credential_id, state)
        .with_context(|| format!("Failed to update {}", args.credential_id))?;
    let snapshot = session.wait_for_refreshes(&aggregator, 2).await?;
    aggregator.shutdown().await;

    session.save_fixture()?;
    println!("{} -> {}", record.id, record.state);
    print!("{}", render_task_list(&snapshot));
    Ok(())
}
