//! FieldAlert - safety alert dispatch
//!
//! Runs the alert engine against a local record directory with a console
//! presenter, or validates a configuration file.
//!
//! ## Usage
//!
//! ```bash
//! # Watch alerts for a regular operator
//! fieldalert run --records ./records --user 13 --office 100 --department 02 --team 03
//!
//! # As a manager, with a config file and verbose logging
//! fieldalert -v run --config fieldalert.yaml --records ./records --user 7 --office 100 --manager
//!
//! # Validate a config file
//! fieldalert check-config --config fieldalert.yaml
//! ```

mod console;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fieldalert_config::AlertConfig;
use fieldalert_core::{AlertKind, LogGuard, OperatorProfile, init_logging};
use fieldalert_engine::{
    AlertEngine, AlertEvent, Collaborators, DirectoryAlertSource, FileAckStore, OperationLogger,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::console::{ConsoleActuator, ConsolePresenter};

/// FieldAlert safety alert dispatch
#[derive(Parser, Debug)]
#[command(name = "fieldalert")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.fieldalert/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the alert engine until Ctrl-C
    Run(RunArgs),

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// YAML configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root of the alert record directory
    #[arg(long)]
    records: PathBuf,

    /// Operator id
    #[arg(long)]
    user: String,

    /// Office code
    #[arg(long)]
    office: String,

    /// Department code (required for regular operators)
    #[arg(long, default_value = "")]
    department: String,

    /// Team code (required for regular operators)
    #[arg(long, default_value = "")]
    team: String,

    /// Log in as a manager (polls every tick, sees the whole office)
    #[arg(long)]
    manager: bool,
}

impl RunArgs {
    fn operator(&self) -> anyhow::Result<OperatorProfile> {
        if !self.manager && (self.department.is_empty() || self.team.is_empty()) {
            bail!("--department and --team are required unless --manager is set");
        }
        Ok(OperatorProfile {
            user_id: self.user.clone(),
            is_manager: self.manager,
            office_code: self.office.clone(),
            department_code: self.department.clone(),
            team_code: self.team.clone(),
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::CheckConfig { config } => check_config(config),
        Commands::Run(args) => {
            let _guard = match setup_logging(&cli) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Failed to initialize logging: {}", e);
                    return ExitCode::from(1);
                }
            };
            run(args)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fieldalert error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(guidance) = e
                .downcast_ref::<fieldalert_core::AlertError>()
                .and_then(|e| e.guidance())
            {
                eprintln!("Hint: {}", guidance);
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> fieldalert_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = AlertConfig::load(path)?;
    println!("{} is valid", path.display());
    println!(
        "  poll every {}s, regular divisor {}, manager divisor {}",
        config.poll.tick_secs, config.poll.regular_divisor, config.poll.manager_divisor
    );
    println!("  reminder every {} min, order {:?}", config.reminder_interval_mins, config.order);
    for kind in AlertKind::ALL {
        let settings = config.kind(kind);
        println!(
            "  {kind}: store {:?}, repetition {}, sound {}s, vibration {:?}",
            config.storage.prefix(kind),
            settings.repetition,
            settings.sound_duration_secs,
            settings.vibration
        );
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AlertConfig> {
    match path {
        Some(path) => Ok(AlertConfig::load(path)?),
        None => Ok(AlertConfig::default()),
    }
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let operator = args.operator()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(serve(config, operator, args.records.clone()))
}

async fn serve(config: AlertConfig, operator: OperatorProfile, records: PathBuf) -> anyhow::Result<()> {
    let acks = FileAckStore::new(&config.ack_dir);
    let today = chrono::Local::now().date_naive();
    match acks.purge_before(&operator.user_id, today) {
        Ok(removed) if removed > 0 => info!(removed, "purged old acknowledgements"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not purge old acknowledgements"),
    }

    let oplog = OperationLogger::new(&config.operation_log)
        .await
        .context("failed to open operation log")?;

    let collaborators = Collaborators::new(
        Arc::new(DirectoryAlertSource::new(records)),
        Arc::new(acks),
        Arc::new(ConsolePresenter::new()),
        Arc::new(ConsoleActuator),
    )
    .with_oplog(oplog);

    let mut engine = AlertEngine::start(operator, config, collaborators)?;
    let mut events = engine.subscribe();
    println!("FieldAlert running, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(AlertEvent::OpenAdminTool(navigation)) => {
                    println!("[admin tool] {}", serde_json::to_string(&navigation)?);
                }
                Ok(event) => tracing::debug!(?event, "engine event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown().await?;
    Ok(())
}
