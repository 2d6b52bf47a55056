use clap::{Parser, Subcommand};
use netwarden::bootstrap::BootstrapOutcome;
use netwarden::config::{self, BootstrapConfig, ProcessEnv, ReconcileConfig};
use netwarden::{Error, VERSION, commands};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reconcile Docker bridge networks and UFW rules on a monitoring host", long_about = None)]
struct Args {
    /// Dotenv file to load before reading configuration (default: ./.env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Path to log to (use "stdout" or "stderr" for console output)
    #[arg(short = 'l', long, global = true, default_value = "stdout")]
    log_path: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure the declared Docker networks exist with the declared addressing
    Bootstrap,

    /// Bring UFW rules and stale Docker networks in line with the policy
    Reconcile {
        /// Apply changes; without this flag the run only reports what it would do
        #[arg(long)]
        apply: bool,

        /// Log every decision at debug level
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_logging(args: &Args) -> Option<WorkerGuard> {
    let verbose = matches!(args.command, Command::Reconcile { verbose: true, .. });
    let env_filter = if args.debug || verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let (result, guard) = match args.log_path.as_str() {
        "stdout" => (
            tracing::subscriber::set_global_default(subscriber.with(fmt::layer())),
            None,
        ),
        "stderr" => (
            tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().with_writer(std::io::stderr)),
            ),
            None,
        ),
        path => {
            let file_appender = tracing_appender::rolling::never("", path);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = subscriber.with(fmt::layer().with_ansi(false).with_writer(non_blocking));
            (tracing::subscriber::set_global_default(subscriber), Some(guard))
        }
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
    guard
}

async fn bootstrap() -> Result<(), Error> {
    let config = BootstrapConfig::from_env(&ProcessEnv)?;
    let outcomes = commands::run_bootstrap(&config).await?;

    for (spec, outcome) in config.networks.iter().zip(&outcomes) {
        let status = match outcome {
            BootstrapOutcome::AlreadyPresent => "present",
            BootstrapOutcome::Created => "created",
            BootstrapOutcome::WouldCreate => "would create",
        };
        info!(network = %spec.name, status, "Network ready");
    }
    Ok(())
}

async fn reconcile(apply: bool) -> Result<(), Error> {
    let config = ReconcileConfig::from_env(&ProcessEnv)?;
    let report = commands::run_reconcile(&config, apply).await?;

    if !apply && !report.is_converged() {
        info!("DRY-RUN: rerun with --apply to make these changes");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(&args);

    info!("netwarden v{}", VERSION);

    if let Err(e) = config::load_env_file(args.env_file.as_deref()) {
        let e = Error::from(e);
        error!("{}", e);
        let code = match args.command {
            Command::Bootstrap => e.bootstrap_exit_code(),
            Command::Reconcile { .. } => e.reconcile_exit_code(),
        };
        return ExitCode::from(code);
    }

    match args.command {
        Command::Bootstrap => match bootstrap().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Bootstrap failed: {}", e);
                ExitCode::from(e.bootstrap_exit_code())
            }
        },
        Command::Reconcile { apply, .. } => match reconcile(apply).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Reconcile failed: {}", e);
                ExitCode::from(e.reconcile_exit_code())
            }
        },
    }
}
