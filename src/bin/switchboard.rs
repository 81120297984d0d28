//! Operator CLI for switchboard.
//!
//! Usage:
//!
//! ```text
//! switchboard [--config <path>] [--log-format text|json] list
//! switchboard [--config <path>] call <name> [json-arguments]
//! switchboard [--config <path>] console
//! ```
//!
//! Every command first connects the providers named in the configuration,
//! then acts, then disconnects everything. Results are printed to standard
//! output as one JSON line per action; logs go to standard error. The
//! console reads line commands from standard input until `quit`, end of
//! input or Ctrl-C:
//!
//! ```text
//! connect <id|-> piped <command> [args...]
//! connect <id|-> streamed <url>
//! disconnect <id>
//! disconnect-all
//! list
//! call <name> [json-arguments]
//! quit
//! ```

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use mockable::DefaultClock;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use switchboard::capability::adapters::TransportRouter;
use switchboard::capability::services::{
    CapabilityRegistry, ControlCommand, ControlOutcome, ControlSurface, ProviderConnectionManager,
};
use switchboard::config::{ConfigError, SwitchboardConfig};
use switchboard::orchestrator::services::{ProviderBootstrap, ShutdownHook};
use switchboard::telemetry::{LogFormat, TelemetryError, init_tracing};
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Exit code used when Ctrl-C interrupts a command.
const INTERRUPTED: u8 = 130;

/// How long pending runtime work may delay process exit.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(250);

type Surface = ControlSurface<TransportRouter, DefaultClock>;

#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about = "Connect tool providers and route calls to them")]
struct Cli {
    /// Bootstrap configuration file.
    #[arg(long, env = "SWITCHBOARD_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Log line format on standard error.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List connections and capabilities.
    List,
    /// Invoke one capability by qualified or bare name.
    Call {
        /// Capability name.
        name: String,
        /// JSON arguments.
        #[arg(default_value = "{}")]
        arguments: String,
    },
    /// Read control commands from standard input.
    Console,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("call arguments are not valid JSON: {0}")]
    Arguments(#[from] serde_json::Error),
    #[error("failed to read console input: {0}")]
    Input(#[from] LinesCodecError),
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
        .and_then(|runtime| {
            let outcome = runtime.block_on(run(cli));
            // A console blocked on stdin must not hold the process open.
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
            outcome
        });
    match result {
        Ok(code) => code,
        Err(err) => {
            let _reported = writeln!(io::stderr(), "switchboard: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    init_tracing(cli.log_format)?;
    let config = match &cli.config {
        Some(path) => SwitchboardConfig::load(path)?,
        None => SwitchboardConfig::default(),
    };

    let connector = Arc::new(TransportRouter::new(config.transport_settings())?);
    let manager = Arc::new(ProviderConnectionManager::new(
        connector,
        Arc::new(DefaultClock),
        Arc::new(CapabilityRegistry::new()),
        config.connection_settings(),
    ));
    let bootstrap = ProviderBootstrap::new(Arc::clone(&manager), config.providers.clone());
    let shutdown = ShutdownHook::new(Arc::clone(&manager));
    let surface = ControlSurface::new(manager);

    let outcome = tokio::select! {
        result = act(&bootstrap, &surface, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(ExitCode::from(INTERRUPTED))
        }
    };
    shutdown.fire().await;
    outcome
}

async fn act(
    bootstrap: &ProviderBootstrap<TransportRouter, DefaultClock>,
    surface: &Surface,
    command: Command,
) -> Result<ExitCode, CliError> {
    bootstrap.ensure().await;
    match command {
        Command::List => {
            emit(&surface.list())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Call { name, arguments } => {
            let parsed = serde_json::from_str(&arguments)?;
            let outcome = surface.call(&name, parsed).await;
            emit(&outcome)?;
            Ok(if outcome.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Console => console(surface).await,
    }
}

async fn console(surface: &Surface) -> Result<ExitCode, CliError> {
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        let text = line?;
        if text.trim().is_empty() {
            continue;
        }
        let outcome = match ControlCommand::parse(&text) {
            Ok(ControlCommand::Quit) => {
                emit(&ControlOutcome::ok("quit"))?;
                break;
            }
            Ok(command) => surface.execute(command).await,
            Err(err) => ControlOutcome::failed("parse", err.reason(), err.to_string()),
        };
        emit(&outcome)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn emit(outcome: &ControlOutcome) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", outcome.to_json_line())
        .and_then(|()| stdout.flush())
        .map_err(CliError::Output)
}
