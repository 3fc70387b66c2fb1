//! Argument parsing, process setup and command dispatch.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lectern_app::{AppContext, ConsoleNavigation, logging_config};
use lectern_config::{ConfigError, LecternConfig};
use lectern_core::NavigationSink;
use lectern_telemetry::{InvocationSpan, TelemetryError, init_logging};
use tracing::warn;

use crate::commands::{
    handle_health, handle_list, handle_metrics, handle_open, handle_register, handle_resume,
    resume_pending,
};
use crate::error::{CliError, CliResult};
use crate::output::render_notices;

#[derive(Parser, Debug)]
#[command(
    name = "lectern",
    version,
    about = "Replace catalog placeholders with downloaded content"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Open a path, downloading it first when it is a placeholder.
    Open {
        /// Absolute path, or a path relative to the library root.
        path: PathBuf,
    },
    /// Navigate to the folder saved before the last restart, if still fresh.
    Resume,
    /// Probe every collaborator and report pass/fail per check.
    Health {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Write a stand-in file for a catalog identity and register it.
    Register {
        /// Catalog identity used to fetch the content later.
        identity: String,
        /// Absolute path, or a path relative to the library root.
        path: PathBuf,
    },
    /// List registered placeholders.
    List {
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the Prometheus exposition for this process.
    Metrics,
}

impl Command {
    pub(crate) const fn label(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Resume => "resume",
            Self::Health { .. } => "health",
            Self::Register { .. } => "register",
            Self::List { .. } => "list",
            Self::Metrics => "metrics",
        }
    }

    /// Commands that consume a pending restart handoff before running.
    /// `resume` consumes it itself; `health` never mutates state.
    pub(crate) const fn resumes_pending(&self) -> bool {
        !matches!(self, Self::Resume | Self::Health { .. })
    }
}

/// Parse arguments, run the requested command and return the process exit code.
///
/// After `open`, a non-zero code may be the exit code requested by the
/// restart mechanism that accepted the handoff.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let config = match LecternConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            let err = config_error(&err);
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };
    if let Err(err) = init_logging(&logging_config(&config)) {
        let err = logging_error(err);
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }
    let _span = InvocationSpan::enter(cli.command.label());

    let navigation: Arc<dyn NavigationSink> =
        Arc::new(ConsoleNavigation::stdout(config.library_root.clone()));
    let context = match AppContext::from_config(config, navigation) {
        Ok(context) => context,
        Err(err) => {
            let err = CliError::failure(anyhow::Error::new(err).context("startup failed"));
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let result = dispatch(&context, cli.command, &mut io::stdout()).await;
    if let Err(err) = render_notices(&mut io::stderr(), &context.events().backlog(0)) {
        warn!(error = %err, "failed to print notices");
    }
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) async fn dispatch(
    context: &AppContext,
    command: Command,
    out: &mut dyn Write,
) -> CliResult<i32> {
    if command.resumes_pending() {
        resume_pending(context).await;
    }
    match command {
        Command::Open { path } => handle_open(context, &path, out).await,
        Command::Resume => handle_resume(context, out).await,
        Command::Health { json } => handle_health(context, json, out).await,
        Command::Register { identity, path } => handle_register(context, &identity, &path, out),
        Command::List { json } => handle_list(context, json, out),
        Command::Metrics => handle_metrics(context, out),
    }
}

fn config_error(err: &ConfigError) -> CliError {
    match err {
        ConfigError::Missing { field } => CliError::validation(format!("{field} must be set")),
        ConfigError::InvalidField {
            field,
            reason,
            value,
        } => CliError::validation(format!(
            "{field} is invalid ({reason}){}",
            value
                .as_deref()
                .map_or_else(String::new, |value| format!(": {value}"))
        )),
    }
}

fn logging_error(err: TelemetryError) -> CliError {
    match err {
        TelemetryError::InvalidFilter { directives, .. } => {
            CliError::validation(format!("LECTERN_LOG_LEVEL is invalid: {directives}"))
        }
        other => CliError::failure(anyhow::Error::new(other).context("failed to initialise logging")),
    }
}
