//! Restart mechanisms, tried in a fixed priority order.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use lectern_config::RestartSettings;
use lectern_core::{RestartError, RestartMechanism, RestartResult, RestartTicket};
use tokio::process::Command;
use tracing::debug;

/// Exit code that asks a supervisor (systemd, runit, a wrapper script) to
/// start the process again. `EX_TEMPFAIL` from sysexits.
pub const SUPERVISOR_EXIT_CODE: i32 = 75;

/// Arguments the re-executed binary is started with.
const RESUME_ARGS: &[&str] = &["resume"];

/// Build mechanisms from configuration: supervisor, command, self re-exec.
#[must_use]
pub fn mechanisms_from_settings(settings: &RestartSettings) -> Vec<Arc<dyn RestartMechanism>> {
    let mut mechanisms: Vec<Arc<dyn RestartMechanism>> = Vec::with_capacity(3);
    mechanisms.push(Arc::new(SupervisorRestart::new(settings.supervised)));
    if let Some(argv) = &settings.command {
        mechanisms.push(Arc::new(CommandRestart::new(argv.clone())));
    }
    mechanisms.push(Arc::new(if settings.self_exec {
        SelfExecRestart::current()
    } else {
        SelfExecRestart::disabled()
    }));
    mechanisms
}

/// Exit with [`SUPERVISOR_EXIT_CODE`] and let the supervisor restart us.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorRestart {
    supervised: bool,
}

impl SupervisorRestart {
    /// Mechanism that is available only when running under a supervisor.
    #[must_use]
    pub const fn new(supervised: bool) -> Self {
        Self { supervised }
    }
}

#[async_trait]
impl RestartMechanism for SupervisorRestart {
    fn name(&self) -> &str {
        "supervisor"
    }

    fn available(&self) -> bool {
        self.supervised
    }

    async fn restart(&self) -> RestartResult<RestartTicket> {
        if !self.supervised {
            return Err(RestartError::Unavailable);
        }
        Ok(RestartTicket {
            mechanism: self.name().to_string(),
            exit_code: SUPERVISOR_EXIT_CODE,
        })
    }
}

/// Spawn an operator-provided command that restarts the host.
#[derive(Debug, Clone)]
pub struct CommandRestart {
    argv: Vec<String>,
}

impl CommandRestart {
    /// Mechanism running `argv`; the first element is the program.
    #[must_use]
    pub const fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl RestartMechanism for CommandRestart {
    fn name(&self) -> &str {
        "command"
    }

    fn available(&self) -> bool {
        !self.argv.is_empty()
    }

    async fn restart(&self) -> RestartResult<RestartTicket> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(RestartError::Unavailable);
        };
        spawn_detached(self.name(), PathBuf::from(program), args)?;
        Ok(RestartTicket {
            mechanism: self.name().to_string(),
            exit_code: 0,
        })
    }
}

/// Start a fresh copy of the current executable in `resume` mode.
#[derive(Debug, Clone)]
pub struct SelfExecRestart {
    executable: Option<PathBuf>,
}

impl SelfExecRestart {
    /// Mechanism bound to the running executable, if it can be located.
    #[must_use]
    pub fn current() -> Self {
        Self {
            executable: std::env::current_exe().ok(),
        }
    }

    /// Mechanism that is never available.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { executable: None }
    }
}

#[async_trait]
impl RestartMechanism for SelfExecRestart {
    fn name(&self) -> &str {
        "self_exec"
    }

    fn available(&self) -> bool {
        self.executable.as_ref().is_some_and(|path| path.is_file())
    }

    async fn restart(&self) -> RestartResult<RestartTicket> {
        let Some(executable) = self.executable.clone() else {
            return Err(RestartError::Unavailable);
        };
        let args: Vec<String> = RESUME_ARGS.iter().map(ToString::to_string).collect();
        spawn_detached(self.name(), executable, &args)?;
        Ok(RestartTicket {
            mechanism: self.name().to_string(),
            exit_code: 0,
        })
    }
}

fn spawn_detached(mechanism: &str, program: PathBuf, args: &[String]) -> RestartResult<()> {
    let child = Command::new(&program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(false)
        .spawn()
        .map_err(|source| RestartError::Spawn {
            mechanism: mechanism.to_string(),
            source,
        })?;
    debug!(
        mechanism,
        program = %program.display(),
        pid = child.id(),
        "restart process spawned"
    );
    Ok(())
}
