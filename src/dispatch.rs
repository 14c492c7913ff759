//! Running resolved commands: locally, elevated, or over a remote session.
//!
//! A macro replay is a best-effort batch. Every command is attempted in
//! stored order even when an earlier one fails.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use colored::Colorize;

use crate::error::{MacroError, Result};
use crate::params::substitute;
use crate::remote::{RemoteConfig, RemoteConnector, RemoteSession};

pub enum ExecutionMode {
    Local,
    Elevated,
    Remote(RemoteConfig),
}

impl ExecutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Elevated => "elevated",
            ExecutionMode::Remote(_) => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured output. Only remote sessions capture; local commands
    /// write straight to the terminal.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ExecutionOutcome {
    pub fn inherited(status: Option<i32>) -> Self {
        ExecutionOutcome {
            status,
            stdout: None,
            stderr: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait Executor {
    fn execute(&mut self, command: &str) -> Result<ExecutionOutcome>;
}

/// Build the executor for `mode`. Remote modes connect here, once per
/// invocation; the session closes when the returned executor is dropped.
pub fn open_executor(
    mode: &ExecutionMode,
    connector: &dyn RemoteConnector,
) -> Result<Box<dyn Executor>> {
    match mode {
        ExecutionMode::Local => Ok(Box::new(LocalExecutor)),
        ExecutionMode::Elevated => Ok(Box::new(ElevatedExecutor::detect()?)),
        ExecutionMode::Remote(config) => {
            let session = connector.connect(config)?;
            Ok(Box::new(RemoteExecutor { session }))
        }
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn run_inherited(mut cmd: Command, command: &str) -> Result<ExecutionOutcome> {
    // Inherit stdio so the command runs interactively
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = cmd.status().map_err(|source| MacroError::Spawn {
        command: command.to_string(),
        source,
    })?;
    Ok(ExecutionOutcome::inherited(status.code()))
}

pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn execute(&mut self, command: &str) -> Result<ExecutionOutcome> {
        run_inherited(shell_command(command), command)
    }
}

/// Runs commands through `sudo`/`doas` on Unix and a UAC prompt on Windows.
pub struct ElevatedExecutor {
    program: PathBuf,
}

impl ElevatedExecutor {
    #[cfg(unix)]
    pub fn detect() -> Result<Self> {
        which::which("sudo")
            .or_else(|_| which::which("doas"))
            .map(|program| ElevatedExecutor { program })
            .map_err(|_| {
                MacroError::UnsupportedPlatform("neither sudo nor doas was found on PATH".to_string())
            })
    }

    #[cfg(windows)]
    pub fn detect() -> Result<Self> {
        which::which("powershell")
            .map(|program| ElevatedExecutor { program })
            .map_err(|_| MacroError::UnsupportedPlatform("powershell was not found on PATH".to_string()))
    }

    #[cfg(not(any(unix, windows)))]
    pub fn detect() -> Result<Self> {
        Err(MacroError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        if cfg!(windows) {
            let script = format!(
                "$p = Start-Process -FilePath cmd -ArgumentList '/C', '{}' -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
                command.replace('\'', "''")
            );
            cmd.args(["-NoProfile", "-Command", &script]);
        } else {
            cmd.args(["sh", "-c", command]);
        }
        cmd
    }
}

impl Executor for ElevatedExecutor {
    fn execute(&mut self, command: &str) -> Result<ExecutionOutcome> {
        let outcome = run_inherited(self.build(command), command)?;
        if !outcome.success() {
            return Err(MacroError::Elevation {
                command: command.to_string(),
                status: outcome.status,
            });
        }
        Ok(outcome)
    }
}

pub struct RemoteExecutor {
    session: Box<dyn RemoteSession>,
}

impl Executor for RemoteExecutor {
    fn execute(&mut self, command: &str) -> Result<ExecutionOutcome> {
        self.session.exec(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub total: usize,
    pub failed: usize,
}

impl ReplayReport {
    pub fn into_result(self) -> Result<()> {
        if self.failed == 0 {
            Ok(())
        } else {
            Err(MacroError::ReplayFailed {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

/// Substitute and dispatch every template in order.
///
/// Substitution happens right before each dispatch. A failing command is
/// reported on `out` and the loop moves on to the next one.
pub fn replay(
    templates: &[String],
    params: &[String],
    executor: &mut dyn Executor,
    out: &mut dyn Write,
) -> Result<ReplayReport> {
    let mut report = ReplayReport {
        total: templates.len(),
        failed: 0,
    };

    for template in templates {
        let command = substitute(template, params);
        writeln!(out, "{}", format!("→ {command}").green())?;
        out.flush()?;

        let result = match executor.execute(&command) {
            Ok(outcome) => {
                print_captured(&outcome, &mut *out)?;
                if outcome.success() {
                    Ok(())
                } else {
                    Err(MacroError::CommandFailed {
                        command: command.clone(),
                        status: outcome.status,
                    })
                }
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            tracing::debug!(command = %command, error = %err, "Command failed");
            writeln!(out, "{}", format!("Error: {err}").red())?;
            report.failed += 1;
        }
        writeln!(out)?;
    }

    Ok(report)
}

fn print_captured(outcome: &ExecutionOutcome, out: &mut dyn Write) -> Result<()> {
    if let Some(stdout) = outcome.stdout.as_deref().filter(|s| !s.is_empty()) {
        write!(out, "{stdout}")?;
        if !stdout.ends_with('\n') {
            writeln!(out)?;
        }
    }
    if let Some(stderr) = outcome.stderr.as_deref().filter(|s| !s.is_empty()) {
        writeln!(out, "{}", format!("Error: {}", stderr.trim_end()).red())?;
    }
    Ok(())
}
