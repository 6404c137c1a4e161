// ABOUTME: Shell facade the runner executes commands through.
// ABOUTME: LocalShell spawns `sh -c` via tokio::process; DryRunShell only records commands.

use crate::error::ShellError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command as ProcessCommand;
use tokio_util::sync::CancellationToken;

/// Exit code and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ShellFacade: Send + Sync {
    /// Run `command` to completion. Cancelling `cancel` must stop the process
    /// and return [`ShellError::Aborted`].
    async fn execute_command(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ShellError>;

    /// Whether an identical command is currently executing.
    fn is_running_or_pending(&self, command: &str) -> bool;

    /// Resolves once the shell can accept commands.
    async fn ready(&self) -> Result<(), ShellError> {
        Ok(())
    }
}

type RunningCommands = Arc<Mutex<HashMap<String, usize>>>;

/// Decrements the running count for a command when dropped.
struct RunningGuard {
    running: RunningCommands,
    command: String,
}

impl RunningGuard {
    fn new(running: &RunningCommands, command: &str) -> Self {
        *running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(command.to_string())
            .or_insert(0) += 1;
        Self {
            running: Arc::clone(running),
            command: command.to_string(),
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = running.get_mut(&self.command) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                running.remove(&self.command);
            }
        }
    }
}

/// Runs commands with `<program> -c <command>` inside the working directory.
#[derive(Debug, Clone)]
pub struct LocalShell {
    program: String,
    workdir: PathBuf,
    timeout: Duration,
    running: RunningCommands,
}

impl LocalShell {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: "sh".to_string(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(600),
            running: Arc::default(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ShellFacade for LocalShell {
    async fn execute_command(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ShellError> {
        if cancel.is_cancelled() {
            return Err(ShellError::Aborted(command.to_string()));
        }

        tracing::debug!(command = %command, cwd = %self.workdir.display(), "Spawning shell command");

        let child = ProcessCommand::new(&self.program)
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ShellError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let _guard = RunningGuard::new(&self.running, command);

        // Dropping the wait future drops the child, which kills it.
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(command = %command, "Shell command aborted");
                Err(ShellError::Aborted(command.to_string()))
            }
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                let output = match result {
                    Err(_) => {
                        return Err(ShellError::TimedOut {
                            command: command.to_string(),
                            timeout_secs: self.timeout.as_secs(),
                        })
                    }
                    Ok(output) => output.map_err(|source| ShellError::Io {
                        command: command.to_string(),
                        source,
                    })?,
                };

                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                // Killed by a signal reports no code.
                let exit_code = output.status.code().unwrap_or(-1);
                tracing::debug!(command = %command, exit_code, "Shell command finished");
                Ok(CommandOutput {
                    exit_code,
                    output: combined,
                })
            }
        }
    }

    fn is_running_or_pending(&self, command: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(command)
    }
}

/// Records commands without executing them. Every command succeeds.
#[derive(Debug, Default)]
pub struct DryRunShell {
    commands: Mutex<Vec<String>>,
}

impl DryRunShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ShellFacade for DryRunShell {
    async fn execute_command(
        &self,
        command: &str,
        _cancel: CancellationToken,
    ) -> Result<CommandOutput, ShellError> {
        tracing::info!(command = %command, "Dry run, not executing");
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
        Ok(CommandOutput {
            exit_code: 0,
            output: String::new(),
        })
    }

    fn is_running_or_pending(&self, _command: &str) -> bool {
        false
    }
}
