// ABOUTME: Shared fakes for boltforge-core integration tests.
// ABOUTME: Scripted shell, event-logging filesystem, stub build service, runner builders.

#![allow(dead_code)]

use async_trait::async_trait;
use boltforge_core::action::{ActionCallbackData, BoltAction};
use boltforge_core::alert::AlertSink;
use boltforge_core::build::BuildService;
use boltforge_core::error::{ActionError, ContractValidationError, FsError, ShellError};
use boltforge_core::fs::{Encoding, FileSystem, MemoryFileSystem};
use boltforge_core::runner::{ActionRunner, RunnerConfig};
use boltforge_core::shell::{CommandOutput, ShellFacade};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Debug, Clone, Default)]
pub enum Script {
    #[default]
    Succeed,
    Delay(Duration),
    Fail(String),
    /// Signal `started`, then wait for cancellation and report a failing exit.
    FailAfterAbort,
}

/// Shell whose behavior per command is scripted up front.
#[derive(Default)]
pub struct ScriptedShell {
    pub log: EventLog,
    scripts: HashMap<String, Script>,
    pub started: Arc<Notify>,
}

impl ScriptedShell {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn script(mut self, command: &str, script: Script) -> Self {
        self.scripts.insert(command.to_string(), script);
        self
    }
}

#[async_trait]
impl ShellFacade for ScriptedShell {
    async fn execute_command(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ShellError> {
        let script = self.scripts.get(command).cloned().unwrap_or_default();
        let exit = match script {
            Script::Succeed => (0, String::new()),
            Script::Delay(delay) => {
                tokio::time::sleep(delay).await;
                (0, String::new())
            }
            Script::Fail(output) => (1, output),
            Script::FailAfterAbort => {
                self.started.notify_one();
                cancel.cancelled().await;
                (1, "killed".to_string())
            }
        };
        self.log.lock().unwrap().push(format!("shell:{command}"));
        Ok(CommandOutput {
            exit_code: exit.0,
            output: exit.1,
        })
    }

    fn is_running_or_pending(&self, _command: &str) -> bool {
        false
    }
}

/// In-memory filesystem that also logs every write into a shared event log.
pub struct LoggingFs {
    pub inner: MemoryFileSystem,
    log: EventLog,
}

impl LoggingFs {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryFileSystem::new("/project"),
            log,
        }
    }
}

#[async_trait]
impl FileSystem for LoggingFs {
    fn workdir(&self) -> PathBuf {
        self.inner.workdir()
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<(), FsError> {
        self.inner.mkdir(path, recursive).await
    }

    async fn read_file(&self, path: &Path, encoding: Encoding) -> Result<String, FsError> {
        self.inner.read_file(path, encoding).await
    }

    async fn write_file(
        &self,
        path: &Path,
        content: &str,
        encoding: Encoding,
    ) -> Result<(), FsError> {
        let relative = path.strip_prefix("/project").unwrap_or(path);
        self.log
            .lock()
            .unwrap()
            .push(format!("write:{}", relative.display()));
        self.inner.write_file(path, content, encoding).await
    }

    async fn rm(&self, path: &Path, force: bool, recursive: bool) -> Result<(), FsError> {
        self.inner.rm(path, force, recursive).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }
}

/// Build service that never touches a shell.
#[derive(Default)]
pub struct StubBuild {
    pub invalid_project: bool,
}

#[async_trait]
impl BuildService for StubBuild {
    async fn build(&self, _cancel: CancellationToken) -> Result<CommandOutput, ActionError> {
        Ok(CommandOutput {
            exit_code: 0,
            output: String::new(),
        })
    }

    async fn validate_contract_project(&self) -> Result<(), ContractValidationError> {
        if self.invalid_project {
            Err(ContractValidationError {
                message: "missing package.json".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn build_contract(
        &self,
        _cancel: CancellationToken,
    ) -> Result<CommandOutput, ActionError> {
        self.build(CancellationToken::new()).await
    }
}

pub fn runner(
    fs: Arc<LoggingFs>,
    shell: Arc<ScriptedShell>,
    alerts: Arc<dyn AlertSink>,
    config: RunnerConfig,
) -> ActionRunner {
    ActionRunner::new(fs, shell, Arc::new(StubBuild::default()), alerts, config)
}

pub fn action_data(action_id: &str, action: BoltAction) -> ActionCallbackData {
    ActionCallbackData {
        artifact_id: "artifact".to_string(),
        message_id: "message".to_string(),
        action_id: action_id.to_string(),
        action,
        suppress_side_effects: false,
    }
}

pub fn file_action(path: &str, content: &str) -> BoltAction {
    BoltAction::File {
        file_path: path.to_string(),
        content: content.to_string(),
        binary: false,
    }
}

pub fn shell_action(command: &str) -> BoltAction {
    BoltAction::Shell {
        command: command.to_string(),
    }
}
