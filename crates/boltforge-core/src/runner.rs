// ABOUTME: Action runner: registry of actions plus a single FIFO worker that executes them.
// ABOUTME: Dispatches shell/start/file/update/build/supabase actions through the facades.

use crate::action::{
    is_binary_path_with, ActionCallbackData, ActionStatus, ActionType, BoltAction, Occurrences,
    SupabaseOperation, DEFAULT_BINARY_EXTENSIONS,
};
use crate::alert::{
    ActionAlert, AlertSink, AlertSource, AlertType, DeployAlert, DeployStage, StageStatus,
    SupabaseAlert,
};
use crate::build::BuildService;
use crate::error::{ActionCommandError, ActionError, FsError};
use crate::fs::{resolve_path, Encoding, FileSystem};
use crate::shell::ShellFacade;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const SHELL_FAILED: &str = "Failed To Execute Shell Command";
const START_FAILED: &str = "Failed To Start Application";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Write file content while the action body is still streaming.
    pub stream_file_writes: bool,
    /// How long the queue waits on a `start` action before moving on.
    pub start_grace: Duration,
    /// Extensions written as base64 even when the tag did not say `binary`.
    pub binary_extensions: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stream_file_writes: true,
            start_grace: Duration::from_millis(2000),
            binary_extensions: DEFAULT_BINARY_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Registry entry for one action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub artifact_id: String,
    pub message_id: String,
    pub action_id: String,
    pub action: BoltAction,
    pub status: ActionStatus,
    /// A non-streaming execution has been scheduled (or recorded).
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    abort: CancellationToken,
}

/// Broadcast whenever an action's status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Completes once the scheduled execution has been processed by the queue.
#[derive(Debug)]
pub struct JobHandle(oneshot::Receiver<()>);

impl JobHandle {
    pub async fn finished(self) {
        // A dropped sender means the worker is gone; nothing left to wait for.
        let _ = self.0.await;
    }
}

/// Aborts one action from outside the runner.
#[derive(Clone)]
pub struct AbortHandle {
    action_id: String,
    shared: Arc<RunnerShared>,
}

impl AbortHandle {
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn abort(&self) {
        self.shared.abort(&self.action_id);
    }
}

enum RunnerJob {
    MarkRunning {
        action_id: String,
    },
    Execute {
        action_id: String,
        streaming: bool,
        done: oneshot::Sender<()>,
    },
    Barrier(oneshot::Sender<()>),
}

enum Outcome {
    Done,
    /// Status will be settled later by a background task.
    Detached,
}

struct RunnerShared {
    registry: Mutex<HashMap<String, ActionState>>,
    fs: Arc<dyn FileSystem>,
    shell: Arc<dyn ShellFacade>,
    build: Arc<dyn BuildService>,
    alerts: Arc<dyn AlertSink>,
    config: RunnerConfig,
    events: broadcast::Sender<StatusUpdate>,
}

/// Owns the action registry and the queue that executes actions one at a time
/// in the order they were scheduled.
///
/// Must be created inside a tokio runtime; the worker task lives as long as
/// the runner.
pub struct ActionRunner {
    shared: Arc<RunnerShared>,
    jobs: mpsc::UnboundedSender<RunnerJob>,
}

impl std::fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRunner")
            .field("config", &self.shared.config)
            .finish()
    }
}

impl ActionRunner {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        shell: Arc<dyn ShellFacade>,
        build: Arc<dyn BuildService>,
        alerts: Arc<dyn AlertSink>,
        config: RunnerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let shared = Arc::new(RunnerShared {
            registry: Mutex::new(HashMap::new()),
            fs,
            shell,
            build,
            alerts,
            config,
            events,
        });
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(Arc::clone(&shared), rx));
        Self { shared, jobs }
    }

    /// Register an action as `Pending`. Repeated calls for the same id are ignored.
    pub fn add_action(&self, data: &ActionCallbackData) {
        {
            let mut registry = self.shared.lock();
            if registry.contains_key(&data.action_id) {
                return;
            }
            registry.insert(
                data.action_id.clone(),
                ActionState {
                    artifact_id: data.artifact_id.clone(),
                    message_id: data.message_id.clone(),
                    action_id: data.action_id.clone(),
                    action: data.action.clone(),
                    status: ActionStatus::Pending,
                    executed: false,
                    error: None,
                    abort: CancellationToken::new(),
                },
            );
        }
        tracing::debug!(action_id = %data.action_id, action_type = %data.action.action_type(), "Action registered");
        self.send(RunnerJob::MarkRunning {
            action_id: data.action_id.clone(),
        });
    }

    /// Enqueue an execution of a registered action.
    ///
    /// Returns `Ok(None)` when nothing was queued: the action already had its
    /// final execution, or a streaming execution was requested for a type
    /// that does not stream.
    pub fn schedule_action(
        &self,
        data: &ActionCallbackData,
        streaming: bool,
    ) -> Result<Option<JobHandle>, ActionError> {
        {
            let mut registry = self.shared.lock();
            let Some(state) = registry.get_mut(&data.action_id) else {
                return Err(ActionError::NotRegistered(data.action_id.clone()));
            };
            if state.executed {
                return Ok(None);
            }
            if streaming && !data.action.action_type().is_streamable() {
                return Ok(None);
            }
            state.action = data.action.clone();
            state.executed = !streaming;
        }

        let (done, rx) = oneshot::channel();
        self.send(RunnerJob::Execute {
            action_id: data.action_id.clone(),
            streaming,
            done,
        });
        Ok(Some(JobHandle(rx)))
    }

    /// Schedule and wait until the queue has processed the execution.
    pub async fn run_action(
        &self,
        data: &ActionCallbackData,
        streaming: bool,
    ) -> Result<Option<ActionStatus>, ActionError> {
        if let Some(handle) = self.schedule_action(data, streaming)? {
            handle.finished().await;
        }
        Ok(self.snapshot(&data.action_id).map(|state| state.status))
    }

    /// Register an action from a replayed message as already complete,
    /// without any side effects.
    pub fn record_action(&self, data: &ActionCallbackData) {
        self.add_action(data);
        {
            let mut registry = self.shared.lock();
            if let Some(state) = registry.get_mut(&data.action_id) {
                state.action = data.action.clone();
                state.executed = true;
            }
        }
        self.shared
            .set_status(&data.action_id, ActionStatus::Complete, None);
    }

    /// Cancel an action. Returns false for unknown ids.
    pub fn abort(&self, action_id: &str) -> bool {
        self.shared.abort(action_id)
    }

    pub fn abort_handle(&self, action_id: &str) -> Option<AbortHandle> {
        self.shared
            .lock()
            .contains_key(action_id)
            .then(|| AbortHandle {
                action_id: action_id.to_string(),
                shared: Arc::clone(&self.shared),
            })
    }

    pub fn snapshot(&self, action_id: &str) -> Option<ActionState> {
        self.shared.lock().get(action_id).cloned()
    }

    /// All registered actions, ordered by id.
    pub fn actions(&self) -> Vec<ActionState> {
        let mut actions: Vec<ActionState> = self.shared.lock().values().cloned().collect();
        actions.sort_by(|a, b| natural_id_order(&a.action_id, &b.action_id));
        actions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.shared.events.subscribe()
    }

    /// Wait until every job enqueued so far has been processed.
    pub async fn wait_idle(&self) {
        let (done, rx) = oneshot::channel();
        self.send(RunnerJob::Barrier(done));
        let _ = rx.await;
    }

    fn send(&self, job: RunnerJob) {
        if self.jobs.send(job).is_err() {
            tracing::error!("Action runner worker is gone, dropping job");
        }
    }
}

/// Orders `msg-2` before `msg-10`.
fn natural_id_order(a: &str, b: &str) -> std::cmp::Ordering {
    let split = |id: &str| -> (String, usize) {
        match id.rsplit_once('-') {
            Some((prefix, n)) => match n.parse() {
                Ok(n) => (prefix.to_string(), n),
                Err(_) => (id.to_string(), 0),
            },
            None => (id.to_string(), 0),
        }
    };
    split(a).cmp(&split(b))
}

async fn run_worker(shared: Arc<RunnerShared>, mut rx: mpsc::UnboundedReceiver<RunnerJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            RunnerJob::MarkRunning { action_id } => {
                shared.set_status(&action_id, ActionStatus::Running, None);
            }
            RunnerJob::Execute {
                action_id,
                streaming,
                done,
            } => {
                shared.execute(&action_id, streaming).await;
                let _ = done.send(());
            }
            RunnerJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Action runner queue closed");
}

impl RunnerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActionState>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a status change if the lifecycle allows it.
    fn set_status(&self, action_id: &str, status: ActionStatus, error: Option<String>) -> bool {
        {
            let mut registry = self.lock();
            let Some(state) = registry.get_mut(action_id) else {
                return false;
            };
            if state.status == status {
                return true;
            }
            if !state.status.can_transition_to(status) {
                tracing::debug!(
                    action_id = %action_id,
                    from = %state.status,
                    to = %status,
                    "Ignoring status transition"
                );
                return false;
            }
            state.status = status;
            state.error = error.clone();
        }
        let _ = self.events.send(StatusUpdate {
            action_id: action_id.to_string(),
            status,
            error,
        });
        true
    }

    fn abort(&self, action_id: &str) -> bool {
        let token = match self.lock().get(action_id) {
            Some(state) => state.abort.clone(),
            None => return false,
        };
        token.cancel();
        if self.set_status(action_id, ActionStatus::Aborted, None) {
            tracing::info!(action_id = %action_id, "Action aborted");
        }
        true
    }

    async fn execute(self: &Arc<Self>, action_id: &str, streaming: bool) {
        let Some(state) = self.lock().get(action_id).cloned() else {
            tracing::warn!(action_id = %action_id, "Execute job for unknown action");
            return;
        };
        if state.abort.is_cancelled() || state.status.is_terminal() {
            tracing::debug!(action_id = %action_id, status = %state.status, "Skipping execution");
            return;
        }

        let result = match self.shell.ready().await {
            Ok(()) => self.dispatch(&state, streaming).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(Outcome::Detached) => {}
            Ok(Outcome::Done) if streaming => {}
            Ok(Outcome::Done) => self.settle(&state, Ok(())),
            Err(e) if streaming => {
                // The closing execution decides the final status.
                tracing::warn!(action_id = %action_id, error = %e, "Streaming execution failed");
            }
            Err(e) => self.settle(&state, Err(e)),
        }
    }

    /// Terminal status for a finished execution. Abort always wins.
    fn settle(&self, state: &ActionState, result: Result<(), ActionError>) {
        let action_id = state.action_id.as_str();
        if state.abort.is_cancelled() {
            self.set_status(action_id, ActionStatus::Aborted, None);
            return;
        }
        match result {
            Ok(()) => {
                self.set_status(action_id, ActionStatus::Complete, None);
            }
            Err(e) => {
                tracing::error!(action_id = %action_id, error = %e, "Action failed");
                self.set_status(action_id, ActionStatus::Failed, Some(e.to_string()));
                self.alert_failure(&state.action, &e);
            }
        }
    }

    fn alert_failure(&self, action: &BoltAction, error: &ActionError) {
        match error {
            ActionError::ContractValidation(e) => self.alerts.on_alert(ActionAlert {
                kind: AlertType::Error,
                title: "Contract Validation Failed".to_string(),
                description: e.message.clone(),
                content: None,
                source: AlertSource::Contract,
            }),
            ActionError::Command(e) => match action.action_type() {
                ActionType::Build => self.alerts.on_deploy_alert(DeployAlert {
                    kind: AlertType::Error,
                    title: e.header.clone(),
                    description: "The build did not complete".to_string(),
                    content: Some(e.output.clone()),
                    url: None,
                    stage: DeployStage::Building,
                    build_status: StageStatus::Failed,
                    deploy_status: StageStatus::Pending,
                }),
                ActionType::BuildContract => self.alerts.on_alert(ActionAlert {
                    kind: AlertType::Error,
                    title: e.header.clone(),
                    description: e.header.clone(),
                    content: Some(e.output.clone()),
                    source: AlertSource::Contract,
                }),
                _ => self.alerts.on_alert(ActionAlert {
                    kind: AlertType::Error,
                    title: e.header.clone(),
                    description: e.header.clone(),
                    content: Some(e.output.clone()),
                    source: AlertSource::Terminal,
                }),
            },
            _ => {}
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        state: &ActionState,
        streaming: bool,
    ) -> Result<Outcome, ActionError> {
        let cancel = state.abort.clone();
        match &state.action {
            BoltAction::Shell { command } => {
                self.run_shell(command, cancel).await?;
                Ok(Outcome::Done)
            }
            BoltAction::Start { command } => self.run_start(state, command).await,
            BoltAction::File {
                file_path,
                content,
                binary,
            } => {
                if streaming && !self.config.stream_file_writes {
                    return Ok(Outcome::Done);
                }
                self.write_file(file_path, content, *binary, &cancel)
                    .await?;
                Ok(Outcome::Done)
            }
            BoltAction::Update {
                file_path,
                old,
                new,
                occurrences,
            } => {
                if !streaming {
                    self.run_update(&state.action_id, file_path, old, new, *occurrences, &cancel)
                        .await?;
                }
                Ok(Outcome::Done)
            }
            BoltAction::Build => {
                self.run_build(cancel).await?;
                Ok(Outcome::Done)
            }
            BoltAction::BuildContract => {
                self.build.validate_contract_project().await?;
                self.build.build_contract(cancel).await?;
                self.alerts.on_alert(ActionAlert {
                    kind: AlertType::Success,
                    title: "Contract Build Complete".to_string(),
                    description: "The contract was built successfully".to_string(),
                    content: None,
                    source: AlertSource::Contract,
                });
                Ok(Outcome::Done)
            }
            BoltAction::Supabase {
                operation,
                file_path,
                content,
                ..
            } => {
                self.run_supabase(*operation, file_path.as_deref(), content, &cancel)
                    .await?;
                Ok(Outcome::Done)
            }
        }
    }

    async fn run_shell(&self, command: &str, cancel: CancellationToken) -> Result<(), ActionError> {
        let command = command.trim();
        if command.is_empty() {
            tracing::warn!("Shell action without a command, nothing to run");
            return Ok(());
        }
        tracing::info!(command = %command, "Running shell action");
        let output = self.shell.execute_command(command, cancel).await?;
        if !output.success() {
            return Err(ActionCommandError::new(SHELL_FAILED, output.output).into());
        }
        Ok(())
    }

    async fn run_start(
        self: &Arc<Self>,
        state: &ActionState,
        command: &str,
    ) -> Result<Outcome, ActionError> {
        let command = command.trim().to_string();
        if command.is_empty() {
            tracing::warn!(action_id = %state.action_id, "Start action without a command");
            return Ok(Outcome::Done);
        }
        if self.shell.is_running_or_pending(&command) {
            tracing::info!(command = %command, "Application already running, not restarting");
            return Ok(Outcome::Done);
        }

        tracing::info!(command = %command, "Starting application");
        let shared = Arc::clone(self);
        let task_state = state.clone();
        let mut handle = tokio::spawn(async move {
            let result = match shared
                .shell
                .execute_command(&command, task_state.abort.clone())
                .await
            {
                Ok(output) if output.success() => Ok(()),
                Ok(output) => Err(ActionCommandError::new(START_FAILED, output.output).into()),
                Err(e) => Err(e.into()),
            };
            shared.settle(&task_state, result);
        });

        // Give the process a head start; later jobs may depend on it.
        if tokio::time::timeout(self.config.start_grace, &mut handle)
            .await
            .is_err()
        {
            tracing::debug!(action_id = %state.action_id, "Start action still running after grace period");
        }
        Ok(Outcome::Detached)
    }

    async fn write_file(
        &self,
        file_path: &str,
        content: &str,
        binary: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let workdir = self.fs.workdir();
        let path = resolve_path(&workdir, file_path)?;
        self.ensure_parent(&workdir, &path).await;

        let binary = binary || is_binary_path_with(file_path, &self.config.binary_extensions);
        if cancel.is_cancelled() {
            return Err(ActionError::Aborted);
        }
        self.fs
            .write_file(&path, content, Encoding::for_binary(binary))
            .await?;
        tracing::debug!(path = %path.display(), binary, "File written");
        Ok(())
    }

    /// Best-effort `mkdir -p` of the parent directory.
    async fn ensure_parent(&self, workdir: &Path, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent == workdir {
            return;
        }
        if let Err(e) = self.fs.mkdir(parent, true).await {
            tracing::warn!(path = %parent.display(), error = %e, "Failed to create folder");
        }
    }

    async fn run_update(
        &self,
        action_id: &str,
        file_path: &str,
        old: &str,
        new: &str,
        occurrences: Occurrences,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let path = resolve_path(&self.fs.workdir(), file_path)?;
        if old.is_empty() {
            tracing::debug!(action_id = %action_id, "Update without old text, nothing to replace");
            return Ok(());
        }

        let encoding =
            Encoding::for_binary(is_binary_path_with(file_path, &self.config.binary_extensions));
        let current = match self.fs.read_file(&path, encoding).await {
            Ok(current) => current,
            Err(FsError::NotFound(_)) => {
                tracing::debug!(path = %path.display(), "Update target does not exist");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(updated) = apply_occurrences(&current, old, new, occurrences) else {
            tracing::info!(path = %path.display(), ?occurrences, "Update text not found, file unchanged");
            return Ok(());
        };

        if cancel.is_cancelled() {
            return Err(ActionError::Aborted);
        }
        self.fs.write_file(&path, &updated, encoding).await?;
        tracing::debug!(path = %path.display(), "File updated");
        Ok(())
    }

    async fn run_build(&self, cancel: CancellationToken) -> Result<(), ActionError> {
        self.alerts.on_deploy_alert(DeployAlert {
            kind: AlertType::Info,
            title: "Building Application".to_string(),
            description: "Building your application".to_string(),
            content: None,
            url: None,
            stage: DeployStage::Building,
            build_status: StageStatus::Running,
            deploy_status: StageStatus::Pending,
        });

        let output = self.build.build(cancel).await?;

        self.alerts.on_deploy_alert(DeployAlert {
            kind: AlertType::Success,
            title: "Build Completed".to_string(),
            description: "Your application was built".to_string(),
            content: (!output.output.is_empty()).then(|| output.output.clone()),
            url: None,
            stage: DeployStage::Complete,
            build_status: StageStatus::Complete,
            deploy_status: StageStatus::Pending,
        });
        Ok(())
    }

    async fn run_supabase(
        &self,
        operation: SupabaseOperation,
        file_path: Option<&str>,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        match operation {
            SupabaseOperation::Migration => {
                let file_path = file_path.unwrap_or_default();
                self.alerts.on_supabase_alert(SupabaseAlert {
                    kind: AlertType::Info,
                    title: "Supabase Migration".to_string(),
                    description: format!("Create a migration file in {file_path}"),
                    content: content.to_string(),
                });
                self.write_file(file_path, content, false, cancel).await
            }
            SupabaseOperation::Query => {
                self.alerts.on_supabase_alert(SupabaseAlert {
                    kind: AlertType::Info,
                    title: "Supabase Query".to_string(),
                    description: "Execute database query".to_string(),
                    content: content.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// Replace `old` in `content` according to the occurrence policy.
///
/// Returns `None` when there is nothing to replace, including `Nth(n)` with
/// fewer than `n` matches.
pub fn apply_occurrences(
    content: &str,
    old: &str,
    new: &str,
    occurrences: Occurrences,
) -> Option<String> {
    if old.is_empty() {
        return None;
    }
    let index = match occurrences {
        Occurrences::All => {
            return content.contains(old).then(|| content.replace(old, new));
        }
        Occurrences::First => content.find(old)?,
        Occurrences::Nth(n) => {
            let skip = n.checked_sub(1)?;
            content.match_indices(old).nth(skip)?.0
        }
    };
    let mut updated = String::with_capacity(content.len() + new.len());
    updated.push_str(&content[..index]);
    updated.push_str(new);
    updated.push_str(&content[index + old.len()..]);
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Alert, ChannelAlertSink, NoopAlertSink};
    use crate::build::{BuildCommands, ShellBuildService};
    use crate::fs::MemoryFileSystem;
    use crate::shell::DryRunShell;

    fn runner_with(fs: Arc<MemoryFileSystem>, alerts: Arc<dyn AlertSink>) -> ActionRunner {
        let shell = Arc::new(DryRunShell::new());
        let build = Arc::new(ShellBuildService::new(
            shell.clone(),
            fs.clone(),
            BuildCommands::default(),
        ));
        ActionRunner::new(fs, shell, build, alerts, RunnerConfig::default())
    }

    fn data(id: &str, action: BoltAction) -> ActionCallbackData {
        ActionCallbackData {
            artifact_id: "art".to_string(),
            message_id: "msg".to_string(),
            action_id: id.to_string(),
            action,
            suppress_side_effects: false,
        }
    }

    fn file(path: &str, content: &str) -> BoltAction {
        BoltAction::File {
            file_path: path.to_string(),
            content: content.to_string(),
            binary: false,
        }
    }

    #[test]
    fn occurrence_policies() {
        assert_eq!(
            apply_occurrences("a a a", "a", "b", Occurrences::First).as_deref(),
            Some("b a a")
        );
        assert_eq!(
            apply_occurrences("a a a", "a", "b", Occurrences::All).as_deref(),
            Some("b b b")
        );
        assert_eq!(
            apply_occurrences("a a a", "a", "b", Occurrences::Nth(2)).as_deref(),
            Some("a b a")
        );
        assert_eq!(apply_occurrences("a a a", "a", "b", Occurrences::Nth(5)), None);
        assert_eq!(apply_occurrences("a a a", "z", "b", Occurrences::First), None);
        assert_eq!(apply_occurrences("a a a", "", "b", Occurrences::All), None);
    }

    #[test]
    fn ids_sort_numerically() {
        let mut ids = vec!["m-10", "m-2", "m-1"];
        ids.sort_by(|a, b| natural_id_order(a, b));
        assert_eq!(ids, vec!["m-1", "m-2", "m-10"]);
    }

    #[tokio::test]
    async fn file_action_writes_and_completes() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs.clone(), Arc::new(NoopAlertSink));
        let d = data("msg-0", file("src/index.ts", "hi\n"));

        runner.add_action(&d);
        assert_eq!(runner.snapshot("msg-0").unwrap().status, ActionStatus::Pending);
        let status = runner.run_action(&d, false).await.unwrap();

        assert_eq!(status, Some(ActionStatus::Complete));
        assert_eq!(fs.get("src/index.ts").as_deref(), Some("hi\n"));
    }

    #[tokio::test]
    async fn schedule_unknown_action_is_an_error() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs, Arc::new(NoopAlertSink));
        let result = runner.schedule_action(&data("nope", file("a.txt", "")), false);
        assert!(matches!(result, Err(ActionError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn invalid_path_fails_the_action() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs.clone(), Arc::new(NoopAlertSink));
        let d = data("msg-0", file("../escape.txt", "x"));
        runner.add_action(&d);
        let status = runner.run_action(&d, false).await.unwrap();

        assert_eq!(status, Some(ActionStatus::Failed));
        let state = runner.snapshot("msg-0").unwrap();
        assert!(state.error.unwrap().contains("parent directory"));
        assert!(fs.writes().is_empty());
    }

    #[tokio::test]
    async fn recorded_action_completes_without_side_effects() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs.clone(), Arc::new(NoopAlertSink));
        let d = data("msg-0", file("a.txt", "x"));

        runner.record_action(&d);
        runner.wait_idle().await;
        assert!(runner.schedule_action(&d, false).unwrap().is_none());

        let state = runner.snapshot("msg-0").unwrap();
        assert_eq!(state.status, ActionStatus::Complete);
        assert!(state.executed);
        assert!(fs.writes().is_empty());
    }

    #[tokio::test]
    async fn status_updates_are_broadcast() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs, Arc::new(NoopAlertSink));
        let mut updates = runner.subscribe();
        let d = data("msg-0", BoltAction::Shell {
            command: "ls".to_string(),
        });

        runner.add_action(&d);
        runner.run_action(&d, false).await.unwrap();

        assert_eq!(updates.recv().await.unwrap().status, ActionStatus::Running);
        assert_eq!(updates.recv().await.unwrap().status, ActionStatus::Complete);
    }

    #[tokio::test]
    async fn supabase_query_alerts_only() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let (sink, mut rx) = ChannelAlertSink::new();
        let runner = runner_with(fs.clone(), Arc::new(sink));
        let d = data(
            "msg-0",
            BoltAction::Supabase {
                operation: SupabaseOperation::Query,
                file_path: None,
                project_id: None,
                content: "select 1;".to_string(),
            },
        );
        runner.add_action(&d);
        runner.run_action(&d, false).await.unwrap();

        match rx.recv().await {
            Some(Alert::Supabase(alert)) => {
                assert_eq!(alert.title, "Supabase Query");
                assert_eq!(alert.content, "select 1;");
            }
            other => panic!("unexpected alert: {other:?}"),
        }
        assert!(fs.writes().is_empty());
    }

    #[tokio::test]
    async fn supabase_migration_writes_file() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let runner = runner_with(fs.clone(), Arc::new(NoopAlertSink));
        let d = data(
            "msg-0",
            BoltAction::Supabase {
                operation: SupabaseOperation::Migration,
                file_path: Some("supabase/migrations/001_init.sql".to_string()),
                project_id: None,
                content: "create table t();".to_string(),
            },
        );
        runner.add_action(&d);
        runner.run_action(&d, false).await.unwrap();
        assert_eq!(
            fs.get("supabase/migrations/001_init.sql").as_deref(),
            Some("create table t();")
        );
    }

    #[tokio::test]
    async fn contract_validation_failure_raises_contract_alert() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let (sink, mut rx) = ChannelAlertSink::new();
        let runner = runner_with(fs, Arc::new(sink));
        let d = data("msg-0", BoltAction::BuildContract);
        runner.add_action(&d);
        let status = runner.run_action(&d, false).await.unwrap();

        assert_eq!(status, Some(ActionStatus::Failed));
        match rx.recv().await {
            Some(Alert::Action(alert)) => {
                assert_eq!(alert.title, "Contract Validation Failed");
                assert_eq!(alert.source, AlertSource::Contract);
            }
            other => panic!("unexpected alert: {other:?}"),
        }
    }

    #[tokio::test]
    async fn build_emits_deploy_progress() {
        let fs = Arc::new(MemoryFileSystem::new("/w"));
        let (sink, mut rx) = ChannelAlertSink::new();
        let runner = runner_with(fs, Arc::new(sink));
        let d = data("msg-0", BoltAction::Build);
        runner.add_action(&d);
        runner.run_action(&d, false).await.unwrap();

        let Some(Alert::Deploy(first)) = rx.recv().await else {
            panic!("expected deploy alert");
        };
        assert_eq!(first.build_status, StageStatus::Running);
        let Some(Alert::Deploy(second)) = rx.recv().await else {
            panic!("expected deploy alert");
        };
        assert_eq!(second.build_status, StageStatus::Complete);
    }
}
