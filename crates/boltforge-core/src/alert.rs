// ABOUTME: Alerts the runner raises for the UI layer (terminal, deploy, data service).
// ABOUTME: AlertSink is fire-and-forget; ChannelAlertSink forwards into an mpsc channel.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    Terminal,
    Contract,
}

/// Failure (or notice) from a shell, start, or contract action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAlert {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub source: AlertSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStage {
    Building,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Progress of build actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployAlert {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub stage: DeployStage,
    pub build_status: StageStatus,
    pub deploy_status: StageStatus,
}

/// Notice for data-service actions that the user has to confirm or run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupabaseAlert {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub title: String,
    pub description: String,
    pub content: String,
}

/// Receives alerts from the runner. Implementations must not block.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, _alert: ActionAlert) {}
    fn on_deploy_alert(&self, _alert: DeployAlert) {}
    fn on_supabase_alert(&self, _alert: SupabaseAlert) {}
}

/// Discards every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {}

/// Any alert, for consumers that want a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "alert", rename_all = "camelCase")]
pub enum Alert {
    Action(ActionAlert),
    Deploy(DeployAlert),
    Supabase(SupabaseAlert),
}

/// Forwards alerts into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Same as [`ChannelAlertSink::new`] but hands back a `Stream`.
    pub fn with_stream() -> (Self, UnboundedReceiverStream<Alert>) {
        let (sink, rx) = Self::new();
        (sink, UnboundedReceiverStream::new(rx))
    }

    fn send(&self, alert: Alert) {
        if self.tx.send(alert).is_err() {
            tracing::debug!("Alert receiver dropped, discarding alert");
        }
    }
}

impl AlertSink for ChannelAlertSink {
    fn on_alert(&self, alert: ActionAlert) {
        self.send(Alert::Action(alert));
    }

    fn on_deploy_alert(&self, alert: DeployAlert) {
        self.send(Alert::Deploy(alert));
    }

    fn on_supabase_alert(&self, alert: SupabaseAlert) {
        self.send(Alert::Supabase(alert));
    }
}
