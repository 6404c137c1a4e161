// ABOUTME: Action model shared by the parser and the runner.
// ABOUTME: Closed sum type per action kind, status lifecycle, and callback payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Extensions whose content travels base64-encoded.
pub const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "avif", "pdf", "zip", "gz", "tar", "wasm",
    "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "ogg", "webm",
];

/// Returns true when `path` has one of the given extensions (case-insensitive).
pub fn is_binary_path_with<S: AsRef<str>>(path: &str, extensions: &[S]) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    extensions
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(ext))
}

pub fn is_binary_path(path: &str) -> bool {
    is_binary_path_with(path, DEFAULT_BINARY_EXTENSIONS)
}

/// Which matches of `old` an update replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occurrences {
    #[default]
    First,
    All,
    /// 1-based index of the single match to replace.
    Nth(usize),
}

impl Occurrences {
    /// Build the policy from the `occurrences` and `n` tag attributes.
    /// Unknown policies fall back to `First`; `nth` without a usable `n` means the first match.
    pub fn from_attributes(occurrences: Option<&str>, n: Option<&str>) -> Self {
        match occurrences.map(str::trim) {
            Some("all") => Occurrences::All,
            Some("nth") => {
                let n = n.and_then(|n| n.trim().parse::<usize>().ok()).filter(|n| *n > 0);
                match n {
                    Some(n) => Occurrences::Nth(n),
                    None => {
                        tracing::warn!("update action uses occurrences=\"nth\" without a valid n, replacing the first match");
                        Occurrences::Nth(1)
                    }
                }
            }
            None | Some("first") | Some("") => Occurrences::First,
            Some(other) => {
                tracing::warn!(occurrences = %other, "Unknown occurrences policy, replacing the first match");
                Occurrences::First
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupabaseOperation {
    Migration,
    Query,
}

/// Discriminant of [`BoltAction`], as written in the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Shell,
    Start,
    File,
    Update,
    Build,
    BuildContract,
    Supabase,
}

impl ActionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "shell" => Some(ActionType::Shell),
            "start" => Some(ActionType::Start),
            "file" => Some(ActionType::File),
            "update" => Some(ActionType::Update),
            "build" => Some(ActionType::Build),
            "buildContract" => Some(ActionType::BuildContract),
            "supabase" => Some(ActionType::Supabase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Shell => "shell",
            ActionType::Start => "start",
            ActionType::File => "file",
            ActionType::Update => "update",
            ActionType::Build => "build",
            ActionType::BuildContract => "buildContract",
            ActionType::Supabase => "supabase",
        }
    }

    /// Content-bearing actions may be surfaced and executed before their close tag.
    pub fn is_streamable(&self) -> bool {
        matches!(self, ActionType::File | ActionType::Update)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed operation inside an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoltAction {
    Shell {
        command: String,
    },
    Start {
        command: String,
    },
    #[serde(rename_all = "camelCase")]
    File {
        file_path: String,
        content: String,
        binary: bool,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        file_path: String,
        old: String,
        new: String,
        occurrences: Occurrences,
    },
    Build,
    BuildContract,
    #[serde(rename_all = "camelCase")]
    Supabase {
        operation: SupabaseOperation,
        file_path: Option<String>,
        project_id: Option<String>,
        content: String,
    },
}

impl BoltAction {
    /// Build the partially-known action described by an open tag's attributes.
    ///
    /// Returns `None` when `type` is missing or unknown, or when a required
    /// attribute for that type is absent; such tags are treated as plain text.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Option<Self> {
        let raw_type = attrs.get("type")?;
        let Some(action_type) = ActionType::parse(raw_type.trim()) else {
            tracing::warn!(action_type = %raw_type, "Unknown action type, ignoring tag");
            return None;
        };

        let file_path = || {
            attrs
                .get("filePath")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
        };
        let command = attrs.get("command").cloned().unwrap_or_default();

        let action = match action_type {
            ActionType::Shell => BoltAction::Shell { command },
            ActionType::Start => BoltAction::Start { command },
            ActionType::File => {
                let Some(file_path) = file_path() else {
                    tracing::debug!("File action without filePath, ignoring tag");
                    return None;
                };
                let binary = attrs
                    .get("binary")
                    .map(|b| b.trim() == "true")
                    .unwrap_or_else(|| is_binary_path(&file_path));
                BoltAction::File {
                    file_path,
                    content: String::new(),
                    binary,
                }
            }
            ActionType::Update => {
                let Some(file_path) = file_path() else {
                    tracing::debug!("Update action without filePath, ignoring tag");
                    return None;
                };
                BoltAction::Update {
                    file_path,
                    old: String::new(),
                    new: String::new(),
                    occurrences: Occurrences::from_attributes(
                        attrs.get("occurrences").map(String::as_str),
                        attrs.get("n").map(String::as_str),
                    ),
                }
            }
            ActionType::Build => BoltAction::Build,
            ActionType::BuildContract => BoltAction::BuildContract,
            ActionType::Supabase => {
                let operation = match attrs.get("operation").map(|o| o.trim()) {
                    Some("migration") => SupabaseOperation::Migration,
                    Some("query") => SupabaseOperation::Query,
                    other => {
                        tracing::warn!(operation = ?other, "Supabase action without a known operation, ignoring tag");
                        return None;
                    }
                };
                let file_path = file_path();
                if operation == SupabaseOperation::Migration && file_path.is_none() {
                    tracing::warn!("Supabase migration without filePath, ignoring tag");
                    return None;
                }
                BoltAction::Supabase {
                    operation,
                    file_path,
                    project_id: attrs.get("projectId").cloned(),
                    content: String::new(),
                }
            }
        };
        Some(action)
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            BoltAction::Shell { .. } => ActionType::Shell,
            BoltAction::Start { .. } => ActionType::Start,
            BoltAction::File { .. } => ActionType::File,
            BoltAction::Update { .. } => ActionType::Update,
            BoltAction::Build => ActionType::Build,
            BoltAction::BuildContract => ActionType::BuildContract,
            BoltAction::Supabase { .. } => ActionType::Supabase,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            BoltAction::File { file_path, .. } | BoltAction::Update { file_path, .. } => {
                Some(file_path)
            }
            BoltAction::Supabase { file_path, .. } => file_path.as_deref(),
            _ => None,
        }
    }
}

/// Lifecycle of a registered action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Running,
    Complete,
    Aborted,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Aborted | ActionStatus::Failed
        )
    }

    /// Whether moving from `self` to `next` respects the action lifecycle.
    ///
    /// `Pending -> Complete` is only taken by recorded (replayed) actions.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        use ActionStatus::{Aborted, Complete, Failed, Pending, Running};
        match (self, next) {
            (Pending, Running | Aborted | Complete) => true,
            (Running, Running | Complete | Failed | Aborted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Complete => "complete",
            ActionStatus::Aborted => "aborted",
            ActionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Payload of artifact open/close callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCallbackData {
    pub message_id: String,
    pub id: String,
    pub title: String,
    pub suppress_side_effects: bool,
}

/// Payload of action open/stream/close callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCallbackData {
    pub artifact_id: String,
    pub message_id: String,
    pub action_id: String,
    pub action: BoltAction,
    pub suppress_side_effects: bool,
}
