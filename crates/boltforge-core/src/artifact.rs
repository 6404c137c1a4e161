// ABOUTME: In-memory record of the artifacts seen in assistant messages.
// ABOUTME: Tracks title, owning message, closed flag and the ordered action ids per artifact.

use crate::action::ArtifactCallbackData;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub id: String,
    pub title: String,
    pub message_id: String,
    pub closed: bool,
    pub action_ids: Vec<String>,
}

/// Artifacts keyed by id, remembering insertion order.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, ArtifactRecord>,
    order: Vec<String>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an opened artifact. Re-opening a known id keeps its actions.
    pub fn open(&mut self, data: &ArtifactCallbackData) {
        if let Some(existing) = self.artifacts.get_mut(&data.id) {
            existing.title = data.title.clone();
            existing.closed = false;
            return;
        }
        self.order.push(data.id.clone());
        self.artifacts.insert(
            data.id.clone(),
            ArtifactRecord {
                id: data.id.clone(),
                title: data.title.clone(),
                message_id: data.message_id.clone(),
                closed: false,
                action_ids: Vec::new(),
            },
        );
    }

    pub fn close(&mut self, artifact_id: &str) {
        match self.artifacts.get_mut(artifact_id) {
            Some(record) => record.closed = true,
            None => tracing::debug!(artifact_id = %artifact_id, "Close for unknown artifact"),
        }
    }

    pub fn push_action(&mut self, artifact_id: &str, action_id: &str) {
        if let Some(record) = self.artifacts.get_mut(artifact_id) {
            if !record.action_ids.iter().any(|id| id == action_id) {
                record.action_ids.push(action_id.to_string());
            }
        }
    }

    pub fn get(&self, artifact_id: &str) -> Option<&ArtifactRecord> {
        self.artifacts.get(artifact_id)
    }

    pub fn for_message(&self, message_id: &str) -> Vec<&ArtifactRecord> {
        self.iter()
            .filter(|record| record.message_id == message_id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactRecord> {
        self.order.iter().filter_map(|id| self.artifacts.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
