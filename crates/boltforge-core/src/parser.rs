// ABOUTME: Incremental per-message parser for the artifact/action markup.
// ABOUTME: Turns cumulative stream text into lifecycle callbacks and the visible chat text.

use crate::action::{ActionCallbackData, ArtifactCallbackData, BoltAction};
use crate::scanner::{self, ScanContext, Token, CDATA_CLOSE, CDATA_OPEN};
use serde::Serialize;
use std::collections::HashMap;

/// Receives parser lifecycle events. Every method defaults to a no-op.
pub trait ParserCallbacks {
    fn on_artifact_open(&mut self, _data: &ArtifactCallbackData) {}
    fn on_artifact_close(&mut self, _data: &ArtifactCallbackData) {}
    fn on_action_open(&mut self, _data: &ActionCallbackData) {}
    fn on_action_stream(&mut self, _data: &ActionCallbackData) {}
    fn on_action_close(&mut self, _data: &ActionCallbackData) {}
}

/// Owned record of a callback, for collecting events instead of reacting inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ParserEvent {
    ArtifactOpen(ArtifactCallbackData),
    ArtifactClose(ArtifactCallbackData),
    ActionOpen(ActionCallbackData),
    ActionStream(ActionCallbackData),
    ActionClose(ActionCallbackData),
}

impl ParserEvent {
    pub fn is_stream(&self) -> bool {
        matches!(self, ParserEvent::ActionStream(_))
    }
}

impl ParserCallbacks for Vec<ParserEvent> {
    fn on_artifact_open(&mut self, data: &ArtifactCallbackData) {
        self.push(ParserEvent::ArtifactOpen(data.clone()));
    }

    fn on_artifact_close(&mut self, data: &ArtifactCallbackData) {
        self.push(ParserEvent::ArtifactClose(data.clone()));
    }

    fn on_action_open(&mut self, data: &ActionCallbackData) {
        self.push(ParserEvent::ActionOpen(data.clone()));
    }

    fn on_action_stream(&mut self, data: &ActionCallbackData) {
        self.push(ParserEvent::ActionStream(data.clone()));
    }

    fn on_action_close(&mut self, data: &ActionCallbackData) {
        self.push(ParserEvent::ActionClose(data.clone()));
    }
}

/// Result of one `parse` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    /// Visible text produced by this call (raw tags stripped, artifacts replaced by placeholders).
    pub rendered: String,
    /// An artifact that was open before or during this call closed during it.
    pub artifact_closed: bool,
}

/// Renders the placeholder that stands in for an artifact in the visible text.
pub type ArtifactElement = Box<dyn Fn(&str) -> String + Send + Sync>;

pub fn default_artifact_element(message_id: &str) -> String {
    format!(r#"<div class="__boltArtifact__" data-message-id="{message_id}"></div>"#)
}

struct PendingAction {
    data: ActionCallbackData,
    /// Length of the partial payload last surfaced through `on_action_stream`.
    streamed_len: usize,
}

struct MessageState {
    position: usize,
    context: ScanContext,
    artifact: Option<ArtifactCallbackData>,
    action: Option<PendingAction>,
    action_count: usize,
}

impl MessageState {
    fn new() -> Self {
        Self {
            position: 0,
            context: ScanContext::Idle,
            artifact: None,
            action: None,
            action_count: 0,
        }
    }
}

/// Per-message state machine over the tag scanner.
///
/// Callers pass the cumulative text for a message on every call; offsets are
/// remembered per message id so callbacks never fire twice.
pub struct StreamingMessageParser {
    messages: HashMap<String, MessageState>,
    artifact_element: ArtifactElement,
}

impl Default for StreamingMessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamingMessageParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingMessageParser")
            .field("messages", &self.messages.len())
            .finish()
    }
}

impl StreamingMessageParser {
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            artifact_element: Box::new(default_artifact_element),
        }
    }

    pub fn with_artifact_element(artifact_element: ArtifactElement) -> Self {
        Self {
            messages: HashMap::new(),
            artifact_element,
        }
    }

    /// Offset of the last confirmed boundary for `message_id`.
    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.get(message_id).map(|state| state.position)
    }

    /// Drop all per-message state. Not safe while a stream is in progress.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn parse<C: ParserCallbacks + ?Sized>(
        &mut self,
        message_id: &str,
        input: &str,
        suppress_side_effects: bool,
        callbacks: &mut C,
    ) -> ParseOutput {
        let state = self
            .messages
            .entry(message_id.to_string())
            .or_insert_with(MessageState::new);
        let mut output = ParseOutput::default();

        if input.len() < state.position || !input.is_char_boundary(state.position) {
            tracing::warn!(
                message_id = %message_id,
                position = state.position,
                len = input.len(),
                "Stream text shrank or was rewritten, ignoring chunk"
            );
            return output;
        }

        loop {
            let scan = scanner::scan(input, state.position, state.context);
            match scan.token {
                Token::Incomplete => {
                    if let Some(pending) = state.action.as_mut() {
                        stream_partial(pending, input, state.position, callbacks);
                    }
                    break;
                }
                Token::PlainText(range) => {
                    if state.context == ScanContext::Idle {
                        output.rendered.push_str(&input[range]);
                    }
                }
                Token::OpenArtifact {
                    id,
                    title,
                    self_closing,
                } => {
                    let artifact = ArtifactCallbackData {
                        message_id: message_id.to_string(),
                        id,
                        title,
                        suppress_side_effects,
                    };
                    callbacks.on_artifact_open(&artifact);
                    output.rendered.push_str(&(self.artifact_element)(message_id));
                    if self_closing {
                        callbacks.on_artifact_close(&artifact);
                        output.artifact_closed = true;
                    } else {
                        state.artifact = Some(artifact);
                        state.context = ScanContext::InArtifact;
                    }
                }
                Token::OpenAction {
                    action,
                    self_closing,
                } => {
                    let artifact_id = state
                        .artifact
                        .as_ref()
                        .map(|artifact| artifact.id.clone())
                        .unwrap_or_default();
                    let data = ActionCallbackData {
                        artifact_id,
                        message_id: message_id.to_string(),
                        action_id: format!("{message_id}-{}", state.action_count),
                        action,
                        suppress_side_effects,
                    };
                    state.action_count += 1;
                    callbacks.on_action_open(&data);

                    if self_closing {
                        let mut data = data;
                        data.action = finalize_action(data.action, "");
                        callbacks.on_action_close(&data);
                    } else {
                        state.action = Some(PendingAction {
                            data,
                            streamed_len: 0,
                        });
                        state.context = ScanContext::InAction;
                    }
                }
                Token::CloseAction { payload } => {
                    if let Some(pending) = state.action.take() {
                        let mut data = pending.data;
                        data.action = finalize_action(data.action, &input[payload]);
                        callbacks.on_action_close(&data);
                    }
                    state.context = ScanContext::InArtifact;
                }
                Token::CloseArtifact => {
                    if let Some(artifact) = state.artifact.take() {
                        callbacks.on_artifact_close(&artifact);
                    }
                    output.artifact_closed = true;
                    state.context = ScanContext::Idle;
                }
            }
            state.position = scan.end;
        }

        output
    }
}

fn stream_partial<C: ParserCallbacks + ?Sized>(
    pending: &mut PendingAction,
    input: &str,
    body_start: usize,
    callbacks: &mut C,
) {
    if !pending.data.action.action_type().is_streamable() {
        return;
    }
    let partial = scanner::pending_payload(input, body_start);
    if partial.len() <= pending.streamed_len {
        return;
    }
    pending.streamed_len = partial.len();

    let mut data = pending.data.clone();
    data.action = match data.action {
        BoltAction::File {
            file_path, binary, ..
        } => BoltAction::File {
            content: clean_file_content(partial, &file_path, binary, false),
            file_path,
            binary,
        },
        BoltAction::Update {
            file_path,
            occurrences,
            ..
        } => {
            let (old, new) = extract_update_pair(partial);
            BoltAction::Update {
                file_path,
                old,
                new,
                occurrences,
            }
        }
        other => other,
    };
    callbacks.on_action_stream(&data);
}

/// Fill in an action's content from its closed payload.
fn finalize_action(action: BoltAction, payload: &str) -> BoltAction {
    match action {
        BoltAction::Shell { command } => BoltAction::Shell {
            command: command_or_body(command, payload),
        },
        BoltAction::Start { command } => BoltAction::Start {
            command: command_or_body(command, payload),
        },
        BoltAction::File {
            file_path, binary, ..
        } => BoltAction::File {
            content: clean_file_content(payload, &file_path, binary, true),
            file_path,
            binary,
        },
        BoltAction::Update {
            file_path,
            occurrences,
            ..
        } => {
            let (old, new) = extract_update_pair(payload);
            if old.is_empty() {
                tracing::warn!(path = %file_path, "Update action has no old content, it will not be applied");
            }
            BoltAction::Update {
                file_path,
                old,
                new,
                occurrences,
            }
        }
        BoltAction::Supabase {
            operation,
            file_path,
            project_id,
            ..
        } => BoltAction::Supabase {
            operation,
            file_path,
            project_id,
            content: payload.trim().to_string(),
        },
        other @ (BoltAction::Build | BoltAction::BuildContract) => other,
    }
}

fn command_or_body(command: String, payload: &str) -> String {
    if command.trim().is_empty() {
        payload.trim().to_string()
    } else {
        command
    }
}

fn clean_file_content(raw: &str, file_path: &str, binary: bool, finished: bool) -> String {
    let trimmed = raw.trim();
    if binary {
        return trimmed.to_string();
    }
    let mut content = if file_path.ends_with(".md") {
        trimmed.to_string()
    } else {
        strip_markdown_fence(trimmed)
            .replace("&lt;", "<")
            .replace("&gt;", ">")
    };
    if finished {
        content.push('\n');
    }
    content
}

/// Unwrap content the model wrapped in a single fenced code block.
fn strip_markdown_fence(content: &str) -> &str {
    let Some(after_open) = content.strip_prefix("```") else {
        return content;
    };
    let Some(newline) = after_open.find('\n') else {
        return content;
    };
    let lang = &after_open[..newline];
    if !lang
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '+')
    {
        return content;
    }
    let body = &after_open[newline + 1..];
    let Some(before_close) = body.trim_end().strip_suffix("```") else {
        return content;
    };
    let Some(last_newline) = before_close.rfind('\n') else {
        return content;
    };
    if !before_close[last_newline..].trim().is_empty() {
        return content;
    }
    &before_close[..last_newline]
}

/// Pull the `<old>` and `<new>` sections out of an update payload.
/// Missing sections come back empty.
pub fn extract_update_pair(payload: &str) -> (String, String) {
    let (old, after_old) = extract_section(payload, 0, "old").unwrap_or_default();
    let new = extract_section(payload, after_old, "new")
        .map(|(new, _)| new)
        .unwrap_or_default();
    (old, new)
}

/// Returns the section body and the offset just past its close tag.
fn extract_section(payload: &str, from: usize, tag: &str) -> Option<(String, usize)> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let body_start = from + payload[from..].find(&open)? + open.len();
    let rest = &payload[body_start..];

    let leading_ws = rest.len() - rest.trim_start().len();
    if let Some(cdata) = rest.trim_start().strip_prefix(CDATA_OPEN) {
        let cdata_start = body_start + leading_ws + CDATA_OPEN.len();
        let cdata_len = cdata.find(CDATA_CLOSE)?;
        let after_cdata = cdata_start + cdata_len + CDATA_CLOSE.len();
        let section_end = payload[after_cdata..]
            .find(&close)
            .map(|p| after_cdata + p + close.len())
            .unwrap_or(after_cdata);
        return Some((cdata[..cdata_len].to_string(), section_end));
    }

    let body_len = rest.find(&close)?;
    let body = rest[..body_len].trim_matches(|c| c == '\n' || c == '\r');
    Some((body.to_string(), body_start + body_len + close.len()))
}
