// ABOUTME: Tag scanner for the artifact/action stream markup.
// ABOUTME: Finds the next open/close/plain-text boundary or reports that more input is needed.

use crate::action::BoltAction;
use std::collections::HashMap;
use std::ops::Range;

pub const ARTIFACT_TAG_OPEN: &str = "<boltArtifact";
pub const ARTIFACT_TAG_CLOSE: &str = "</boltArtifact>";
pub const ACTION_TAG_OPEN: &str = "<boltAction";
pub const ACTION_TAG_CLOSE: &str = "</boltAction>";
pub const CDATA_OPEN: &str = "<![CDATA[";
pub const CDATA_CLOSE: &str = "]]>";

pub type Attributes = HashMap<String, String>;

/// Where the scanner currently sits in the artifact > action nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanContext {
    Idle,
    InArtifact,
    InAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    OpenArtifact {
        id: String,
        title: String,
        self_closing: bool,
    },
    OpenAction {
        action: BoltAction,
        self_closing: bool,
    },
    /// Closing action tag; `payload` is the body between the open tag and this close.
    CloseAction {
        payload: Range<usize>,
    },
    CloseArtifact,
    PlainText(Range<usize>),
    /// No complete boundary yet; the offset must not advance.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub token: Token,
    /// Offset to resume from after consuming `token`.
    pub end: usize,
}

impl Scan {
    fn incomplete(offset: usize) -> Self {
        Self {
            token: Token::Incomplete,
            end: offset,
        }
    }

    fn plain(start: usize, end: usize) -> Self {
        Self {
            token: Token::PlainText(start..end),
            end,
        }
    }
}

/// Scan `input` from `offset` for the next boundary valid in `context`.
///
/// Inside an action, `offset` must be the start of the action body; the body
/// is opaque except that `<![CDATA[ ... ]]>` sections are skipped when looking
/// for the close tag.
pub fn scan(input: &str, offset: usize, context: ScanContext) -> Scan {
    if offset >= input.len() {
        return Scan::incomplete(offset);
    }
    match context {
        ScanContext::Idle => scan_idle(input, offset),
        ScanContext::InArtifact => scan_artifact_body(input, offset),
        ScanContext::InAction => scan_action_body(input, offset),
    }
}

fn scan_idle(input: &str, offset: usize) -> Scan {
    let rest = &input[offset..];
    match rest.find('<') {
        None => Scan::plain(offset, input.len()),
        Some(0) => match match_open_tag(input, offset, ARTIFACT_TAG_OPEN) {
            TagMatch::Partial => Scan::incomplete(offset),
            TagMatch::NoMatch => Scan::plain(offset, next_tag_start(input, offset + 1)),
            TagMatch::Complete {
                end,
                attrs,
                self_closing,
            } => {
                let id = attrs.get("id").map(|id| id.trim()).unwrap_or_default();
                if id.is_empty() {
                    tracing::warn!("Artifact tag without id, treating as text");
                    return Scan::plain(offset, end);
                }
                let title = attrs.get("title").cloned().unwrap_or_else(|| {
                    tracing::debug!(artifact_id = %id, "Artifact title missing");
                    String::new()
                });
                Scan {
                    token: Token::OpenArtifact {
                        id: id.to_string(),
                        title,
                        self_closing,
                    },
                    end,
                }
            }
        },
        Some(p) => Scan::plain(offset, offset + p),
    }
}

fn scan_artifact_body(input: &str, offset: usize) -> Scan {
    let rest = &input[offset..];
    match rest.find('<') {
        None => Scan::plain(offset, input.len()),
        Some(0) => {
            if rest.starts_with(ARTIFACT_TAG_CLOSE) {
                return Scan {
                    token: Token::CloseArtifact,
                    end: offset + ARTIFACT_TAG_CLOSE.len(),
                };
            }
            if rest.starts_with(ACTION_TAG_CLOSE) {
                tracing::debug!("Stray action close tag inside artifact");
                return Scan::plain(offset, offset + ACTION_TAG_CLOSE.len());
            }
            match match_open_tag(input, offset, ACTION_TAG_OPEN) {
                TagMatch::Partial => Scan::incomplete(offset),
                TagMatch::Complete {
                    end,
                    attrs,
                    self_closing,
                } => match BoltAction::from_attributes(&attrs) {
                    Some(action) => Scan {
                        token: Token::OpenAction {
                            action,
                            self_closing,
                        },
                        end,
                    },
                    None => Scan::plain(offset, end),
                },
                TagMatch::NoMatch => {
                    if is_partial_prefix(rest, ARTIFACT_TAG_CLOSE)
                        || is_partial_prefix(rest, ACTION_TAG_CLOSE)
                    {
                        Scan::incomplete(offset)
                    } else {
                        Scan::plain(offset, next_tag_start(input, offset + 1))
                    }
                }
            }
        }
        Some(p) => Scan::plain(offset, offset + p),
    }
}

fn scan_action_body(input: &str, offset: usize) -> Scan {
    match find_action_close(input, offset) {
        Some(close) => Scan {
            token: Token::CloseAction {
                payload: offset..close,
            },
            end: close + ACTION_TAG_CLOSE.len(),
        },
        None => Scan::incomplete(offset),
    }
}

/// Index of the action close tag at or after `offset`, skipping CDATA sections.
fn find_action_close(input: &str, offset: usize) -> Option<usize> {
    let mut cursor = offset;
    loop {
        let rest = &input[cursor..];
        let close = rest.find(ACTION_TAG_CLOSE);
        let cdata = rest.find(CDATA_OPEN);
        match (close, cdata) {
            (Some(close), Some(cdata)) if close < cdata => return Some(cursor + close),
            (Some(close), None) => return Some(cursor + close),
            (_, Some(cdata)) => {
                let body_start = cursor + cdata + CDATA_OPEN.len();
                let cdata_end = input[body_start..].find(CDATA_CLOSE)?;
                cursor = body_start + cdata_end + CDATA_CLOSE.len();
            }
            (None, None) => return None,
        }
    }
}

/// Body text of an unfinished action available for streaming previews.
///
/// Excludes a trailing fragment that could be the start of the close tag.
pub fn pending_payload(input: &str, offset: usize) -> &str {
    if offset >= input.len() {
        return "";
    }
    let payload = &input[offset..];
    for len in (1..ACTION_TAG_CLOSE.len()).rev() {
        if payload.ends_with(&ACTION_TAG_CLOSE[..len]) {
            return &payload[..payload.len() - len];
        }
    }
    payload
}

enum TagMatch {
    NoMatch,
    Partial,
    Complete {
        end: usize,
        attrs: Attributes,
        self_closing: bool,
    },
}

fn match_open_tag(input: &str, offset: usize, name: &str) -> TagMatch {
    let rest = &input[offset..];
    if !rest.starts_with(name) {
        return if is_partial_prefix(rest, name) {
            TagMatch::Partial
        } else {
            TagMatch::NoMatch
        };
    }

    let after_name = offset + name.len();
    match input[after_name..].chars().next() {
        None => return TagMatch::Partial,
        Some(c) if c.is_whitespace() || c == '>' || c == '/' => {}
        Some(_) => return TagMatch::NoMatch,
    }

    let Some(gt) = find_tag_end(input, after_name) else {
        return TagMatch::Partial;
    };
    let inner = input[after_name..gt].trim_end();
    let self_closing = inner.ends_with('/');
    let attrs = parse_attributes(inner.strip_suffix('/').unwrap_or(inner));
    TagMatch::Complete {
        end: gt + 1,
        attrs,
        self_closing,
    }
}

/// `text` is a strict prefix of `token`, so more input could complete it.
fn is_partial_prefix(text: &str, token: &str) -> bool {
    text.len() < token.len() && token.starts_with(text)
}

fn next_tag_start(input: &str, from: usize) -> usize {
    input[from..]
        .find('<')
        .map(|p| from + p)
        .unwrap_or(input.len())
}

/// Position of the `>` ending a tag, ignoring any inside quoted attribute values.
fn find_tag_end(input: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut last_significant = ' ';
    for (i, c) in input[from..].char_indices() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                last_significant = c;
            }
            Some(_) => {}
            None => {
                if (c == '"' || c == '\'') && last_significant == '=' {
                    quote = Some(c);
                } else if c == '>' {
                    return Some(from + i);
                }
                if !c.is_whitespace() {
                    last_significant = c;
                }
            }
        }
    }
    None
}

/// Lenient attribute parser: any order, `"`/`'`/unquoted values, bare names.
/// The first occurrence of a repeated name wins. Never fails.
pub fn parse_attributes(source: &str) -> Attributes {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut attrs = Attributes::new();
    let mut i = 0;

    let is_delim = |b: u8| b.is_ascii_whitespace() || matches!(b, b'=' | b'"' | b'\'' | b'>' | b'/');

    while i < len {
        while i < len && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= len {
            break;
        }

        let name_start = i;
        while i < len && !is_delim(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            i += 1;
            continue;
        }
        let name = &source[name_start..i];

        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < len && bytes[i] == b'=' {
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                let value_start = i + 1;
                let value_end = source[value_start..]
                    .bytes()
                    .position(|b| b == quote)
                    .map(|p| value_start + p)
                    .unwrap_or(len);
                value = decode_entities(&source[value_start..value_end]);
                i = (value_end + 1).min(len);
            } else {
                let value_start = i;
                while i < len && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = decode_entities(&source[value_start..i]);
            }
        }

        attrs.entry(name.to_string()).or_insert(value);
    }

    attrs
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
