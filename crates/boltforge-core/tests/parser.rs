// ABOUTME: Integration tests for incremental parsing of artifact/action markup.
// ABOUTME: Covers chunking independence, malformed tags, incomplete tails, and CDATA payloads.

use boltforge_core::action::BoltAction;
use boltforge_core::parser::{ParserEvent, StreamingMessageParser};

const TRANSCRIPT: &str = concat!(
    "I'll create the project.\n\n",
    r#"<boltArtifact id="todo-app" title="Todo App">"#,
    "\n  ",
    r#"<boltAction type="file" filePath="package.json">{"name": "todo", "scripts": {"dev": "vite"}}</boltAction>"#,
    "\n  ",
    r#"<boltAction type="shell" command="npm install" />"#,
    "\n  ",
    r#"<boltAction type="update" filePath="src/main.ts" occurrences="all">"#,
    "<old><![CDATA[const x = 1;]]></old><new><![CDATA[const x = 2; // </boltAction>]]></new>",
    "</boltAction>\n  ",
    r#"<boltAction type="start">npm run dev</boltAction>"#,
    "\n</boltArtifact>\n\nThe app is running. ",
    r#"<boltArtifact id="docs" title="Docs"><boltAction type="file" filePath="README.md">"#,
    "# Todo\n</boltAction></boltArtifact> Done.",
);

fn parse_in_chunks(text: &str, chunk: usize) -> (Vec<ParserEvent>, String) {
    let mut parser = StreamingMessageParser::new();
    let mut events = Vec::new();
    let mut rendered = String::new();
    let mut end = 0;
    while end < text.len() {
        end = (end + chunk).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        rendered.push_str(&parser.parse("msg", &text[..end], false, &mut events).rendered);
    }
    (events, rendered)
}

fn without_stream_events(events: Vec<ParserEvent>) -> Vec<ParserEvent> {
    events.into_iter().filter(|e| !e.is_stream()).collect()
}

#[test]
fn test_chunking_does_not_change_callbacks() {
    let (whole, whole_rendered) = parse_in_chunks(TRANSCRIPT, TRANSCRIPT.len());
    assert!(whole.iter().all(|e| !e.is_stream()));
    assert_eq!(whole.len(), 14);

    for chunk in [1, 2, 3, 5, 8, 13, 64] {
        let (events, rendered) = parse_in_chunks(TRANSCRIPT, chunk);
        assert_eq!(without_stream_events(events), whole, "chunk size {chunk}");
        assert_eq!(rendered, whole_rendered, "chunk size {chunk}");
    }
}

#[test]
fn test_rendered_text_replaces_artifacts() {
    let (_, rendered) = parse_in_chunks(TRANSCRIPT, 7);
    assert!(rendered.starts_with("I'll create the project.\n\n<div class=\"__boltArtifact__\""));
    assert!(rendered.contains("The app is running. "));
    assert!(rendered.ends_with(" Done."));
    assert!(!rendered.contains("boltAction"));
}

#[test]
fn test_unknown_action_type_is_ignored() {
    let text = concat!(
        r#"<boltArtifact id="a" title="A">"#,
        r#"<boltAction type="unknown" />"#,
        r#"<boltAction type="shell">ls</boltAction>"#,
        "</boltArtifact>",
    );
    let (events, _) = parse_in_chunks(text, 4);

    let actions: Vec<&BoltAction> = events
        .iter()
        .filter_map(|e| match e {
            ParserEvent::ActionClose(data) => Some(&data.action),
            _ => None,
        })
        .collect();
    assert_eq!(
        actions,
        vec![&BoltAction::Shell {
            command: "ls".to_string()
        }]
    );
    assert_eq!(events.len(), 4);
}

#[test]
fn test_incomplete_tail_waits_for_more_input() {
    let head = r#"<boltArtifact id="x"><boltAction type="file" filePath="/a""#;
    let mut parser = StreamingMessageParser::new();
    let mut events = Vec::new();

    parser.parse("m", head, false, &mut events);
    let boundary = parser.position("m").unwrap();
    assert_eq!(boundary, r#"<boltArtifact id="x">"#.len());
    assert!(!events
        .iter()
        .any(|e| matches!(e, ParserEvent::ActionOpen(_) | ParserEvent::ActionClose(_))));

    // Same text again must not advance or re-fire anything.
    let before = events.len();
    parser.parse("m", head, false, &mut events);
    assert_eq!(parser.position("m"), Some(boundary));
    assert_eq!(events.len(), before);

    let full = format!("{head}>hello</boltAction></boltArtifact>");
    parser.parse("m", &full, false, &mut events);
    match &events[before] {
        ParserEvent::ActionOpen(data) => {
            assert_eq!(data.action_id, "m-0");
            assert_eq!(data.action.file_path(), Some("/a"));
        }
        other => panic!("expected action open, got {other:?}"),
    }
    assert!(matches!(events.last(), Some(ParserEvent::ArtifactClose(_))));
}

#[test]
fn test_close_tag_inside_cdata_does_not_end_action() {
    let (events, _) = parse_in_chunks(TRANSCRIPT, 3);
    let update = events
        .iter()
        .find_map(|e| match e {
            ParserEvent::ActionClose(data) => match &data.action {
                BoltAction::Update { old, new, .. } => Some((old.clone(), new.clone())),
                _ => None,
            },
            _ => None,
        })
        .expect("update action closed");
    assert_eq!(update.0, "const x = 1;");
    assert_eq!(update.1, "const x = 2; // </boltAction>");
}

#[test]
fn test_action_ids_follow_document_order() {
    let (events, _) = parse_in_chunks(TRANSCRIPT, TRANSCRIPT.len());
    let ids: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ParserEvent::ActionOpen(data) => Some(data.action_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
}
