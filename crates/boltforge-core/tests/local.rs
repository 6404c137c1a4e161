// ABOUTME: End-to-end tests against the real filesystem and shell in a temp directory.
// ABOUTME: Streams a message through the workbench with LocalFileSystem and LocalShell.

#![cfg(unix)]

use boltforge_core::action::ActionStatus;
use boltforge_core::alert::{Alert, ChannelAlertSink};
use boltforge_core::build::{BuildCommands, ShellBuildService};
use boltforge_core::fs::LocalFileSystem;
use boltforge_core::runner::{ActionRunner, RunnerConfig};
use boltforge_core::shell::LocalShell;
use boltforge_core::workbench::Workbench;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn workbench(dir: &std::path::Path) -> (Workbench, UnboundedReceiver<Alert>) {
    let fs = Arc::new(LocalFileSystem::new(dir));
    let shell = Arc::new(LocalShell::new(dir));
    let build = Arc::new(ShellBuildService::new(
        shell.clone(),
        fs.clone(),
        BuildCommands {
            build: "mkdir -p dist && cp src/index.html dist/".to_string(),
            ..BuildCommands::default()
        },
    ));
    let (sink, alerts) = ChannelAlertSink::new();
    let runner = ActionRunner::new(fs, shell, build, Arc::new(sink), RunnerConfig::default());
    (Workbench::new(runner), alerts)
}

#[tokio::test]
async fn test_streamed_project_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (mut workbench, mut alerts) = workbench(dir.path());

    let text = concat!(
        r#"<boltArtifact id="site" title="Site">"#,
        r#"<boltAction type="file" filePath="src/index.html">&lt;h1&gt;Hi&lt;/h1&gt;</boltAction>"#,
        r#"<boltAction type="file" filePath="assets/pixel.png">iVBORw==</boltAction>"#,
        r#"<boltAction type="shell">cat src/index.html > copy.html</boltAction>"#,
        r#"<boltAction type="build" />"#,
        "</boltArtifact>",
    );
    for end in (0..=text.len()).step_by(11).chain([text.len()]) {
        workbench.on_chunk("m1", &text[..end], false);
    }
    workbench.wait_idle().await;

    let root = dir.path();
    assert_eq!(
        std::fs::read_to_string(root.join("src/index.html")).unwrap(),
        "<h1>Hi</h1>\n"
    );
    assert_eq!(
        std::fs::read(root.join("assets/pixel.png")).unwrap(),
        vec![0x89, 0x50, 0x4e, 0x47]
    );
    assert_eq!(
        std::fs::read_to_string(root.join("copy.html")).unwrap(),
        "<h1>Hi</h1>\n"
    );
    assert!(root.join("dist/index.html").exists());
    assert!(workbench.all_actions_finished("site"));

    let mut deploy = 0;
    while let Ok(alert) = alerts.try_recv() {
        assert!(matches!(alert, Alert::Deploy(_)), "unexpected {alert:?}");
        deploy += 1;
    }
    assert_eq!(deploy, 2);
}

#[tokio::test]
async fn test_escaping_paths_never_touch_disk() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir(&project).unwrap();
    let (mut workbench, _alerts) = workbench(&project);

    let text = concat!(
        r#"<boltArtifact id="evil" title="Evil">"#,
        r#"<boltAction type="file" filePath="../outside.txt">x</boltAction>"#,
        r#"<boltAction type="file" filePath="/etc/boltforge-test.txt">x</boltAction>"#,
        "</boltArtifact>",
    );
    workbench.on_chunk("m1", text, false);
    workbench.wait_idle().await;

    assert!(!dir.path().join("outside.txt").exists());
    let statuses: Vec<ActionStatus> = workbench
        .runner()
        .actions()
        .iter()
        .map(|a| a.status)
        .collect();
    assert_eq!(statuses, vec![ActionStatus::Failed, ActionStatus::Failed]);
}

#[tokio::test]
async fn test_failing_command_raises_terminal_alert() {
    let dir = tempfile::tempdir().unwrap();
    let (mut workbench, mut alerts) = workbench(dir.path());

    let text = concat!(
        r#"<boltArtifact id="a" title="A">"#,
        r#"<boltAction type="shell">echo broken >&2; exit 2</boltAction>"#,
        "</boltArtifact>",
    );
    workbench.on_chunk("m1", text, false);
    workbench.wait_idle().await;

    match alerts.recv().await {
        Some(Alert::Action(alert)) => {
            assert_eq!(alert.title, "Failed To Execute Shell Command");
            assert!(alert.content.unwrap().contains("broken"));
        }
        other => panic!("unexpected alert: {other:?}"),
    }
}
