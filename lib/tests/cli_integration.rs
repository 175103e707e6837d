//! Whole-tree black-box coverage of [`keelson::cli::Cli`] for scenarios `cli.rs`'s own
//! `#[cfg(test)]` module doesn't reach: a custom [`OutputWriter`] observing banner-once/suppressed
//! behavior, an executable extension dispatched end to end through [`Cli::exec`], and
//! filesystem-declared commands (§4.7's JSON-manifest reinterpretation).

use keelson::cli::{Cli, CliOutcome, CliParams, OutputWriter};
use keelson::commands::{ActionFn, ActionInput, ActionResult};
use keelson::options::BoxFuture;
use keelson::Error;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingWriter {
    lines: Mutex<Vec<String>>,
}

impl OutputWriter for CapturingWriter {
    fn write(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

#[tokio::test]
async fn banner_is_written_exactly_once_to_whichever_stream_flushes_first() {
    let stdout = Arc::new(CapturingWriter::default());
    let stderr = Arc::new(CapturingWriter::default());

    let cli = Cli::new(
        CliParams::new()
            .name("bannertest")
            .banner("hello banner")
            .stdout(stdout.clone() as Arc<dyn OutputWriter>)
            .stderr(stderr.clone() as Arc<dyn OutputWriter>),
    )
    .await
    .unwrap();

    let outcome = cli.exec(Some(vec![])).await.unwrap();
    assert!(matches!(outcome, CliOutcome::Parsed(_)));

    let stdout_text = stdout.lines.lock().unwrap().join("");
    let stderr_text = stderr.lines.lock().unwrap().join("");
    let banner_seen_on_stdout = stdout_text.contains("hello banner");
    let banner_seen_on_stderr = stderr_text.contains("hello banner");

    assert!(banner_seen_on_stdout ^ banner_seen_on_stderr, "banner must land on exactly one stream");
}

#[tokio::test]
async fn no_banner_flag_suppresses_it_entirely() {
    let stdout = Arc::new(CapturingWriter::default());

    let cli = Cli::new(
        CliParams::new()
            .name("bannertest")
            .banner("hello banner")
            .stdout(stdout.clone() as Arc<dyn OutputWriter>),
    )
    .await
    .unwrap();

    cli.exec(Some(vec!["--no-banner".to_string()])).await.unwrap();

    let stdout_text = stdout.lines.lock().unwrap().join("");
    assert!(!stdout_text.contains("hello banner"));
}

#[tokio::test]
async fn executable_extension_dispatches_through_cli_exec() {
    if which::which("true").is_err() {
        return;
    }

    let cli = Cli::new(CliParams::new().name("exttest").extension("true", Some("passthrough")))
        .await
        .unwrap();

    let outcome = cli.exec(Some(vec!["passthrough".to_string()])).await.unwrap();
    match outcome {
        CliOutcome::Action(ActionResult::Exit(code)) => assert_eq!(code, 0),
        other => panic!("expected an Exit action result, got {:?}", other),
    }
}

#[tokio::test]
async fn filesystem_declared_command_is_registered_and_dispatches_its_action() {
    let dir = std::env::temp_dir().join(format!("keelson-cli-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let manifest_path = dir.join("ship.json");
    std::fs::write(&manifest_path, r#"{"desc": "sends the ship out", "aliases": ["launch"]}"#).unwrap();

    let cli = Cli::new(CliParams::new().name("fstest")).await.unwrap();

    let mut actions: HashMap<String, ActionFn> = HashMap::new();
    let action: ActionFn = Arc::new(|_input: ActionInput| {
        Box::pin(async move { Ok(ActionResult::Value(serde_json::json!({"shipped": true}))) })
            as BoxFuture<'static, Result<ActionResult, Error>>
    });
    actions.insert("ship".to_string(), action);

    cli.load_filesystem_commands(&dir, &actions).unwrap();

    let outcome = cli.exec(Some(vec!["launch".to_string()])).await.unwrap();
    match outcome {
        CliOutcome::Action(ActionResult::Value(v)) => {
            assert_eq!(v, serde_json::json!({"shipped": true}));
        }
        other => panic!("expected a Value action result, got {:?}", other),
    }

    let _ = std::fs::remove_dir_all(&dir as &PathBuf);
}
