//! Integration tests for the session front end
//!
//! These drive whole lines through `Session::submit` and check what ends up
//! on screen and in history.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bshell::{
    FileHistory, HistoryStore, HostResponse, LocalHost, Session, ShellConfig,
};
use futures::task::LocalSpawnExt;
use futures_timer::Delay;

fn session() -> Session {
    Session::new(ShellConfig::default()).unwrap()
}

#[test]
fn test_output_is_recorded() {
    let session = session();
    let outcome = session.submit("yes hi | head 2 | join -");
    assert_eq!(outcome.lines, vec!["hi-hi"]);
    assert!(outcome.errors.is_empty());
    assert!(!outcome.interrupted);

    let entry = session.history().get(-1).unwrap();
    assert_eq!(entry.command, "yes hi | head 2 | join -");
    assert_eq!(entry.output, vec!["hi-hi"]);
}

#[test]
fn test_previous_output_is_reusable() {
    let session = session();
    session.submit(r"echo a b c | split \s+");
    let outcome = session.submit("_ | len");
    assert_eq!(outcome.lines, vec!["1", "1", "1"]);
    // `_` lines are not recorded
    assert_eq!(session.history().len(), 1);
}

#[test]
fn test_validation_error_recorded() {
    let session = session();
    let outcome = session.submit("echo hi | frob");
    assert_eq!(outcome.errors, vec!["Unknown command: frob"]);
    let entry = session.history().get(-1).unwrap();
    assert_eq!(entry.output, vec!["Error: Unknown command: frob"]);
}

#[test]
fn test_stage_error_reported() {
    let session = session();
    let outcome = session.submit("grep");
    assert!(outcome.lines.is_empty());
    assert_eq!(outcome.errors, vec!["grep: expected 1 argument(s), got 0"]);
}

#[test]
fn test_config_caps_output() {
    let config = ShellConfig::from_toml("[output]\nmax_buffer = 1\n").unwrap();
    let session = Session::new(config).unwrap();
    let outcome = session.submit(r"echo a b c | split \s+");
    assert_eq!(outcome.lines, vec!["c"]);
}

#[test]
fn test_interrupt_running_line() {
    let session = session();
    let interrupter = session.interrupter();
    session
        .spawner()
        .spawn_local(async move {
            Delay::new(Duration::from_millis(50)).await;
            interrupter.interrupt();
        })
        .unwrap();

    let outcome = session.submit("yes 5 | len");
    assert!(outcome.interrupted);
    assert_eq!(outcome.lines.last().map(String::as_str), Some("^C"));
    assert!(outcome.errors.is_empty());
    // the marker is display-only
    let entry = session.history().get(-1).unwrap();
    assert!(!entry.output.iter().any(|l| l == "^C"));
}

#[test]
fn test_key_presses_interrupt_running_line() {
    let session = session();
    let presses = Arc::new(AtomicUsize::new(0));
    session
        .watch_interrupts(Arc::clone(&presses), Duration::from_millis(5))
        .unwrap();

    // stands in for the Ctrl+C handler thread
    let handler = Arc::clone(&presses);
    session
        .spawner()
        .spawn_local(async move {
            Delay::new(Duration::from_millis(50)).await;
            handler.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let outcome = session.submit("yes 5 | len");
    assert!(outcome.interrupted);
    assert_eq!(outcome.lines.last().map(String::as_str), Some("^C"));
    assert_eq!(presses.load(Ordering::SeqCst), 0);

    // the watcher keeps running for later lines without interrupting them
    let outcome = session.submit("echo after");
    assert_eq!(outcome.lines, vec!["after"]);
    assert!(!outcome.interrupted);
}

#[test]
fn test_aliases_and_settings_from_config() {
    let config = ShellConfig::from_toml(
        r#"
        [aliases]
        count = "len"

        [pipe]
        capacity = 2
        "#,
    )
    .unwrap();
    let session = Session::new(config).unwrap();
    assert_eq!(session.submit("count abc").lines, vec!["3"]);
    assert_eq!(session.submit("alias").lines, vec!["alias count=len"]);
    assert_eq!(
        session.submit("set pipe.capacity").lines,
        vec!["pipe.capacity, 2"]
    );
}

#[test]
fn test_clear_history_from_session() {
    let session = session();
    session.submit("echo one");
    session.submit("echo two");
    assert_eq!(session.history().len(), 2);
    let outcome = session.submit("clear history");
    assert!(outcome.errors.is_empty());
    assert!(!outcome.clear_screen);
    assert_eq!(session.history().len(), 0);
}

#[test]
fn test_interrupt_when_idle_is_noop() {
    let session = session();
    session.interrupt();
    let outcome = session.submit("echo ok");
    assert_eq!(outcome.lines, vec!["ok"]);
    assert!(!outcome.interrupted);
}

#[test]
fn test_background_through_host() {
    let host = LocalHost::new();
    host.on("background", "echo", |payload| HostResponse::ok(payload.clone()));
    let session = session().with_host(Rc::new(host));
    let outcome = session.submit("bg background:echo k:v");
    assert_eq!(outcome.lines, vec![r#"{"k":"v"}"#]);
}

#[test]
fn test_file_history_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let mut config = ShellConfig::default();
    config.history.path = Some(path.display().to_string());
    {
        let session = Session::new(config.clone()).unwrap();
        session.submit("echo saved");
        session.submit("help");
    }
    let history = FileHistory::open(&path, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history.get(0).unwrap().output, vec!["saved"]);
}
