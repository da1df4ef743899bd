use docbridge::logger::{configure_logging, configure_logging_with_dev};
use docbridge::utils::devlog::{drain, enable_thread_sink, records_for};
use tempfile::tempdir;

#[test]
fn configure_logging_creates_app_log() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("logs");
    configure_logging(Some(&base), Some("debug"), Some(3)).unwrap();
    assert!(base.join("app.log").exists());
}

#[test]
fn dev6_file_is_created_on_request() {
    let dir = tempdir().unwrap();
    configure_logging_with_dev(Some(dir.path()), None, None, true).unwrap();
    assert!(dir.path().join("dev6.log").exists());
}

#[test]
fn dev6_records_reach_thread_sink() {
    let _g = enable_thread_sink();
    docbridge::dev6!({"bench": "query", "op": "ping", "n": 1});
    assert_eq!(records_for("ping")[0]["n"], 1);
    let records = drain();
    assert_eq!(records, vec![serde_json::json!({"bench": "query", "op": "ping", "n": 1})]);
}
