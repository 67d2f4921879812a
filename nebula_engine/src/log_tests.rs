/// Unit tests for the logging system.

use std::sync::{Arc, Mutex};

use serial_test::serial;

use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
use crate::Engine;

/// Logger that captures entries for inspection
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[test]
fn test_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
#[serial]
fn test_custom_logger_receives_entries() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(Arc::new(CaptureLogger {
        entries: Arc::clone(&entries),
    }));

    crate::engine_info!("nebula::test", "hello {}", 7);

    let captured = entries.lock().unwrap();
    let entry = captured
        .iter()
        .find(|e| e.message == "hello 7")
        .expect("entry not captured");
    assert_eq!(entry.severity, LogSeverity::Info);
    assert_eq!(entry.source, "nebula::test");
    assert!(entry.file.is_none());
    assert!(entry.line.is_none());

    drop(captured);
    Engine::set_logger(Arc::new(DefaultLogger));
}

#[test]
#[serial]
fn test_error_macro_carries_file_and_line() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(Arc::new(CaptureLogger {
        entries: Arc::clone(&entries),
    }));

    crate::engine_error!("nebula::test", "broken");

    let captured = entries.lock().unwrap();
    let entry = captured
        .iter()
        .find(|e| e.message == "broken")
        .expect("entry not captured");
    assert_eq!(entry.severity, LogSeverity::Error);
    assert!(entry.file.is_some());
    assert!(entry.line.is_some());

    drop(captured);
    Engine::set_logger(Arc::new(DefaultLogger));
}

#[test]
fn test_default_logger_does_not_panic() {
    DefaultLogger.log(&LogEntry {
        severity: LogSeverity::Debug,
        timestamp: std::time::SystemTime::now(),
        source: "nebula::test".to_string(),
        message: "plain entry".to_string(),
        file: None,
        line: None,
    });
}
