//! Unit tests for `AppError` display formats.

use agent_conduit::AppError;

#[test]
fn already_running_display() {
    let s = AppError::AlreadyRunning.to_string();
    assert!(s.starts_with("already running"));
}

#[test]
fn not_running_display() {
    let s = AppError::NotRunning.to_string();
    assert!(s.starts_with("not running"));
}

#[test]
fn spawn_error_includes_detail() {
    let err = AppError::Spawn("No such file or directory".into());
    assert_eq!(err.to_string(), "spawn: No such file or directory");
}

#[test]
fn process_died_is_distinct_from_process_crashed() {
    let died = AppError::ProcessDied("exit status: 1".into());
    let crashed = AppError::ProcessCrashed("broken pipe".into());
    assert!(died.to_string().starts_with("process died:"));
    assert!(crashed.to_string().starts_with("process crashed:"));
    assert_ne!(died.to_string(), crashed.to_string());
}

#[test]
fn messages_have_no_trailing_period() {
    for err in [
        AppError::AlreadyRunning,
        AppError::NotRunning,
        AppError::Spawn("x".into()),
        AppError::Config("x".into()),
        AppError::Protocol("x".into()),
        AppError::Io("x".into()),
    ] {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "must not end with a period: {s}");
    }
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::NotRunning);
    assert!(!err.to_string().is_empty());
}

#[test]
fn io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("pipe closed"));
}
