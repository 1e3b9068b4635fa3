//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// A lifecycle operation requires the worker to be stopped first.
    AlreadyRunning,
    /// A lifecycle operation requires a running worker.
    NotRunning,
    /// The worker process could not be spawned.
    Spawn(String),
    /// The worker process was found dead before an operation could proceed.
    ProcessDied(String),
    /// The worker process crashed mid-operation (broken pipe, write failure).
    ProcessCrashed(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Line-protocol framing or encoding failure.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "already running: worker is already active"),
            Self::NotRunning => write!(f, "not running: no active worker"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::ProcessDied(msg) => write!(f, "process died: {msg}"),
            Self::ProcessCrashed(msg) => write!(f, "process crashed: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
