//! Collaborator-facing operation replies.
//!
//! The HTTP/CLI layer that fronts the supervisor serializes these directly;
//! each reply mirrors the wire shape `{"status": …, …}` with a snake_case
//! status discriminator. Built from the core operations' `Result`s via
//! `From` conversions so callers keep `?`-style error handling internally.

use chrono::Utc;
use serde::Serialize;

use crate::supervisor::{StopOutcome, SupervisorState};
use crate::{AppError, Result};

/// Reply for `start()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartReply {
    /// Worker spawned; readers launched.
    Started {
        /// OS process identifier of the worker.
        pid: u32,
        /// Human-readable confirmation.
        message: String,
    },
    /// A worker is already active; no side effect.
    AlreadyRunning {
        /// Human-readable explanation.
        message: String,
    },
    /// Spawn failed; the supervisor remains stopped.
    Error {
        /// Failure detail.
        message: String,
    },
}

impl From<Result<u32>> for StartReply {
    fn from(result: Result<u32>) -> Self {
        match result {
            Ok(pid) => Self::Started {
                pid,
                message: "worker started successfully".into(),
            },
            Err(AppError::AlreadyRunning) => Self::AlreadyRunning {
                message: "worker is already running".into(),
            },
            Err(err) => Self::Error {
                message: err.to_string(),
            },
        }
    }
}

/// Reply for `stop()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopReply {
    /// The worker is confirmed gone.
    Stopped {
        /// Human-readable confirmation.
        message: String,
    },
    /// Nothing was running; no process operation was performed.
    NotRunning {
        /// Human-readable explanation.
        message: String,
    },
    /// Unexpected failure during shutdown.
    Error {
        /// Failure detail.
        message: String,
    },
}

impl From<Result<StopOutcome>> for StopReply {
    fn from(result: Result<StopOutcome>) -> Self {
        match result {
            Ok(StopOutcome::Stopped) => Self::Stopped {
                message: "worker stopped successfully".into(),
            },
            Ok(StopOutcome::NotRunning) => Self::NotRunning {
                message: "worker is not running".into(),
            },
            Err(err) => Self::Error {
                message: err.to_string(),
            },
        }
    }
}

/// Reply for `send()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendReply {
    /// Message written to worker stdin and flushed.
    Sent {
        /// Human-readable confirmation.
        message: String,
        /// Time the write completed (ISO-8601).
        timestamp: String,
    },
    /// The message could not be delivered.
    Error {
        /// Failure detail.
        message: String,
        /// Time the failure was observed (ISO-8601).
        timestamp: String,
    },
}

impl From<Result<()>> for SendReply {
    fn from(result: Result<()>) -> Self {
        let timestamp = Utc::now().to_rfc3339();
        match result {
            Ok(()) => Self::Sent {
                message: "message sent to worker".into(),
                timestamp,
            },
            Err(err) => Self::Error {
                message: err.to_string(),
                timestamp,
            },
        }
    }
}

/// Reply for `status()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReply {
    /// Current lifecycle state.
    pub state: SupervisorState,
    /// Worker pid, when a process handle exists.
    pub pid: Option<u32>,
    /// Number of currently registered subscribers.
    pub connected_subscribers: usize,
}
