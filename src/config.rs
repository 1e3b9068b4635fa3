//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Worker process launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Executable that hosts the worker (e.g. `node`, `python`).
    pub command: String,
    /// Arguments passed to the worker executable.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Timeout values for the shutdown escalation ladder and restart settling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Wait after the graceful exit envelope before escalating to SIGTERM.
    #[serde(default = "default_graceful_exit_seconds")]
    pub graceful_exit_seconds: u64,
    /// Wait after SIGTERM before escalating to SIGKILL.
    #[serde(default = "default_terminate_seconds")]
    pub terminate_seconds: u64,
    /// Settle delay between `stop` and `start` during a restart, letting the
    /// OS release the prior process's resources.
    #[serde(default = "default_restart_settle_ms")]
    pub restart_settle_ms: u64,
    /// Bound on a single stdin write during `send`. A worker that stops
    /// draining its stdin pipe must not block lifecycle operations forever.
    #[serde(default = "default_send_write_seconds")]
    pub send_write_seconds: u64,
}

fn default_graceful_exit_seconds() -> u64 {
    2
}

fn default_terminate_seconds() -> u64 {
    1
}

fn default_restart_settle_ms() -> u64 {
    1000
}

fn default_send_write_seconds() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            graceful_exit_seconds: default_graceful_exit_seconds(),
            terminate_seconds: default_terminate_seconds(),
            restart_settle_ms: default_restart_settle_ms(),
            send_write_seconds: default_send_write_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Graceful-exit wait as a [`Duration`].
    #[must_use]
    pub fn graceful_exit(&self) -> Duration {
        Duration::from_secs(self.graceful_exit_seconds)
    }

    /// Post-SIGTERM wait as a [`Duration`].
    #[must_use]
    pub fn terminate(&self) -> Duration {
        Duration::from_secs(self.terminate_seconds)
    }

    /// Restart settle delay as a [`Duration`].
    #[must_use]
    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    /// Stdin write bound as a [`Duration`].
    #[must_use]
    pub fn send_write(&self) -> Duration {
        Duration::from_secs(self.send_write_seconds)
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Worker launch settings.
    pub worker: WorkerConfig,
    /// Working directory for the spawned worker; the worker resolves its own
    /// configuration (e.g. a `.env` file) relative to this root.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Shutdown and restart timing.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration directly, bypassing TOML. Used by embedding
    /// services and tests that construct the supervisor in code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if validation fails.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        workspace_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self {
            worker: WorkerConfig {
                command: command.into(),
                args,
            },
            workspace_root: workspace_root.into(),
            timeouts: TimeoutConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.command.trim().is_empty() {
            return Err(AppError::Config("worker.command must not be empty".into()));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}
