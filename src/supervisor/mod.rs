//! Process supervisor: owns the worker's lifecycle and stdio.
//!
//! Exactly one worker process is managed at a time. The supervisor holds the
//! [`ProcessHandle`] and the state machine behind a single async mutex, so
//! lifecycle operations (`start`, `stop`, `restart`, `send`) are mutually
//! exclusive: a `start` racing an in-flight `stop` waits for it rather than
//! racing the transition.
//!
//! State machine:
//!
//! ```text
//! Stopped ─start→ Starting ─spawn ok→ Running ─stop→ Stopping ─→ Stopped
//!                                        │
//!                                        └─unexpected exit→ Crashed ─start→ Starting
//! ```
//!
//! Shutdown escalates: graceful `{"type":"exit"}` request → SIGTERM →
//! SIGKILL, each step bounded by a timeout so `stop()` can never hang. Only
//! the final kill is unconditional.

pub mod reader;
pub mod reply;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::hub::Hub;
use crate::protocol::{Envelope, WorkerCommand};
use crate::supervisor::reader::StreamSource;
use crate::{AppError, Result};

/// Grace period for reaping the child after a reader observes end-of-stream.
/// Pipes close a moment before the exit status becomes collectable.
const REAP_GRACE: Duration = Duration::from_millis(200);

// ── State machine ────────────────────────────────────────────────────────────

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// No worker process exists.
    Stopped,
    /// `start()` is spawning the worker.
    Starting,
    /// Worker is live; `send` is accepted.
    Running,
    /// `stop()` is walking the escalation ladder.
    Stopping,
    /// Worker exited while it was expected to be `Running`. Only `start()`
    /// leaves this state.
    Crashed,
}

/// Result of a completed [`Supervisor::stop`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A worker was (or had already crashed and is now confirmed) stopped.
    Stopped,
    /// There was nothing to stop; no process operation was performed.
    NotRunning,
}

// ── Process handle ───────────────────────────────────────────────────────────

/// Exclusive handle to the spawned worker.
///
/// stdout and stderr are taken by the reader tasks at spawn time; the handle
/// keeps the [`Child`] for liveness checks and termination, and the stdin
/// half for outbound commands.
struct ProcessHandle {
    child: Child,
    stdin: ChildStdin,
    pid: u32,
}

/// Mutable supervisor state guarded by the operation mutex.
pub(crate) struct Inner {
    state: SupervisorState,
    handle: Option<ProcessHandle>,
    cancel: Option<CancellationToken>,
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Supervises one worker process and relays its output through a [`Hub`].
///
/// Explicitly constructed and dependency-injected: the embedding service
/// owns the instance, and tests substitute worker commands and subscriber
/// sinks freely.
pub struct Supervisor {
    inner: Arc<Mutex<Inner>>,
    hub: Hub,
    config: AgentConfig,
}

impl Supervisor {
    /// Create a supervisor in the `Stopped` state.
    #[must_use]
    pub fn new(config: AgentConfig, hub: Hub) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SupervisorState::Stopped,
                handle: None,
                cancel: None,
            })),
            hub,
            config,
        }
    }

    /// The hub this supervisor broadcasts through.
    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SupervisorState {
        self.inner.lock().await.state
    }

    /// Spawn the worker process and launch its stream readers.
    ///
    /// The worker starts in `workspace_root` so it can resolve its own
    /// configuration relative to a known root. Returns the worker's pid.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] unless the state is `Stopped` or
    ///   `Crashed`.
    /// - [`AppError::Spawn`] when the OS cannot create the process or its
    ///   stdio pipes; the state remains `Stopped`.
    pub async fn start(&self) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await
    }

    async fn start_locked(&self, inner: &mut Inner) -> Result<u32> {
        match inner.state {
            SupervisorState::Stopped | SupervisorState::Crashed => {}
            _ => return Err(AppError::AlreadyRunning),
        }
        inner.state = SupervisorState::Starting;

        let mut cmd = Command::new(&self.config.worker.command);
        cmd.args(&self.config.worker.args)
            .current_dir(&self.config.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                inner.state = SupervisorState::Stopped;
                return Err(AppError::Spawn(format!("failed to spawn worker: {err}")));
            }
        };

        let Some(pid) = child.id() else {
            inner.state = SupervisorState::Stopped;
            return Err(AppError::Spawn("worker exited during spawn".into()));
        };

        let (stdin, stdout, stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
                _ => {
                    child.kill().await.ok();
                    inner.state = SupervisorState::Stopped;
                    return Err(AppError::Spawn("failed to capture worker stdio".into()));
                }
            };

        let cancel = CancellationToken::new();
        reader::spawn_reader(
            StreamSource::Stdout,
            stdout,
            self.hub.clone(),
            Arc::clone(&self.inner),
            cancel.clone(),
        );
        reader::spawn_reader(
            StreamSource::Stderr,
            stderr,
            self.hub.clone(),
            Arc::clone(&self.inner),
            cancel.clone(),
        );

        inner.handle = Some(ProcessHandle { child, stdin, pid });
        inner.cancel = Some(cancel);
        inner.state = SupervisorState::Running;

        info!(pid, command = %self.config.worker.command, "worker started");
        Ok(pid)
    }

    /// Stop the worker, escalating until it is gone.
    ///
    /// Ladder: best-effort graceful exit request and a bounded wait for
    /// natural exit, then SIGTERM with a second bounded wait, then SIGKILL
    /// with an unconditional wait. Every step is best-effort; the final
    /// state is always `Stopped` and an `agent_stopped` envelope is
    /// broadcast on completion.
    ///
    /// # Errors
    ///
    /// Infallible in practice; the `Result` carries [`StopOutcome::NotRunning`]
    /// through `Ok` when there was nothing to stop.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut inner = self.inner.lock().await;
        Ok(self.stop_locked(&mut inner).await)
    }

    async fn stop_locked(&self, inner: &mut Inner) -> StopOutcome {
        if inner.state == SupervisorState::Stopped {
            return StopOutcome::NotRunning;
        }
        inner.state = SupervisorState::Stopping;

        if let Some(handle) = inner.handle.take() {
            shutdown_child(handle, &self.config).await;
        }

        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.state = SupervisorState::Stopped;

        self.hub.broadcast(&Envelope::agent_stopped());
        info!("worker stopped");
        StopOutcome::Stopped
    }

    /// `stop` then `start`, with a settle delay in between so the OS can
    /// release the prior process's resources.
    ///
    /// The operation mutex is held across the whole composition, so a
    /// concurrent `start()` cannot slip into the settle window and steal
    /// the slot from the restarting caller.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::start`] errors; the stop half never fails.
    pub async fn restart(&self) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
        tokio::time::sleep(self.config.timeouts.restart_settle()).await;
        self.start_locked(&mut inner).await
    }

    /// Encode `text` as a `message` command and write it to worker stdin.
    ///
    /// Liveness is checked immediately before the write; a worker that died
    /// since the last operation is detected here rather than surfacing as a
    /// broken pipe.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotRunning`] when no worker is running.
    /// - [`AppError::ProcessDied`] when the liveness check finds the worker
    ///   already gone (state moves to `Crashed`).
    /// - [`AppError::ProcessCrashed`] when the write or flush fails or
    ///   stalls past the configured write bound (state moves to `Crashed`).
    pub async fn send(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SupervisorState::Running => {}
            SupervisorState::Crashed => {
                return Err(AppError::ProcessDied(
                    "worker crashed and is no longer running".into(),
                ));
            }
            _ => return Err(AppError::NotRunning),
        }
        let Some(handle) = inner.handle.as_mut() else {
            return Err(AppError::NotRunning);
        };

        // Process may have exited since the last operation.
        match handle.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let detail = format!("worker crashed: exited unexpectedly ({status})");
                self.mark_crashed(&mut inner, &detail);
                return Err(AppError::ProcessDied(detail));
            }
            Err(err) => {
                let detail = format!("worker crashed: liveness check failed: {err}");
                self.mark_crashed(&mut inner, &detail);
                return Err(AppError::ProcessDied(detail));
            }
        }

        let line = serde_json::to_string(&WorkerCommand::Message {
            content: text.to_owned(),
        })
        .map_err(|err| AppError::Protocol(format!("failed to encode message: {err}")))?;
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        // The write is bounded: a worker that stops draining stdin would
        // otherwise block this task while it holds the operation mutex,
        // and `stop()` could never reach the escalation ladder.
        let write_result = timeout(self.config.timeouts.send_write(), async {
            handle.stdin.write_all(&bytes).await?;
            handle.stdin.flush().await
        })
        .await;

        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let detail = format!("worker crashed: write to stdin failed: {err}");
                self.mark_crashed(&mut inner, &detail);
                return Err(AppError::ProcessCrashed(detail));
            }
            Err(_elapsed) => {
                let detail = format!(
                    "worker crashed: stdin write stalled for {}s, worker not draining its pipe",
                    self.config.timeouts.send_write_seconds
                );
                self.mark_crashed(&mut inner, &detail);
                return Err(AppError::ProcessCrashed(detail));
            }
        }

        debug!(bytes = bytes.len(), "message written to worker stdin");
        Ok(())
    }

    /// Snapshot of the supervisor for status reporting.
    pub async fn status(&self) -> reply::StatusReply {
        let inner = self.inner.lock().await;
        reply::StatusReply {
            state: inner.state,
            pid: inner.handle.as_ref().map(|h| h.pid),
            connected_subscribers: self.hub.subscriber_count(),
        }
    }

    /// Transition to `Crashed`, drop the handle, wind down the readers, and
    /// broadcast an `error` envelope. Caller holds the operation lock.
    fn mark_crashed(&self, inner: &mut Inner, detail: &str) {
        warn!(detail, "worker crash detected");
        inner.state = SupervisorState::Crashed;
        inner.handle = None;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        self.hub.broadcast(&Envelope::error(detail));
    }
}

// ── Shutdown ladder ──────────────────────────────────────────────────────────

/// Walk the escalation ladder for one child. Consumes the handle; the
/// process is confirmed dead when this returns.
async fn shutdown_child(handle: ProcessHandle, config: &AgentConfig) {
    let ProcessHandle {
        mut child,
        mut stdin,
        pid,
    } = handle;

    // Step 1: graceful exit request, tolerating an already-closed pipe, then
    // a bounded wait for natural exit. Dropping stdin closes the pipe, which
    // doubles as an EOF hint for workers that ignore the exit command.
    let graceful = timeout(config.timeouts.graceful_exit(), async {
        if let Ok(line) = serde_json::to_string(&WorkerCommand::Exit) {
            let mut bytes = line.into_bytes();
            bytes.push(b'\n');
            if let Err(err) = stdin.write_all(&bytes).await {
                debug!(pid, %err, "exit request not delivered");
            }
            stdin.flush().await.ok();
        }
        drop(stdin);
        child.wait().await
    })
    .await;

    if graceful.is_ok() {
        debug!(pid, "worker exited after graceful request");
        return;
    }

    // Step 2: terminate signal, second bounded wait.
    send_terminate(pid);
    if timeout(config.timeouts.terminate(), child.wait())
        .await
        .is_ok()
    {
        debug!(pid, "worker exited after terminate signal");
        return;
    }

    // Step 3: unconditional kill. `Child::kill` sends SIGKILL and reaps.
    warn!(pid, "worker ignored terminate signal, killing");
    if let Err(err) = child.kill().await {
        warn!(pid, %err, "kill failed");
    }
    child.wait().await.ok();
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM not delivered");
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) {
    // No TERM equivalent; the ladder falls through to the kill step.
}

// ── Crash detection ──────────────────────────────────────────────────────────

/// Called by a reader task that observed end-of-stream on its pipe.
///
/// A closed pipe while the state is still `Running` is only a crash if the
/// process has actually exited; a worker may legitimately close one stream
/// and keep working. The child is given [`REAP_GRACE`] to become reapable
/// before the pipe closure is dismissed.
pub(crate) async fn handle_stream_closed(
    inner: &Mutex<Inner>,
    hub: &Hub,
    source: StreamSource,
) {
    let mut guard = inner.lock().await;
    if guard.state != SupervisorState::Running {
        return;
    }
    let Some(handle) = guard.handle.as_mut() else {
        return;
    };

    match timeout(REAP_GRACE, handle.child.wait()).await {
        Ok(Ok(status)) => {
            let pid = handle.pid;
            let detail = format!("worker process exited unexpectedly ({status})");
            warn!(pid, stream = source.as_str(), detail = %detail, "worker crashed");
            guard.state = SupervisorState::Crashed;
            guard.handle = None;
            if let Some(cancel) = guard.cancel.take() {
                cancel.cancel();
            }
            drop(guard);
            hub.broadcast(&Envelope::error(detail));
        }
        Ok(Err(err)) => {
            warn!(stream = source.as_str(), %err, "failed to reap worker after stream close");
        }
        Err(_elapsed) => {
            // Still alive; the worker closed this stream on its own.
            debug!(stream = source.as_str(), "stream closed but worker still alive");
        }
    }
}
