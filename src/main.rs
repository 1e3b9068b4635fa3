#![forbid(unsafe_code)]

//! `agent-conduit` — worker supervisor binary.
//!
//! Bootstraps configuration, starts the supervisor, and bridges the local
//! terminal to the worker: stdin lines are relayed as commands, broadcast
//! envelopes are printed as NDJSON. SIGINT/SIGTERM stops the worker through
//! the escalation ladder before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::config::AgentConfig;
use agent_conduit::hub::Hub;
use agent_conduit::relay::CommandRelay;
use agent_conduit::supervisor::Supervisor;
use agent_conduit::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Worker process supervisor with output fan-out", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-conduit bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = AgentConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.workspace_root = canonical;
    }
    info!(workspace = %config.workspace_root.display(), "configuration loaded");

    let hub = Hub::new();
    let supervisor = Arc::new(Supervisor::new(config, hub.clone()));
    let relay = CommandRelay::new(Arc::clone(&supervisor));

    let pid = supervisor.start().await?;
    info!(pid, "worker running");

    // Print every broadcast envelope to our own stdout as NDJSON.
    let mut subscription = hub.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(envelope) = subscription.rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(%err, "failed to serialize envelope"),
            }
        }
    });

    // Relay terminal input to the worker until EOF or shutdown.
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = stdin_lines.next_line() => {
                match line {
                    Ok(Some(text)) if text.trim().is_empty() => {}
                    Ok(Some(text)) => {
                        if let Err(err) = relay.forward(&text).await {
                            error!(%err, "failed to relay input to worker");
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(err) => {
                        error!(%err, "failed to read stdin");
                        break;
                    }
                }
            }
        }
    }

    supervisor.stop().await?;
    printer.abort();
    info!("agent-conduit shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
