//! Stream reader tasks for the worker's stdout and stderr pipes.
//!
//! One task per pipe, launched by [`Supervisor::start`](super::Supervisor::start)
//! and running for the lifetime of the worker process. Each task drives a
//! [`FramedRead`] over its pipe, decodes lines into envelopes, and pushes
//! them into the hub. The reader is a strictly one-directional consumer; it
//! never holds the supervisor's operation lock while waiting for data, so
//! `stop` and `send` proceed concurrently.
//!
//! Decoding policy: a stdout line that parses as a JSON object with a `type`
//! field is forwarded with its declared kind; anything else becomes an
//! `agent_message` fallback envelope. Every stderr line becomes an
//! `agent_error` envelope. No worker output is silently dropped for being
//! malformed.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::hub::Hub;
use crate::protocol::{Envelope, LineCodec};
use crate::supervisor::{handle_stream_closed, Inner};
use crate::AppError;

/// Which worker pipe a reader consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// The worker's standard output: structured envelopes with a plain-text
    /// fallback.
    Stdout,
    /// The worker's standard error: always wrapped verbatim.
    Stderr,
}

impl StreamSource {
    /// Log-friendly stream name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    /// Decode one line from this stream into an envelope.
    #[must_use]
    pub fn decode(self, line: &str) -> Envelope {
        match self {
            Self::Stdout => Envelope::from_worker_line(line)
                .unwrap_or_else(|| Envelope::agent_message(line)),
            Self::Stderr => Envelope::agent_error(line),
        }
    }
}

/// Launch a reader task over one worker pipe.
pub(crate) fn spawn_reader<R>(
    source: StreamSource,
    pipe: R,
    hub: Hub,
    inner: Arc<Mutex<Inner>>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(run_reader(source, pipe, hub, inner, cancel))
}

/// Reader loop: decode lines until EOF, error, or cancellation.
async fn run_reader<R>(
    source: StreamSource,
    pipe: R,
    hub: Hub,
    inner: Arc<Mutex<Inner>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(pipe, LineCodec::new());
    let stream = source.as_str();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(stream, "reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        // EOF is the normal wind-down signal, not a failure.
                        debug!(stream, "reader: end of stream");
                        handle_stream_closed(&inner, &hub, source).await;
                        break;
                    }

                    Some(Err(AppError::Protocol(ref msg))) => {
                        // Oversized line; skip it and keep reading.
                        warn!(stream, error = msg.as_str(), "reader: framing error, skipping line");
                    }

                    Some(Err(err)) => {
                        warn!(stream, %err, "reader: read failed, stopping");
                        hub.broadcast(&Envelope::error(format!("{stream} read failed: {err}")));
                        handle_stream_closed(&inner, &hub, source).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        hub.broadcast(&source.decode(&line));
                    }
                }
            }
        }
    }
}
