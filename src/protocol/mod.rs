//! Line protocol shared with the worker process and with subscribers.
//!
//! The worker speaks newline-delimited JSON (NDJSON) over its stdio: one
//! JSON object per line, `\n`-terminated. The same envelope shape is fanned
//! out to subscribers.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based stream
//!   framing with a per-line size limit.
//! - `envelope`: the [`Envelope`] protocol unit and the outbound
//!   [`WorkerCommand`] shapes.

pub mod codec;
pub mod envelope;

pub use codec::{LineCodec, MAX_LINE_BYTES};
pub use envelope::{Envelope, EnvelopeKind, WorkerCommand};
