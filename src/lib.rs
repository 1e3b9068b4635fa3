#![forbid(unsafe_code)]

//! `agent-conduit` — process supervisor with real-time output fan-out.
//!
//! Owns the lifecycle of one long-running worker process, exchanges NDJSON
//! envelopes with it over stdio, and relays worker output to any number of
//! concurrently connected subscribers while forwarding their commands back
//! to the worker.

pub mod config;
pub mod errors;
pub mod hub;
pub mod protocol;
pub mod relay;
pub mod supervisor;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
