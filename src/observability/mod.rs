//! # Observability Infrastructure
//!
//! Structured logging for the data source broker. Every component logs
//! through `tracing` with structured fields; this module installs the
//! subscriber and provides the per-call [`broker_span!`](crate::broker_span)
//! macro.

pub mod logging;

pub use logging::{build_filter, init_tracing, log_config_info};
