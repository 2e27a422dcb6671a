//! Calculator server internals.
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - gRPC service implementation.
//! - [`session`] - per-call session lifecycle and graceful shutdown.
//! - [`streaming`] - streaming call logic over a typed channel abstraction.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod session;
pub mod streaming;
pub mod telemetry;
