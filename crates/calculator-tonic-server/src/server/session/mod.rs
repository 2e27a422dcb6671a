//! Call-scoped session management.
//!
//! - [`registry`] - spawns and tracks streaming sessions, drives graceful
//!   shutdown.

pub mod registry;
