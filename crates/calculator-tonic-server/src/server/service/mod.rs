//! gRPC service implementation.
//!
//! This module contains the client-facing `CalculatorService` implementation.
//! Unary calls are answered inline; streaming calls are handed to the
//! [`streaming`](crate::server::streaming) sessions and tracked by the
//! [`SessionRegistry`](crate::server::session::registry::SessionRegistry).
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`Calculator`).

pub mod handler;
