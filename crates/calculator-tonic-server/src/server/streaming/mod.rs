//! Per-call streaming logic.
//!
//! - [`channel`] - typed inbound/outbound conduit over a gRPC call.
//! - [`average`] - client-streaming `ComputeAverage` session.
//! - [`maximum`] - bidirectional `FindMaximum` session.
//! - [`primes`] - server-streaming `PrimeNumberDecomposition` feeder.

pub mod average;
pub mod channel;
pub mod maximum;
pub mod primes;
