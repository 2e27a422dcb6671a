//! Shared protocol, error and arithmetic definitions used by the calculator
//! server and client.
//!
//! ## Submodules
//!
//! - [`proto`] - Generated Protobuf messages, client and server bindings.
//! - [`error`] - Unified service error type and its gRPC status mapping.
//! - [`arithmetic`] - Unary operations and the lazy prime factor iterator.
//! - [`accumulator`] - Per-call running state for the streaming operations.

pub mod accumulator;
pub mod arithmetic;
pub mod error;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from
/// `proto/calculator.proto`.
///
/// ## Service
///
/// - `CalculatorService` with one RPC per interaction pattern: `Sum` and
///   `SquareRoot` (unary), `PrimeNumberDecomposition` (server streaming),
///   `ComputeAverage` (client streaming) and `FindMaximum` (bidirectional
///   streaming).
///
/// Every streaming message carries exactly one scalar; there is no batching.
pub mod proto {
    tonic::include_proto!("calculator");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("calculator_descriptor");
}
