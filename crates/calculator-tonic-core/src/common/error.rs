//! Error types for the calculator service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of a calculator call. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate failures to clients with `?` and
//! get the matching status code.
//!
//! ## Error Cases
//! - `InvalidRequest`: The request was malformed (e.g. a negative square root).
//! - `Overflow`: An exact integer result does not fit its type.
//! - `EmptyStream`: An aggregate was requested over zero streamed values.
//! - `StreamReceive`: Reading the next inbound message failed.
//! - `ChannelError`: Writing an outbound message or an internal hand-off
//!   failed, usually because the peer went away.
//! - `ServiceShutdown`: A call arrived or was still running while the service
//!   was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the calculator service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client request was invalid.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Integer arithmetic left the representable range.
    #[error("Arithmetic overflow: {context}")]
    Overflow { context: String },

    /// The client closed its stream before sending any value.
    #[error("No values were streamed before the end of input")]
    EmptyStream,

    /// Failure while receiving the next inbound message.
    #[error("Receive error: {context}")]
    StreamReceive { context: String },

    /// Outbound send or internal channel failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::Overflow { context } => {
                Status::out_of_range(format!("Arithmetic overflow: {context}"))
            }
            Error::EmptyStream => {
                Status::failed_precondition("no numbers were streamed before the end of input")
            }
            Error::StreamReceive { context } => {
                Status::internal(format!("failed to receive next request: {context}"))
            }
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
