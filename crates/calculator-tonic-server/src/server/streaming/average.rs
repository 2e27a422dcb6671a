use super::channel::{Inbound, Received};
use calculator_tonic_core::{Result, accumulator::AverageAccumulator, proto::ComputeAverageRequest};

/// Result of a completed `ComputeAverage` session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AverageOutcome {
    pub average: f32,
    pub received: u64,
}

/// Drains `inbound` into a fresh [`AverageAccumulator`] and returns the
/// average once the client signals end of input.
///
/// Exactly one result is produced per call. Nothing is returned before the
/// client half-closes, and any failure discards the partial sum.
///
/// # Errors
///
/// - [`Error::StreamReceive`] if the transport fails mid-stream.
/// - [`Error::Overflow`] if the running sum leaves the `i64` range.
/// - [`Error::EmptyStream`] if the client closed without sending a value.
///
/// [`Error::StreamReceive`]: calculator_tonic_core::Error::StreamReceive
/// [`Error::Overflow`]: calculator_tonic_core::Error::Overflow
/// [`Error::EmptyStream`]: calculator_tonic_core::Error::EmptyStream
pub async fn compute_average<I>(mut inbound: I) -> Result<AverageOutcome>
where
    I: Inbound<Item = ComputeAverageRequest>,
{
    let mut acc = AverageAccumulator::new();

    while let Received::Message(request) = inbound.recv().await? {
        #[cfg(feature = "tracing")]
        tracing::trace!("client sent {}", request.number);
        acc.push(request.number)?;
    }

    let received = acc.count() as u64;
    let average = acc.finish()?;
    Ok(AverageOutcome { average, received })
}
