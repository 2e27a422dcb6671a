//! Bidirectional `FindMaximum` session.
//!
//! A session runs two loops over one call, polled concurrently:
//!
//! - the **receive loop** owns the [`MaximumTracker`]. It reads candidates
//!   and, when one is a new strict maximum, hands it to the send loop before
//!   awaiting the next candidate. It is the only place that decides whether
//!   something gets emitted.
//! - the **send loop** forwards every hand-off to the outbound side in the
//!   order it was made.
//!
//! The hand-off queue holds a single update, so the receive loop can run at
//! most one notification ahead of the transport.
//!
//! ```text
//! AWAITING_INPUT --(candidate > max)--> EMITTING --(handed off)--> AWAITING_INPUT
//! AWAITING_INPUT --(end of input)--> DRAINING --(queue flushed)--> CLOSED
//! ```
//!
//! End of input closes the hand-off queue; the send loop flushes what is left
//! and the session returns, which drops the outbound side and ends the
//! response stream. A receive or send failure aborts both loops immediately.

use super::channel::{Inbound, Outbound, Received};
use calculator_tonic_core::{
    Error, Result,
    accumulator::MaximumTracker,
    proto::{FindMaximumRequest, FindMaximumResponse},
};
use tokio::sync::mpsc;

/// Counters of a completed `FindMaximum` session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaximumSummary {
    pub received: u64,
    pub emitted: u64,
}

/// Runs one `FindMaximum` session to completion.
///
/// Returns once the client half-closed and every notification was handed to
/// the transport.
///
/// # Errors
///
/// - [`Error::StreamReceive`] if reading a candidate fails.
/// - [`Error::ChannelError`] if a notification cannot be delivered.
///
/// Neither is retried; the client has to start a new call.
pub async fn find_maximum<I>(
    inbound: I,
    outbound: Outbound<FindMaximumResponse>,
    tracker: MaximumTracker,
) -> Result<MaximumSummary>
where
    I: Inbound<Item = FindMaximumRequest>,
{
    let (updates_tx, updates_rx) = mpsc::channel(1);

    let (received, emitted) = tokio::try_join!(
        receive_loop(inbound, tracker, updates_tx),
        send_loop(updates_rx, &outbound),
    )?;

    Ok(MaximumSummary { received, emitted })
}

async fn receive_loop<I>(
    mut inbound: I,
    mut tracker: MaximumTracker,
    updates: mpsc::Sender<i32>,
) -> Result<u64>
where
    I: Inbound<Item = FindMaximumRequest>,
{
    let mut received = 0;

    while let Received::Message(request) = inbound.recv().await? {
        received += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!("client sent {}", request.number);

        if let Some(maximum) = tracker.observe(request.number) {
            updates
                .send(maximum)
                .await
                .map_err(|_| Error::ChannelError {
                    context: format!("failed to hand off new maximum {maximum}"),
                })?;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Input closed after {received} candidates, draining (max = {})",
        tracker.current()
    );

    // Dropping `updates` here lets the send loop finish.
    Ok(received)
}

async fn send_loop(
    mut updates: mpsc::Receiver<i32>,
    outbound: &Outbound<FindMaximumResponse>,
) -> Result<u64> {
    let mut emitted = 0;

    while let Some(maximum) = updates.recv().await {
        outbound.send(FindMaximumResponse { maximum }).await?;
        emitted += 1;
    }

    Ok(emitted)
}
