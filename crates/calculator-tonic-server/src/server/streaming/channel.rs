//! Typed two-way conduit for one streaming call.
//!
//! A [`StreamChannel`] pairs an [`Inbound`] side (what the client sends) with
//! an [`Outbound`] side (what the server sends back). The two directions close
//! independently: the client half-closes the inbound side when it has no more
//! input, and the server closes the outbound side by dropping its
//! [`Outbound`] handle.
//!
//! Receiving has three distinct outcomes, never conflated:
//!
//! - `Ok(Received::Message(_))` - the next message arrived
//! - `Ok(Received::EndOfStream)` - the client finished sending
//! - `Err(Error::StreamReceive { .. })` - the transport failed

use calculator_tonic_core::{Error, Result};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

/// Successful outcome of [`Inbound::recv`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received<T> {
    Message(T),
    EndOfStream,
}

/// Receiving half of a streaming call.
pub trait Inbound: Send {
    type Item: Send;

    /// Waits for the next inbound message.
    ///
    /// After `EndOfStream` or an error has been returned, callers must not
    /// receive again.
    fn recv(&mut self) -> impl Future<Output = Result<Received<Self::Item>>> + Send;
}

/// Any stream of `Result<T, Status>` is an inbound side. This covers
/// [`tonic::Streaming`] as well as in-memory streams.
impl<S, T> Inbound for S
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin + Send,
    T: Send,
{
    type Item = T;

    async fn recv(&mut self) -> Result<Received<T>> {
        match self.next().await {
            Some(Ok(message)) => Ok(Received::Message(message)),
            Some(Err(status)) => Err(Error::StreamReceive {
                context: format!("{}: {}", status.code(), status.message()),
            }),
            None => Ok(Received::EndOfStream),
        }
    }
}

/// The gRPC response body produced by an [`Outbound`] side.
pub type ResponseStream<T> = ReceiverStream<core::result::Result<T, Status>>;

/// Sending half of a streaming call.
///
/// Backed by a bounded channel whose receiving end is handed to tonic as the
/// response stream. The outbound direction ends once every clone of the
/// handle is dropped.
pub struct Outbound<T> {
    tx: mpsc::Sender<core::result::Result<T, Status>>,
}

impl<T> Clone for Outbound<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> Outbound<T> {
    /// Creates an outbound side and the response stream it feeds.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is 0.
    pub fn channel(buffer: usize) -> (Self, ResponseStream<T>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Sends one message, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] once the response stream is gone,
    /// typically because the client disconnected or cancelled the call.
    pub async fn send(&self, message: T) -> Result<()> {
        self.tx
            .send(Ok(message))
            .await
            .map_err(|_| Error::ChannelError {
                context: "response stream closed by peer".to_string(),
            })
    }

    /// Blocking variant of [`send`](Self::send) for use off the async
    /// runtime, e.g. inside `spawn_blocking`.
    pub fn blocking_send(&self, message: T) -> Result<()> {
        self.tx
            .blocking_send(Ok(message))
            .map_err(|_| Error::ChannelError {
                context: "response stream closed by peer".to_string(),
            })
    }

    /// Terminates the response stream with `err`.
    ///
    /// Best effort: the client may already be gone, in which case the error is
    /// only logged.
    pub async fn fail(self, err: Error) {
        if let Err(_e) = self.tx.send(Err(err.into())).await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to forward err: {}", _e);
        }
    }

    /// Like [`fail`](Self::fail), but gives up at once if the buffer is full
    /// instead of waiting for the client to read.
    pub fn try_fail(self, err: Error) {
        if let Err(_e) = self.tx.try_send(Err(err.into())) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Dropped final status: {}", _e);
        }
    }

    /// Returns `true` once the response stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Both directions of one streaming call.
pub struct StreamChannel<I, O> {
    pub inbound: I,
    pub outbound: Outbound<O>,
}

impl<I, O> StreamChannel<I, O>
where
    I: Inbound,
    O: Send,
{
    /// Wraps `inbound` and opens a fresh outbound side with room for `buffer`
    /// queued responses. The returned stream is the gRPC response body.
    pub fn open(inbound: I, buffer: usize) -> (Self, ResponseStream<O>) {
        let (outbound, responses) = Outbound::channel(buffer);
        (Self { inbound, outbound }, responses)
    }

    pub fn into_parts(self) -> (I, Outbound<O>) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[tokio::test]
    async fn inbound_distinguishes_end_of_stream_from_failure() {
        let mut clean = tokio_stream::iter(vec![Ok::<_, Status>(7)]);
        assert_eq!(clean.recv().await, Ok(Received::Message(7)));
        assert_eq!(clean.recv().await, Ok(Received::EndOfStream));

        let mut broken = tokio_stream::iter(vec![
            Ok(1),
            Err(Status::unavailable("connection reset")),
        ]);
        assert_eq!(broken.recv().await, Ok(Received::Message(1)));
        assert!(matches!(
            broken.recv().await,
            Err(Error::StreamReceive { context }) if context.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn outbound_delivers_in_order_and_closes_on_drop() {
        let inbound = tokio_stream::empty::<core::result::Result<(), Status>>();
        let (channel, mut responses) = StreamChannel::<_, i32>::open(inbound, 4);
        let (_inbound, outbound) = channel.into_parts();

        outbound.send(1).await.unwrap();
        outbound.send(2).await.unwrap();
        drop(outbound);

        assert_eq!(responses.next().await.map(|r| r.unwrap()), Some(1));
        assert_eq!(responses.next().await.map(|r| r.unwrap()), Some(2));
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn outbound_send_fails_once_peer_is_gone() {
        let (outbound, responses) = Outbound::<i32>::channel(1);
        drop(responses);

        assert!(outbound.is_closed());
        assert!(matches!(
            outbound.send(1).await,
            Err(Error::ChannelError { .. })
        ));
    }

    #[tokio::test]
    async fn outbound_fail_surfaces_status() {
        let (outbound, mut responses) = Outbound::<i32>::channel(1);
        outbound.fail(Error::EmptyStream).await;

        let status = responses.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn outbound_try_fail_does_not_wait_for_a_full_buffer() {
        let (outbound, mut responses) = Outbound::<i32>::channel(1);
        outbound.send(1).await.unwrap();
        outbound.try_fail(Error::ServiceShutdown);

        assert_eq!(responses.next().await.map(|r| r.unwrap()), Some(1));
        assert!(responses.next().await.is_none());
    }
}
