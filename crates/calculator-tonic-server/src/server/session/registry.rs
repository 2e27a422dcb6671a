//! Lifecycle tracking for streaming calls.
//!
//! Every streaming call runs as an isolated session: its state lives inside
//! the session's future and is dropped with it. The [`SessionRegistry`] never
//! sees that state. It only tracks which sessions are alive so the server can
//! refuse new ones, drain the running ones and cancel stragglers on shutdown.

use crate::server::{
    streaming::channel::Outbound,
    telemetry::{decrement_streams_inflight, increment_streams_inflight},
};
use calculator_tonic_core::{Error, Result};
use core::time::Duration;
use tokio::time::timeout;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Tracks in-flight streaming sessions and coordinates graceful shutdown.
pub struct SessionRegistry {
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Number of sessions currently running.
    pub fn inflight(&self) -> usize {
        self.tracker.len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Token that fires when shutdown cancels the remaining sessions.
    ///
    /// Hand it to work that runs outside a session's future, such as a
    /// blocking task, so it stops along with the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Runs a session inline on the calling task, e.g. a client-streaming call
    /// whose single response is the handler's return value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if shutdown has started, or if the
    /// session is still running when the drain period runs out. Otherwise
    /// returns whatever the session returns.
    pub async fn run<T, F>(&self, session: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        let token = &self.shutdown_token;
        self.tracker
            .track_future(async move {
                increment_streams_inflight();
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(Error::ServiceShutdown),
                    result = session => result,
                };
                decrement_streams_inflight();
                result
            })
            .await
    }

    /// Spawns a session whose responses flow through `outbound`.
    ///
    /// If the session fails, or is cancelled by shutdown, the error is sent on
    /// `outbound` as the final status of the response stream. Once shutdown
    /// cancels sessions, that status is dropped rather than waiting on a
    /// client that stopped reading. The response stream ends once the session
    /// and `outbound` are both dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] without spawning anything if
    /// shutdown has started.
    pub fn spawn<O, F>(&self, outbound: Outbound<O>, session: F) -> Result<()>
    where
        O: Send + 'static,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        let token = self.shutdown_token.clone();
        self.tracker.spawn(async move {
            increment_streams_inflight();
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::ServiceShutdown),
                result = session => result,
            };
            decrement_streams_inflight();

            let Err(err) = result else {
                return;
            };
            #[cfg(feature = "tracing")]
            tracing::warn!("Session ended with error: {}", err);

            if token.is_cancelled() {
                outbound.try_fail(err);
                return;
            }
            tokio::select! {
                biased;
                () = outbound.fail(err) => {}
                () = token.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Gave up delivering final status on shutdown");
                }
            }
        });

        Ok(())
    }

    /// Gracefully shuts down all sessions.
    ///
    /// - Refuses new sessions.
    /// - Waits up to `shutdown_timeout` for running sessions to finish.
    /// - Cancels the rest, which then end with `UNAVAILABLE`, and waits up to
    ///   `shutdown_timeout` again for them to unwind.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new sessions ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new sessions");
        self.tracker.close();

        // === Phase 1: Wait for in-flight sessions to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight sessions ({} active)", self.inflight());
        match timeout(self.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight sessions drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} sessions still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining sessions ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining sessions via shutdown token");
        self.shutdown_token.cancel();

        if timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("{} sessions did not unwind after cancellation", self.inflight());
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Session registry shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::oneshot;
    use tonic::Code;

    #[tokio::test]
    async fn run_returns_session_result() {
        let registry = SessionRegistry::new(Duration::from_secs(1));
        assert_eq!(registry.run(async { Ok(7) }).await, Ok(7));
        assert_eq!(
            registry.run(async { Err::<(), _>(Error::EmptyStream) }).await,
            Err(Error::EmptyStream)
        );
        assert_eq!(registry.inflight(), 0);
    }

    #[tokio::test]
    async fn spawned_failure_is_surfaced_on_the_stream() {
        let registry = SessionRegistry::new(Duration::from_secs(1));
        let (outbound, mut responses) = Outbound::<i32>::channel(2);

        let session_outbound = outbound.clone();
        registry
            .spawn(outbound, async move {
                session_outbound.send(1).await?;
                Err::<(), _>(Error::StreamReceive {
                    context: "reset".into(),
                })
            })
            .unwrap();

        assert_eq!(responses.next().await.unwrap().unwrap(), 1);
        let status = responses.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_refuses_new_sessions() {
        let registry = SessionRegistry::new(Duration::from_millis(10));
        registry.shutdown().await;

        assert!(registry.is_shutting_down());
        assert_eq!(
            registry.run(async { Ok(()) }).await,
            Err(Error::ServiceShutdown)
        );
        let (outbound, _responses) = Outbound::<i32>::channel(1);
        assert_eq!(
            registry.spawn(outbound, async { Ok(()) }),
            Err(Error::ServiceShutdown)
        );
    }

    #[tokio::test]
    async fn shutdown_waits_for_sessions_that_finish_in_time() {
        let registry = SessionRegistry::new(Duration::from_secs(5));
        let (outbound, mut responses) = Outbound::<i32>::channel(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let session_outbound = outbound.clone();
        registry
            .spawn(outbound, async move {
                let _ = release_rx.await;
                session_outbound.send(42).await
            })
            .unwrap();
        assert_eq!(registry.inflight(), 1);

        let shutdown = registry.shutdown();
        let release = async {
            tokio::task::yield_now().await;
            release_tx.send(()).unwrap();
        };
        tokio::join!(shutdown, release);

        assert_eq!(responses.next().await.unwrap().unwrap(), 42);
        assert!(responses.next().await.is_none());
        assert_eq!(registry.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_does_not_wait_on_a_client_that_stopped_reading() {
        let drain = Duration::from_millis(100);
        let registry = SessionRegistry::new(drain);
        let (outbound, mut responses) = Outbound::<i32>::channel(1);

        let session_outbound = outbound.clone();
        registry
            .spawn(outbound, async move {
                // Fill the buffer, then hang without the client ever reading.
                session_outbound.send(1).await?;
                futures::future::pending::<Result<()>>().await
            })
            .unwrap();
        tokio::task::yield_now().await;

        let start = tokio::time::Instant::now();
        registry.shutdown().await;

        assert!(start.elapsed() < drain * 2);
        assert_eq!(registry.inflight(), 0);
        assert_eq!(responses.next().await.unwrap().unwrap(), 1);
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn child_token_follows_shutdown() {
        let registry = SessionRegistry::new(Duration::from_millis(10));
        let token = registry.cancellation_token();
        assert!(!token.is_cancelled());

        registry.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_cancels_stuck_sessions_with_unavailable() {
        let registry = SessionRegistry::new(Duration::from_millis(20));
        let (outbound, mut responses) = Outbound::<i32>::channel(1);

        registry
            .spawn(outbound, futures::future::pending::<Result<()>>())
            .unwrap();
        registry.shutdown().await;

        let status = responses.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(registry.inflight(), 0);
    }
}
