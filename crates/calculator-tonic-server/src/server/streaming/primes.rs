use super::channel::Outbound;
use calculator_tonic_core::{
    Error, Result,
    arithmetic::{FactorSearch, PrimeFactors},
    proto::PrimeNumberDecompositionResponse,
};
use tokio_util::sync::CancellationToken;

/// Candidate divisors tried between two checks for a departed client or a
/// cancelled session.
const DIVISORS_PER_CHECK: u64 = 1 << 16;

/// Streams the prime factors of `number` to the client, one message per
/// factor, as soon as each factor is found.
///
/// Trial division can run for a long time between two factors of a large
/// input, so the work happens on the blocking thread pool rather than on a
/// runtime worker. The search stops within [`DIVISORS_PER_CHECK`] divisions
/// once the client stops listening or `cancel` fires. Dropping the returned
/// future cancels the search as well.
///
/// Returns the number of factors sent. Inputs below 2 send nothing.
///
/// # Errors
///
/// - [`Error::ChannelError`] if the response stream went away.
/// - [`Error::ServiceShutdown`] if `cancel` fired.
pub async fn feed_prime_factors(
    number: i64,
    outbound: Outbound<PrimeNumberDecompositionResponse>,
    cancel: CancellationToken,
) -> Result<u64> {
    let _stop_on_drop = cancel.clone().drop_guard();

    tokio::task::spawn_blocking(move || send_factors(number, &outbound, &cancel))
        .await
        .map_err(|e| Error::ChannelError {
            context: format!("prime decomposition task failed: {e}"),
        })?
}

fn send_factors(
    number: i64,
    outbound: &Outbound<PrimeNumberDecompositionResponse>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut factors = PrimeFactors::new(number);
    let mut sent = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        if outbound.is_closed() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Client left after {sent} factors of {number}");
            return Err(Error::ChannelError {
                context: "response stream closed by peer".to_string(),
            });
        }

        match factors.search(DIVISORS_PER_CHECK) {
            FactorSearch::Found(factor) => {
                outbound.blocking_send(PrimeNumberDecompositionResponse { result: factor })?;
                sent += 1;
            }
            FactorSearch::Exhausted => return Ok(sent),
            FactorSearch::Unfinished => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::session::registry::SessionRegistry;
    use core::time::Duration;
    use futures::StreamExt;
    use tokio::time::timeout;
    use tonic::Code;

    /// Largest prime below `i64::MAX`; a full search takes many seconds.
    const LARGE_PRIME: i64 = 9_223_372_036_854_775_783;

    async fn factors_of(number: i64) -> (Result<u64>, Vec<i64>) {
        let (outbound, responses) = Outbound::<PrimeNumberDecompositionResponse>::channel(4);
        let collect = responses.map(|r| r.unwrap().result).collect::<Vec<_>>();
        let (sent, factors) = tokio::join!(
            feed_prime_factors(number, outbound, CancellationToken::new()),
            collect
        );
        (sent, factors)
    }

    #[tokio::test]
    async fn streams_factors_smallest_first() {
        let (sent, factors) = factors_of(12_390_392_840).await;

        assert_eq!(factors.iter().product::<i64>(), 12_390_392_840);
        assert!(factors.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sent.unwrap(), factors.len() as u64);
    }

    #[tokio::test]
    async fn small_inputs_stream_nothing() {
        for number in [1, 0, -30] {
            let (sent, factors) = factors_of(number).await;
            assert_eq!(sent.unwrap(), 0);
            assert!(factors.is_empty());
        }
    }

    #[tokio::test]
    async fn stops_when_client_goes_away() {
        let (outbound, responses) = Outbound::channel(1);
        drop(responses);

        let result = feed_prime_factors(1 << 40, outbound, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::ChannelError { .. })));
    }

    #[tokio::test]
    async fn stops_when_client_leaves_between_factors() {
        let (outbound, responses) = Outbound::channel(1);
        let feeder = tokio::spawn(feed_prime_factors(
            LARGE_PRIME,
            outbound,
            CancellationToken::new(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(responses);

        let result = timeout(Duration::from_secs(5), feeder)
            .await
            .expect("search should notice the closed stream")
            .unwrap();
        assert!(matches!(result, Err(Error::ChannelError { .. })));
    }

    #[tokio::test]
    async fn stops_when_cancelled_between_factors() {
        let (outbound, _responses) = Outbound::channel(1);
        let cancel = CancellationToken::new();
        let feeder = tokio::spawn(feed_prime_factors(LARGE_PRIME, outbound, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = timeout(Duration::from_secs(5), feeder)
            .await
            .expect("search should notice the cancellation")
            .unwrap();
        assert_eq!(result, Err(Error::ServiceShutdown));
    }

    #[tokio::test]
    async fn shutdown_interrupts_long_decomposition() {
        let registry = SessionRegistry::new(Duration::from_millis(50));
        let (outbound, mut responses) = Outbound::channel(1);

        let session_outbound = outbound.clone();
        let cancel = registry.cancellation_token();
        registry
            .spawn(outbound, async move {
                feed_prime_factors(LARGE_PRIME, session_outbound, cancel)
                    .await
                    .map(|_| ())
            })
            .unwrap();

        timeout(Duration::from_secs(5), registry.shutdown())
            .await
            .expect("shutdown should not wait for the search");

        let status = responses.next().await.unwrap().unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);

        // The blocking search lets go of its sender too.
        let end = timeout(Duration::from_secs(5), responses.next())
            .await
            .expect("response stream should end");
        assert!(end.is_none());
    }
}
