//! gRPC service implementation for the calculator.
//!
//! This module defines [`Calculator`], the concrete implementation of the
//! [`CalculatorService`] gRPC service defined in the protobuf specification.
//!
//! ## Responsibilities
//!
//! - Answer the unary `Sum` and `SquareRoot` calls directly.
//! - Give every streaming call its own session with its own accumulator:
//!   `ComputeAverage` runs inline, `PrimeNumberDecomposition` and
//!   `FindMaximum` are spawned and feed their response stream.
//! - Refuse new streaming calls and cancel stragglers on shutdown.
//!
//! The service value itself is cloned for every connection and holds no
//! per-call state.

use crate::server::{
    config::ServerConfig,
    session::registry::SessionRegistry,
    streaming::{
        average::compute_average,
        channel::{Outbound, StreamChannel},
        maximum::find_maximum,
        primes::feed_prime_factors,
    },
    telemetry::{
        increment_errors, increment_requests, increment_stream_messages, record_stream_duration,
    },
};
use calculator_tonic_core::{
    Error,
    accumulator::MaximumTracker,
    arithmetic::{checked_sum, square_root},
    proto::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse, calculator_service_server::CalculatorService,
    },
};
use core::pin::Pin;
use futures::TryStreamExt;
use std::{sync::Arc, time::Instant};
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

const SUM: &str = "Sum";
const SQUARE_ROOT: &str = "SquareRoot";
const PRIME_NUMBER_DECOMPOSITION: &str = "PrimeNumberDecomposition";
const COMPUTE_AVERAGE: &str = "ComputeAverage";
const FIND_MAXIMUM: &str = "FindMaximum";

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// gRPC calculator service.
///
/// Cheap to clone: clones share the configuration and the
/// [`SessionRegistry`], nothing else.
#[derive(Clone)]
pub struct Calculator {
    config: ServerConfig,
    sessions: Arc<SessionRegistry>,
}

impl Calculator {
    pub fn new(config: ServerConfig) -> Self {
        let sessions = Arc::new(SessionRegistry::new(config.shutdown_timeout));
        Self { config, sessions }
    }

    /// Initiates a graceful shutdown of all streaming sessions.
    ///
    /// New streaming calls are refused from now on. Running ones get the
    /// configured drain period before they are cancelled.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }

    fn new_tracker(&self) -> MaximumTracker {
        if self.config.announce_first_maximum {
            MaximumTracker::announcing_first()
        } else {
            MaximumTracker::new()
        }
    }

    /// Wraps a spawned session's response stream so errors reaching the
    /// client are counted.
    fn into_response<T>(
        method: &'static str,
        responses: impl Stream<Item = Result<T, Status>> + Send + 'static,
    ) -> Response<ResponseStream<T>>
    where
        T: Send + 'static,
    {
        let stream: ResponseStream<T> =
            Box::pin(responses.inspect_err(move |_e| increment_errors(method)));
        Response::new(stream)
    }
}

#[tonic::async_trait]
impl CalculatorService for Calculator {
    type PrimeNumberDecompositionStream = ResponseStream<PrimeNumberDecompositionResponse>;
    type FindMaximumStream = ResponseStream<FindMaximumResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(first = req.get_ref().first_num, second = req.get_ref().second_num)))]
    async fn sum(&self, req: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        increment_requests(SUM);
        let SumRequest {
            first_num,
            second_num,
        } = req.into_inner();

        let result = checked_sum(first_num, second_num).inspect_err(|_| increment_errors(SUM))?;
        Ok(Response::new(SumResponse { result }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = req.get_ref().number)))]
    async fn square_root(
        &self,
        req: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, Status> {
        increment_requests(SQUARE_ROOT);
        let number = req.into_inner().number;

        let number_root = square_root(number).inspect_err(|_| increment_errors(SQUARE_ROOT))?;
        Ok(Response::new(SquareRootResponse { number_root }))
    }

    /// Streams the prime factors of the requested number, smallest first.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = req.get_ref().prime_number)))]
    async fn prime_number_decomposition(
        &self,
        req: Request<PrimeNumberDecompositionRequest>,
    ) -> Result<Response<Self::PrimeNumberDecompositionStream>, Status> {
        increment_requests(PRIME_NUMBER_DECOMPOSITION);
        let start = Instant::now();
        let number = req.into_inner().prime_number;

        let (outbound, responses) = Outbound::channel(self.config.stream_buffer_size);
        let session_outbound = outbound.clone();
        let cancel = self.sessions.cancellation_token();
        let session = async move {
            let sent = feed_prime_factors(number, session_outbound, cancel).await?;
            increment_stream_messages(PRIME_NUMBER_DECOMPOSITION, sent);
            record_stream_duration(
                PRIME_NUMBER_DECOMPOSITION,
                start.elapsed().as_millis() as f64,
            );
            #[cfg(feature = "tracing")]
            tracing::debug!("{number} decomposed into {sent} prime factors");
            Ok::<_, Error>(())
        };

        #[cfg(feature = "tracing")]
        let session = {
            use tracing::Instrument;
            session.instrument(tracing::info_span!("prime_decomposition_session"))
        };

        self.sessions
            .spawn(outbound, session)
            .inspect_err(|_| increment_errors(PRIME_NUMBER_DECOMPOSITION))?;

        Ok(Self::into_response(PRIME_NUMBER_DECOMPOSITION, responses))
    }

    /// Averages every number the client streams and answers once it
    /// half-closes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn compute_average(
        &self,
        req: Request<Streaming<ComputeAverageRequest>>,
    ) -> Result<Response<ComputeAverageResponse>, Status> {
        increment_requests(COMPUTE_AVERAGE);
        let start = Instant::now();
        let inbound = req.into_inner();

        let outcome = self
            .sessions
            .run(compute_average(inbound))
            .await
            .inspect_err(|_e| {
                #[cfg(feature = "tracing")]
                tracing::warn!("Error: {}", _e);
                increment_errors(COMPUTE_AVERAGE);
            })?;

        increment_stream_messages(COMPUTE_AVERAGE, outcome.received + 1);
        record_stream_duration(COMPUTE_AVERAGE, start.elapsed().as_millis() as f64);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "average of {} numbers = {:.2}",
            outcome.received,
            outcome.average
        );

        Ok(Response::new(ComputeAverageResponse {
            result: outcome.average,
        }))
    }

    /// Announces every new strict running maximum while the client streams
    /// candidates.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn find_maximum(
        &self,
        req: Request<Streaming<FindMaximumRequest>>,
    ) -> Result<Response<Self::FindMaximumStream>, Status> {
        increment_requests(FIND_MAXIMUM);
        let start = Instant::now();

        let (channel, responses) =
            StreamChannel::open(req.into_inner(), self.config.stream_buffer_size);
        let (inbound, outbound) = channel.into_parts();
        let tracker = self.new_tracker();

        let session_outbound = outbound.clone();
        let session = async move {
            let summary = find_maximum(inbound, session_outbound, tracker).await?;
            increment_stream_messages(FIND_MAXIMUM, summary.received + summary.emitted);
            record_stream_duration(FIND_MAXIMUM, start.elapsed().as_millis() as f64);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "received {} candidates, emitted {} maxima",
                summary.received,
                summary.emitted
            );
            Ok::<_, Error>(())
        };

        #[cfg(feature = "tracing")]
        let session = {
            use tracing::Instrument;
            session.instrument(tracing::info_span!("find_maximum_session"))
        };

        self.sessions
            .spawn(outbound, session)
            .inspect_err(|_| increment_errors(FIND_MAXIMUM))?;

        Ok(Self::into_response(FIND_MAXIMUM, responses))
    }
}
