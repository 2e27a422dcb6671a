use calculator_tonic_core::proto::{
    ComputeAverageRequest, FindMaximumRequest, PrimeNumberDecompositionRequest, SquareRootRequest,
    SumRequest, calculator_service_client::CalculatorServiceClient,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{codec::CompressionEncoding, transport::Channel};

type Client = CalculatorServiceClient<Channel>;

#[derive(Parser, Debug)]
#[command(
    name = "calculator-client",
    version,
    about = "Calls the calculator gRPC service"
)]
struct Cli {
    /// Calculator server to connect to.
    ///
    /// Environment variable: `SERVER_URL`
    #[arg(long, env = "SERVER_URL", default_value_t = String::from("http://127.0.0.1:50051"))]
    server_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add two numbers.
    Sum {
        #[arg(allow_negative_numbers = true)]
        first: i32,
        #[arg(allow_negative_numbers = true)]
        second: i32,
    },
    /// Square root of a number.
    Sqrt {
        #[arg(allow_negative_numbers = true)]
        number: i32,
    },
    /// Stream the prime factors of a number.
    Primes {
        #[arg(allow_negative_numbers = true)]
        number: i64,
    },
    /// Average of the given numbers, streamed one request each.
    Average {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i32>,
    },
    /// Stream numbers and print every new maximum as soon as it arrives.
    Max {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i32>,

        /// Pause between two candidates, so answers visibly interleave with
        /// the requests.
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let channel = Channel::from_shared(cli.server_url.clone())?
        .connect()
        .await?;
    let mut client = CalculatorServiceClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    let start = Instant::now();
    match cli.command {
        Command::Sum { first, second } => {
            let resp = client
                .sum(SumRequest {
                    first_num: first,
                    second_num: second,
                })
                .await?;
            println!("{first} + {second} = {}", resp.into_inner().result);
        }
        Command::Sqrt { number } => {
            let resp = client.square_root(SquareRootRequest { number }).await?;
            println!("sqrt({number}) = {}", resp.into_inner().number_root);
        }
        Command::Primes { number } => run_primes(&mut client, number).await?,
        Command::Average { numbers } => {
            let count = numbers.len();
            let requests = numbers
                .into_iter()
                .map(|number| ComputeAverageRequest { number });
            let resp = client
                .compute_average(tokio_stream::iter(requests))
                .await?;
            println!("average of {count} numbers = {}", resp.into_inner().result);
        }
        Command::Max {
            numbers,
            interval_ms,
        } => run_max(&mut client, numbers, Duration::from_millis(interval_ms)).await?,
    }

    println!("done in {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

async fn run_primes(client: &mut Client, number: i64) -> anyhow::Result<()> {
    let mut stream = client
        .prime_number_decomposition(PrimeNumberDecompositionRequest {
            prime_number: number,
        })
        .await?
        .into_inner();

    let mut factors = Vec::new();
    while let Some(resp) = stream.next().await {
        let factor = resp?.result;
        println!("factor: {factor}");
        factors.push(factor);
    }

    let joined = factors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" x ");
    println!("{number} = {joined}");
    Ok(())
}

/// Sends the candidates from a separate task while this one prints the
/// maxima, so every answer shows up before the stream is closed.
async fn run_max(
    client: &mut Client,
    numbers: Vec<i32>,
    interval: Duration,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(1);

    let sender = tokio::spawn(async move {
        for number in numbers {
            println!("-> {number}");
            if tx.send(FindMaximumRequest { number }).await.is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });

    let mut maxima = client
        .find_maximum(ReceiverStream::new(rx))
        .await?
        .into_inner();

    while let Some(resp) = maxima.next().await {
        println!("<- new maximum: {}", resp?.maximum);
    }

    sender.await?;
    Ok(())
}
