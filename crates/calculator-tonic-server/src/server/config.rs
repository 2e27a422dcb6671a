use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `calculator-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honoured), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "calculator-server",
    version,
    about = "A gRPC calculator service over unary and streaming calls"
)]
pub struct CliArgs {
    /// Capacity of the response buffer between a streaming session and the
    /// gRPC response stream.
    ///
    /// Bounds how many responses can be queued before the session waits for
    /// the client to read. Must be greater than 0.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streaming calls to finish on shutdown
    /// before they are aborted with `UNAVAILABLE`.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Report the first `FindMaximum` candidate as a new maximum.
    ///
    /// By default the first candidate only sets the baseline and the first
    /// notification is the first strict increase over it.
    ///
    /// Environment variable: `ANNOUNCE_FIRST_MAXIMUM`
    #[arg(long, env = "ANNOUNCE_FIRST_MAXIMUM", default_value_t = false)]
    pub announce_first_maximum: bool,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/calculator.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub announce_first_maximum: bool,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            announce_first_maximum: args.announce_first_maximum,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("calculator-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--stream-buffer-size",
            "2",
            "--shutdown-timeout",
            "10",
            "--announce-first-maximum",
            "--server-addr",
            "127.0.0.1:6000",
        ])
        .unwrap();

        assert_eq!(config.stream_buffer_size, 2);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.announce_first_maximum);
        assert_eq!(config.server_addr, "127.0.0.1:6000");
        assert!(!config.uds);
    }

    #[test]
    fn zero_stream_buffer_is_rejected() {
        let err = parse(&["--stream-buffer-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn blank_address_is_rejected() {
        assert!(parse(&["--server-addr", " "]).is_err());
    }
}
