//! Command line of the `echgo-bench` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use echgo_client::{Client, ClientConfig};
use echgo_common::{default_name, Result, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "echgo-bench", version, about = "Echo client and throughput benchmark")]
pub struct Cli {
    /// Log level from 0-5, lower is more verbose
    #[arg(long, global = true, default_value_t = 3)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send messages to the server
    Send(SendArgs),
    /// Run a closed-loop throughput benchmark
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub conn: ConnArgs,

    /// Messages to send, one request each
    pub messages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub conn: ConnArgs,

    /// How long to run, e.g. `30s`, `250ms` or `2m`
    #[arg(short, long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub duration: Duration,

    /// Extra information recorded with the results: number of clients
    #[arg(short, long, default_value_t = 0)]
    pub clients: u64,

    /// Path to append the results to
    #[arg(short = 'o', long, default_value = "results.json")]
    pub results: PathBuf,
}

#[derive(Args, Debug)]
pub struct ConnArgs {
    /// Address of the echo server
    #[arg(short, long, default_value_t = format!("localhost:{DEFAULT_PORT}"))]
    pub addr: String,

    /// Name to identify the client (default is hostname)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Per-request timeout, e.g. `5s` or `1s 500ms`
    #[arg(short, long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub timeout: Duration,
}

impl ConnArgs {
    /// Client configuration described by these arguments.
    pub fn client_config(&self) -> ClientConfig {
        let name = self.name.clone().unwrap_or_else(default_name);
        let mut config = ClientConfig::new(self.addr.clone(), name);
        config.timeout = self.timeout;
        config
    }

    pub fn connect(&self) -> Result<Client> {
        let mut client = Client::new(self.client_config());
        client.connect()?;
        Ok(client)
    }
}
