use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use echgo_common::DEFAULT_PORT;

/// Value of the `server` key added to every metrics record this server writes.
pub const SERVER_KIND: &str = "http";

/// Address the server binds to when none is given.
pub fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Command line of the `echgo-server` binary.
#[derive(Parser, Debug)]
#[command(name = "echgo-server", about = "Run the echo server")]
pub struct ServeArgs {
    /// Address to bind the server to.
    #[arg(short, long, default_value_t = default_bind_addr())]
    pub addr: SocketAddr,

    /// Name to identify the server (default is hostname).
    #[arg(short, long)]
    pub name: Option<String>,

    /// Shut the server down after this long, e.g. `90s` or `1h30m`.
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub uptime: Option<Duration>,

    /// Append the access metrics to this file on shutdown.
    #[arg(short = 'o', long)]
    pub results: Option<PathBuf>,

    /// Log level from 0-5, lower is more verbose.
    #[arg(long, default_value_t = 3)]
    pub verbosity: u8,
}
