use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use echgo_common::default_name;
use echgo_server::config::ServeArgs;
use echgo_server::{Server, ServerConfig};

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "trace",
        1 => "debug",
        2 | 3 => "info",
        4 => "warn",
        _ => "off",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = ServeArgs::parse();
    init_logging(args.verbosity);

    let config = ServerConfig {
        address: args.addr,
        name: args.name.unwrap_or_else(default_name),
    };
    let server = Server::new(config);

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            println!("Listening on {}", addr);
        }
    });

    let uptime = args.uptime;
    let shutdown = async move {
        match uptime {
            Some(uptime) => {
                tokio::select! {
                    _ = tokio::time::sleep(uptime) => info!(?uptime, "uptime elapsed"),
                    _ = tokio::signal::ctrl_c() => info!("interrupted"),
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("could not listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
            }
        }
    };

    server.run(ready_tx, shutdown).await?;
    server.shutdown(args.results.unwrap_or_default())?;
    Ok(())
}
