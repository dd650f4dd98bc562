use clap::Parser;
use std::process;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use echgo_bench::cli::{BenchArgs, Cli, Command, SendArgs};
use echgo_bench::driver::{run_metadata, BenchmarkDriver};

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
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let outcome = match cli.command {
        Command::Send(args) => send(args).await,
        Command::Bench(args) => bench(args).await,
    };

    if let Err(e) = outcome {
        error!("fatal error: {e}");
        eprintln!("fatal error: {e}");
        process::exit(1);
    }
}

async fn send(args: SendArgs) -> echgo_common::Result<()> {
    let mut client = args.conn.connect()?;
    for msg in &args.messages {
        let reply = client.send_message(msg).await?;
        println!("{}: {}", reply.sender, reply.message);
    }
    client.close();
    Ok(())
}

async fn bench(args: BenchArgs) -> echgo_common::Result<()> {
    let client = Arc::new(args.conn.connect()?);
    let metadata = run_metadata(args.clients, client.identity());

    let driver = BenchmarkDriver::new(client.clone());
    let summary = driver.run(args.duration, &args.results, metadata).await?;

    println!(
        "{} messages in {:.3} seconds - {:.3} msg/sec",
        summary.messages,
        summary.latency.as_secs_f64(),
        summary.throughput()
    );
    Ok(())
}
