//! Closed-loop latency and throughput benchmarking for the echo service.
//!
//! [`driver::BenchmarkDriver`] keeps exactly one request in flight against a
//! [`echgo_client::Transport`] for a fixed wall-clock duration, folding each
//! round trip into [`stats::LatencyStats`], and appends a summary record to a
//! line-delimited JSON results file.

pub mod cli;
pub mod driver;
pub mod stats;

pub use driver::{BenchmarkDriver, BenchmarkResults};
pub use stats::{LatencyStats, LatencySummary};
