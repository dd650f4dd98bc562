use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use echgo_client::Transport;
use echgo_common::results::append_json;
use echgo_common::Result;

use crate::stats::{LatencyStats, LatencySummary};

/// Outcome of one request, reported back to the control loop.
type Outcome = Result<Duration>;

/// Closed-loop benchmark: exactly one request is outstanding at a time and the
/// next one is issued only after the previous reply arrives.
pub struct BenchmarkDriver {
    transport: Arc<dyn Transport>,
}

/// Counters owned by a single run.
#[derive(Debug, Default)]
struct BenchmarkRun {
    messages: u64,
    latency: Duration,
    stats: LatencyStats,
}

impl BenchmarkRun {
    fn record(&mut self, latency: Duration) {
        self.messages += 1;
        self.latency += latency;
        self.stats.update(latency.as_secs_f64());
    }
}

/// Summary of a finished benchmark run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResults {
    /// Requests that completed successfully before the deadline.
    pub messages: u64,
    /// Sum of all request round-trip times.
    pub latency: Duration,
    pub distribution: LatencySummary,
    pub metadata: Map<String, Value>,
}

impl BenchmarkResults {
    /// Messages per second of accumulated latency; `0.0` when nothing was sent.
    pub fn throughput(&self) -> f64 {
        if self.messages == 0 || self.latency.is_zero() {
            return 0.0;
        }
        self.messages as f64 / self.latency.as_secs_f64()
    }

    /// The results-file record: metadata plus the measured fields, which take
    /// precedence over metadata keys of the same name.
    pub fn to_record(&self) -> Result<Map<String, Value>> {
        let mut data = self.metadata.clone();
        data.insert("messages".into(), self.messages.into());
        data.insert("latency (nsec)".into(), (self.latency.as_nanos() as u64).into());
        data.insert("latency (sec)".into(), self.latency.as_secs_f64().into());
        data.insert("throughput (msg/sec)".into(), self.throughput().into());
        data.insert(
            "latency distribution".into(),
            serde_json::to_value(&self.distribution)?,
        );
        Ok(data)
    }
}

/// Standard metadata attached to every client record.
pub fn run_metadata(n_clients: u64, name: &str) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("n_clients".into(), n_clients.into());
    extra.insert("name".into(), name.into());
    extra
}

impl BenchmarkDriver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Drive the transport for `duration`, then append the results to
    /// `results` (skipped when empty) and return them.
    ///
    /// The first transport failure ends the run and is returned unchanged;
    /// nothing is written in that case. A request still in flight when the
    /// deadline fires is aborted and does not count.
    pub async fn run(
        &self,
        duration: Duration,
        results: impl AsRef<Path>,
        metadata: Map<String, Value>,
    ) -> Result<BenchmarkResults> {
        let mut run = BenchmarkRun::default();
        let (tx, mut rx) = mpsc::channel::<Outcome>(1);

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        info!(?duration, "starting benchmark");

        let mut in_flight = self.spawn_request(1, tx.clone());

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    in_flight.abort();
                    break;
                }
                Some(outcome) = rx.recv() => match outcome {
                    Ok(latency) => {
                        run.record(latency);
                        in_flight = self.spawn_request(run.messages + 1, tx.clone());
                    }
                    Err(err) => {
                        info!(messages = run.messages, "benchmark aborted: {err}");
                        return Err(err);
                    }
                },
            }
        }

        self.finalize(run, results.as_ref(), metadata)
    }

    fn spawn_request(&self, seq: u64, tx: mpsc::Sender<Outcome>) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let outcome = issue_one(transport.as_ref(), seq).await;
            // The receiver is gone only once the run has finished.
            tx.send(outcome).await.ok();
        })
    }

    fn finalize(
        &self,
        run: BenchmarkRun,
        path: &Path,
        metadata: Map<String, Value>,
    ) -> Result<BenchmarkResults> {
        let results = BenchmarkResults {
            messages: run.messages,
            latency: run.latency,
            distribution: run.stats.serialize(),
            metadata,
        };

        info!(
            "{} messages in {:.3} seconds - {:.3} msg/sec",
            results.messages,
            results.latency.as_secs_f64(),
            results.throughput()
        );

        if !path.as_os_str().is_empty() {
            debug!(path = %path.display(), "writing results");
            append_json(path, &results.to_record()?)?;
        }
        Ok(results)
    }
}

/// Send message number `seq` and measure its round trip.
pub async fn issue_one(transport: &dyn Transport, seq: u64) -> Result<Duration> {
    let message = format_message(seq, SystemTime::now());
    trace!(seq, "sending");

    let start = Instant::now();
    transport.send(message).await?;
    Ok(start.elapsed())
}

/// Request payload carrying the sequence number and send time, e.g.
/// `msg 3 at 1700000000.000000123`.
pub fn format_message(seq: u64, at: SystemTime) -> String {
    let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!(
        "msg {} at {}.{:09}",
        seq,
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    )
}
