use echgo_server::{AccessMetrics, Clock};
use serde_json::{json, Map, Value};
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// --- Test helpers ---

/// Clock reading a settable number of milliseconds since the Unix epoch.
struct MockClock(AtomicU64);

impl MockClock {
    fn new(now_ms: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now_ms)))
    }

    fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::Relaxed);
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.0.load(Ordering::Relaxed))
    }
}

/// Clock whose first reading is slow and earlier than every later reading.
#[derive(Default)]
struct SlowFirstReadClock {
    reads: AtomicU64,
}

impl Clock for SlowFirstReadClock {
    fn now(&self) -> SystemTime {
        if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(200));
            return at(100_000);
        }
        at(200_000)
    }
}

fn at(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Metrics holding `counts` recorded between `started_ms` and `finished_ms`.
fn metrics_with(counts: &[(&str, u64)], started_ms: u64, finished_ms: u64) -> AccessMetrics {
    let clock = MockClock::new(started_ms);
    let metrics = AccessMetrics::with_clock(clock.clone() as Arc<dyn Clock>);
    for (client, n) in counts {
        for _ in 0..*n {
            metrics.increment(client);
        }
    }
    clock.set(finished_ms);
    metrics.complete();
    metrics
}

fn no_extra() -> Map<String, Value> {
    Map::new()
}

// --- Empty metrics ---

#[test]
fn test_empty_metrics_report_zero() {
    let m = AccessMetrics::new();
    assert_eq!(m.accesses(), 0);
    assert_eq!(m.n_clients(), 0);
    assert_eq!(m.client_mean(), 0.0);
    assert_eq!(m.duration(), Duration::ZERO);
    assert_eq!(m.throughput(), 0.0);
    assert!(m.started().is_none());
    assert!(m.finished().is_none());
}

// --- increment / complete ---

#[test]
fn test_increment_counts_per_client() {
    let m = metrics_with(&[("alpha", 3), ("beta", 1)], 1_000, 2_000);
    assert_eq!(m.accesses(), 4);
    assert_eq!(m.n_clients(), 2);
    assert_eq!(m.client_accesses("alpha"), 3);
    assert_eq!(m.client_accesses("beta"), 1);
    assert_eq!(m.client_accesses("gamma"), 0);
    assert_eq!(m.client_mean(), 2.0);
}

#[test]
fn test_started_is_set_only_by_first_increment() {
    let clock = MockClock::new(1_000);
    let m = AccessMetrics::with_clock(clock.clone() as Arc<dyn Clock>);

    m.increment("a");
    clock.set(5_000);
    m.increment("a");
    m.increment("b");

    assert_eq!(m.started(), Some(at(1_000)));
}

#[test]
fn test_complete_overwrites_finished_unconditionally() {
    let clock = MockClock::new(1_000);
    let m = AccessMetrics::with_clock(clock.clone() as Arc<dyn Clock>);
    m.increment("a");

    clock.set(4_000);
    m.complete();
    assert_eq!(m.finished(), Some(at(4_000)));

    // Last write wins even when the clock steps backwards.
    clock.set(3_000);
    m.complete();
    assert_eq!(m.finished(), Some(at(3_000)));
    assert_eq!(m.duration(), Duration::from_secs(2));
}

#[test]
fn test_duration_and_throughput() {
    let m = metrics_with(&[("a", 6), ("b", 4)], 10_000, 12_000);
    assert_eq!(m.duration(), Duration::from_secs(2));
    assert_eq!(m.throughput(), 5.0);
}

#[test]
fn test_throughput_zero_without_duration() {
    // Accesses recorded but no completion yet.
    let m = AccessMetrics::with_clock(MockClock::new(1_000) as Arc<dyn Clock>);
    m.increment("a");
    assert_eq!(m.duration(), Duration::ZERO);
    assert_eq!(m.throughput(), 0.0);

    // Completion at the same instant as the first access.
    m.complete();
    assert_eq!(m.duration(), Duration::ZERO);
    let t = m.throughput();
    assert_eq!(t, 0.0);
    assert!(t.is_finite());
}

#[test]
fn test_throughput_zero_without_accesses() {
    let m = AccessMetrics::with_clock(MockClock::new(1_000) as Arc<dyn Clock>);
    m.complete();
    assert_eq!(m.throughput(), 0.0);
}

#[test]
fn test_duration_zero_when_finished_precedes_started() {
    let clock = MockClock::new(5_000);
    let m = AccessMetrics::with_clock(clock.clone() as Arc<dyn Clock>);
    m.increment("a");
    clock.set(1_000);
    m.complete();
    assert_eq!(m.duration(), Duration::ZERO);
    assert_eq!(m.throughput(), 0.0);
}

// --- Concurrency ---

#[test]
fn test_concurrent_increments_lose_no_updates() {
    let m = Arc::new(AccessMetrics::new());
    let threads = 8;
    let per_thread = 1_000;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let client = format!("client-{}", t % 3);
                for _ in 0..per_thread {
                    m.increment(&client);
                    m.complete();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.accesses(), (threads * per_thread) as u64);
    assert_eq!(m.n_clients(), 3);
}

/// Runs `op` on two threads, the second starting while the first is still
/// inside its slow clock read.
fn race_slow_clock(op: fn(&AccessMetrics)) -> AccessMetrics {
    let clock = Arc::new(SlowFirstReadClock::default());
    let m = Arc::new(AccessMetrics::with_clock(clock as Arc<dyn Clock>));

    let first = {
        let m = Arc::clone(&m);
        thread::spawn(move || op(&m))
    };
    thread::sleep(Duration::from_millis(50));
    let second = {
        let m = Arc::clone(&m);
        thread::spawn(move || op(&m))
    };
    first.join().unwrap();
    second.join().unwrap();

    Arc::try_unwrap(m).unwrap()
}

#[test]
fn test_finished_follows_completion_order_with_slow_clock() {
    let m = race_slow_clock(|m| m.complete());
    assert_eq!(m.finished(), Some(at(200_000)));
}

#[test]
fn test_started_is_earliest_access_with_slow_clock() {
    let m = race_slow_clock(|m| m.increment("a"));
    assert_eq!(m.accesses(), 2);
    assert_eq!(m.started(), Some(at(100_000)));
}

// --- append ---

#[test]
fn test_append_merges_counts_and_widens_window() {
    // T1 < T2 < T3 < T4
    let (t1, t2, t3, t4) = (1_000, 2_000, 3_000, 4_000);
    let m = metrics_with(&[("a", 3)], t1, t3);
    let other = metrics_with(&[("a", 2), ("b", 1)], t2, t4);

    m.append(&other);

    assert_eq!(m.client_accesses("a"), 5);
    assert_eq!(m.client_accesses("b"), 1);
    assert_eq!(m.accesses(), 6);
    assert_eq!(m.started(), Some(at(t1)));
    assert_eq!(m.finished(), Some(at(t4)));

    // The argument is left untouched.
    assert_eq!(other.accesses(), 3);
}

#[test]
fn test_append_keeps_earlier_start_from_argument() {
    let m = metrics_with(&[("a", 1)], 5_000, 6_000);
    let other = metrics_with(&[("b", 1)], 1_000, 2_000);

    m.append(&other);

    assert_eq!(m.started(), Some(at(1_000)));
    assert_eq!(m.finished(), Some(at(6_000)));
}

#[test]
fn test_append_ignores_unset_timestamps() {
    let m = metrics_with(&[("a", 1)], 1_000, 2_000);
    m.append(&AccessMetrics::new());
    assert_eq!(m.started(), Some(at(1_000)));
    assert_eq!(m.finished(), Some(at(2_000)));

    let empty = AccessMetrics::new();
    empty.append(&m);
    assert_eq!(empty.started(), Some(at(1_000)));
    assert_eq!(empty.finished(), Some(at(2_000)));
    assert_eq!(empty.accesses(), 1);
}

#[test]
fn test_append_to_self_doubles_counts() {
    let m = metrics_with(&[("a", 2)], 1_000, 2_000);
    m.append(&m);
    assert_eq!(m.client_accesses("a"), 4);
    assert_eq!(m.duration(), Duration::from_secs(1));
}

#[test]
fn test_concurrent_cross_append_does_not_deadlock() {
    let a = Arc::new(metrics_with(&[("a", 1)], 1_000, 2_000));
    let b = Arc::new(metrics_with(&[("b", 1)], 1_500, 2_500));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let (a, b) = (Arc::clone(&a), Arc::clone(&b));
            thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        a.append(&b);
                    } else {
                        b.append(&a);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(a.accesses() > 1);
    assert!(b.accesses() > 1);
    assert_eq!(a.started(), Some(at(1_000)));
    assert_eq!(b.finished(), Some(at(2_500)));
}

// --- serialize / write ---

#[test]
fn test_serialize_fixed_keys() {
    let m = metrics_with(&[("a", 3), ("b", 1)], 1_000, 3_000);
    let data = m.serialize(&no_extra());

    assert_eq!(data["clients"], json!(2));
    assert_eq!(data["accesses"], json!(4));
    assert_eq!(data["mean"], json!(2.0));
    assert_eq!(data["duration"], json!("2s"));
    assert_eq!(data["throughput"], json!(2.0));
    assert_eq!(data.len(), 5);
}

#[test]
fn test_serialize_extra_keys_win() {
    let m = metrics_with(&[("a", 1)], 1_000, 2_000);
    let mut extra = Map::new();
    extra.insert("server".into(), json!("http"));
    extra.insert("clients".into(), json!("overridden"));

    let data = m.serialize(&extra);

    assert_eq!(data["server"], json!("http"));
    assert_eq!(data["clients"], json!("overridden"));
    assert_eq!(data["accesses"], json!(1));
}

#[test]
fn test_write_with_empty_path_is_noop() {
    let m = metrics_with(&[("a", 1)], 1_000, 2_000);
    assert!(m.write("", &no_extra()).is_ok());
}

#[test]
fn test_write_appends_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.json");
    let m = metrics_with(&[("a", 2)], 1_000, 2_000);
    let mut extra = Map::new();
    extra.insert("server".into(), json!("http"));

    m.write(&path, &extra).unwrap();
    m.increment("b");
    m.write(&path, &extra).unwrap();

    let lines: Vec<Value> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["accesses"], json!(2));
    assert_eq!(lines[0]["server"], json!("http"));
    assert_eq!(lines[1]["accesses"], json!(3));
    assert_eq!(lines[1]["clients"], json!(2));
}

#[test]
fn test_display_summary() {
    let m = metrics_with(&[("a", 3), ("b", 1)], 1_000, 3_000);
    assert_eq!(m.to_string(), "4 accesses by 2 clients in 2s -- 2.0000 accesses/second");
}

#[test]
fn test_serialized_duration_is_human_readable() {
    let cases = [
        (0, "0s"),
        (1_500, "1s 500ms"),
        (123_500, "2m 3s 500ms"),
        (3_600_000, "1h"),
    ];
    for (elapsed_ms, expected) in cases {
        let m = metrics_with(&[("a", 1)], 1_000, 1_000 + elapsed_ms);
        assert_eq!(m.serialize(&no_extra())["duration"], json!(expected));
    }
}
