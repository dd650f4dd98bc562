//! Server-side access metrics.
//!
//! [`AccessMetrics`] counts the messages received from each client and tracks
//! when the session started (first access) and finished (last completed
//! exchange), from which it derives throughput.
//!
//! # Lock discipline
//!
//! Every field lives in one [`MetricsState`] behind a single `RwLock`. Derived
//! values are computed on the state while one guard is held, so a serialized
//! record is always a consistent point-in-time snapshot. [`AccessMetrics::append`]
//! never holds two locks at once: it copies the argument under its read lock,
//! releases it, and only then takes the receiver's write lock.

use humantime::format_duration;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use echgo_common::results::append_json;
use echgo_common::Result;

/// Abstraction over wall-clock time for testability.
///
/// Wall-clock (rather than monotonic) time is used so that metrics recorded by
/// independent server processes can be merged.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Production clock backed by `SystemTime`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone, Default)]
struct MetricsState {
    /// Time of the first client message; set once.
    started: Option<SystemTime>,
    /// Time of the last completed exchange; overwritten on every completion.
    finished: Option<SystemTime>,
    /// Messages received per client identity.
    accesses: HashMap<String, u64>,
}

impl MetricsState {
    fn accesses(&self) -> u64 {
        self.accesses.values().sum()
    }

    fn n_clients(&self) -> u64 {
        self.accesses.len() as u64
    }

    fn client_mean(&self) -> f64 {
        let n = self.n_clients();
        if n == 0 {
            return 0.0;
        }
        self.accesses() as f64 / n as f64
    }

    fn duration(&self) -> Duration {
        match (self.started, self.finished) {
            (Some(started), Some(finished)) => {
                finished.duration_since(started).unwrap_or(Duration::ZERO)
            }
            _ => Duration::ZERO,
        }
    }

    fn throughput(&self) -> f64 {
        let accesses = self.accesses();
        let duration = self.duration();
        if accesses == 0 || duration.is_zero() {
            return 0.0;
        }
        accesses as f64 / duration.as_secs_f64()
    }
}

/// Thread-safe per-client access counters plus session timing.
pub struct AccessMetrics {
    state: RwLock<MetricsState>,
    clock: Arc<dyn Clock>,
}

impl Default for AccessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AccessMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessMetrics")
            .field("state", &*self.state())
            .finish()
    }
}

impl AccessMetrics {
    /// Create empty metrics timed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create empty metrics timed by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(MetricsState::default()),
            clock,
        }
    }

    // A panic while holding the guard cannot leave the counters half-updated,
    // so a poisoned lock is still safe to use.
    fn state(&self) -> RwLockReadGuard<'_, MetricsState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, MetricsState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one message from `client`, marking the session start on the
    /// first access.
    ///
    /// The clock is read while the write lock is held, so timestamps are
    /// recorded in the same order as the updates.
    pub fn increment(&self, client: &str) {
        let mut state = self.state_mut();
        if state.started.is_none() {
            state.started = Some(self.clock.now());
        }
        *state.accesses.entry(client.to_string()).or_insert(0) += 1;
    }

    /// Mark an exchange as complete; the session finish time moves to now.
    pub fn complete(&self) {
        let mut state = self.state_mut();
        state.finished = Some(self.clock.now());
    }

    /// Total number of accesses across all clients.
    pub fn accesses(&self) -> u64 {
        self.state().accesses()
    }

    /// Number of distinct clients seen.
    pub fn n_clients(&self) -> u64 {
        self.state().n_clients()
    }

    /// Average number of accesses per client, `0.0` with no clients.
    pub fn client_mean(&self) -> f64 {
        self.state().client_mean()
    }

    /// Time between the first access and the last completion.
    ///
    /// Zero until both have been recorded, and zero if the recorded finish
    /// precedes the start.
    pub fn duration(&self) -> Duration {
        self.state().duration()
    }

    /// Accesses per second over [`duration`](Self::duration); `0.0` when
    /// either is zero.
    pub fn throughput(&self) -> f64 {
        self.state().throughput()
    }

    /// Accesses recorded for a single client.
    pub fn client_accesses(&self, client: &str) -> u64 {
        self.state().accesses.get(client).copied().unwrap_or(0)
    }

    pub fn started(&self) -> Option<SystemTime> {
        self.state().started
    }

    pub fn finished(&self) -> Option<SystemTime> {
        self.state().finished
    }

    /// Snapshot the metrics as a JSON object merged with `extra`.
    ///
    /// Keys in `extra` override the fixed keys on collision.
    pub fn serialize(&self, extra: &Map<String, Value>) -> Map<String, Value> {
        let state = self.state();

        let mut data = Map::new();
        data.insert("clients".into(), state.n_clients().into());
        data.insert("accesses".into(), state.accesses().into());
        data.insert("mean".into(), state.client_mean().into());
        data.insert(
            "duration".into(),
            format_duration(state.duration()).to_string().into(),
        );
        data.insert("throughput".into(), state.throughput().into());
        drop(state);

        for (key, val) in extra {
            data.insert(key.clone(), val.clone());
        }
        data
    }

    /// Merge another instance's counters into this one.
    ///
    /// Per-client counts are summed; `started` becomes the earlier and
    /// `finished` the later of the two recorded values, where an unset value on
    /// either side is ignored.
    pub fn append(&self, other: &AccessMetrics) {
        let other = other.state().clone();
        let mut state = self.state_mut();

        for (client, count) in other.accesses {
            *state.accesses.entry(client).or_insert(0) += count;
        }

        if let Some(started) = other.started {
            if state.started.map_or(true, |mine| started < mine) {
                state.started = Some(started);
            }
        }

        if let Some(finished) = other.finished {
            if state.finished.map_or(true, |mine| finished > mine) {
                state.finished = Some(finished);
            }
        }
    }

    /// Append the serialized metrics as one JSON line to `path`.
    ///
    /// Does nothing when `path` is empty.
    pub fn write(&self, path: impl AsRef<Path>, extra: &Map<String, Value>) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        append_json(path, &self.serialize(extra))
    }
}

impl fmt::Display for AccessMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        write!(
            f,
            "{} accesses by {} clients in {} -- {:.4} accesses/second",
            state.accesses(),
            state.n_clients(),
            format_duration(state.duration()),
            state.throughput(),
        )
    }
}
