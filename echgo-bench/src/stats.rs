use serde::{Deserialize, Serialize};

/// Online summary of a stream of latency samples (in seconds).
///
/// Mean and variance are maintained with Welford's algorithm, so each
/// [`update`](Self::update) is O(1) and no sample history is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    total: f64,
    minimum: f64,
    maximum: f64,
}

/// Serializable snapshot of a [`LatencyStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub total: f64,
    pub mean: f64,
    pub stddev: f64,
    pub variance: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub range: f64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the running moments.
    pub fn update(&mut self, sample: f64) {
        if self.count == 0 {
            self.minimum = sample;
            self.maximum = sample;
        } else {
            self.minimum = self.minimum.min(sample);
            self.maximum = self.maximum.max(sample);
        }

        self.count += 1;
        self.total += sample;

        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Arithmetic mean; `0.0` with no samples.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator); `0.0` with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn range(&self) -> f64 {
        self.maximum - self.minimum
    }

    pub fn serialize(&self) -> LatencySummary {
        LatencySummary {
            count: self.count,
            total: self.total,
            mean: self.mean(),
            stddev: self.stddev(),
            variance: self.variance(),
            minimum: self.minimum,
            maximum: self.maximum,
            range: self.range(),
        }
    }
}
