//! Single-pass per-position mean and standard deviation.
//!
//! Welford's recurrence: `delta` is taken against the pre-update mean, the
//! squared-deviation sum uses the post-update mean with the old delta. That
//! ordering is what keeps the accumulation stable over millions of rows and
//! must not be replaced by a naive sum-of-squares.

use thiserror::Error;
use tracing::info;

const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("accumulator received a {got}-element vector, expected {expected}")]
    FeatureLen { expected: usize, got: usize },
    #[error("no vectors accumulated")]
    Empty,
}

/// Per-feature-position result. Standard deviation uses the population
/// divisor `n`, not `n - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsResult {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

pub struct OnlineStats {
    n: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl OnlineStats {
    pub fn new(feature_len: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; feature_len],
            m2: vec![0.0; feature_len],
        }
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn push(&mut self, row: &[u8]) -> Result<(), StatsError> {
        if row.len() != self.mean.len() {
            return Err(StatsError::FeatureLen {
                expected: self.mean.len(),
                got: row.len(),
            });
        }
        self.n += 1;
        if self.n == 1 {
            for (m, &v) in self.mean.iter_mut().zip(row) {
                *m = f64::from(v);
            }
        } else {
            let n = self.n as f64;
            for ((m, m2), &v) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(row) {
                let x = f64::from(v);
                let delta = x - *m;
                *m += delta / n;
                *m2 += (x - *m) * delta;
            }
        }
        if self.n % PROGRESS_INTERVAL == 0 {
            info!(
                target: "pixpack",
                event = "stats_progress",
                rows = self.n,
                "stats pass progress"
            );
        }
        Ok(())
    }

    pub fn finish(self) -> Result<StatsResult, StatsError> {
        if self.n == 0 {
            return Err(StatsError::Empty);
        }
        let n = self.n as f64;
        let mean = self.mean.iter().map(|m| *m as f32).collect();
        let std = self.m2.iter().map(|m2| (m2 / n).sqrt() as f32).collect();
        Ok(StatsResult { mean, std })
    }
}
