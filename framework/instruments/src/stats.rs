use serde::{Deserialize, Serialize};

/// Nearest-rank percentile over samples that are already sorted ascending.
///
/// `rank = ceil(p * n / 100)`, clamped to `[1, n]`, and the sample at that 1-based rank is the
/// result. Returns `None` for an empty slice.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let n = sorted.len();
    let rank = (percentile * n as f64 / 100.0).ceil() as usize;
    let rank = rank.clamp(1, n);

    Some(sorted[rank - 1])
}

/// Summary statistics for a latency distribution, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DistributionStats {
    pub(crate) fn from_sorted(sorted: &[f64]) -> Option<Self> {
        let min = *sorted.first()?;
        let max = *sorted.last()?;
        let count = sorted.len();

        Some(Self {
            count,
            avg: sorted.iter().sum::<f64>() / count as f64,
            min,
            med: nearest_rank(sorted, 50.0)?,
            max,
            p90: nearest_rank(sorted, 90.0)?,
            p95: nearest_rank(sorted, 95.0)?,
            p99: nearest_rank(sorted, 99.0)?,
        })
    }
}
