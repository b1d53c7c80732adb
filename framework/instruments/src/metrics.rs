use crate::stats::{nearest_rank, DistributionStats};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Distribution,
}

#[derive(Debug)]
enum MetricCell {
    Counter { passes: AtomicU64, fails: AtomicU64 },
    Distribution(Mutex<Vec<f64>>),
}

impl MetricCell {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricCell::Counter {
                passes: AtomicU64::new(0),
                fails: AtomicU64::new(0),
            },
            MetricKind::Distribution => MetricCell::Distribution(Mutex::new(Vec::new())),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            MetricCell::Counter { .. } => MetricKind::Counter,
            MetricCell::Distribution(_) => MetricKind::Distribution,
        }
    }
}

/// Append-only store of named metrics, shared by every virtual user.
///
/// The map lock is only taken to find or create a metric. Counters are then updated with atomics
/// and distributions append under their own lock, so writers to different metrics never contend.
#[derive(Debug, Default)]
pub(crate) struct MetricStore {
    cells: RwLock<HashMap<String, Arc<MetricCell>>>,
}

impl MetricStore {
    fn cell(&self, name: &str, kind: MetricKind) -> Option<Arc<MetricCell>> {
        let existing = self.cells.read().get(name).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .cells
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MetricCell::new(kind)))
                .clone(),
        };

        if cell.kind() != kind {
            log::warn!(
                "Metric [{}] is a {:?} metric, dropping a {:?} sample",
                name,
                cell.kind(),
                kind
            );
            return None;
        }

        Some(cell)
    }

    pub(crate) fn increment(&self, name: &str, passed: bool) {
        if let Some(cell) = self.cell(name, MetricKind::Counter) {
            if let MetricCell::Counter { passes, fails } = cell.as_ref() {
                if passed {
                    passes.fetch_add(1, Ordering::Relaxed);
                } else {
                    fails.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub(crate) fn append(&self, name: &str, value: f64) {
        if let Some(cell) = self.cell(name, MetricKind::Distribution) {
            if let MetricCell::Distribution(samples) = cell.as_ref() {
                samples.lock().push(value);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let cells = self
            .cells
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.clone()))
            .collect::<Vec<_>>();

        let metrics = cells
            .into_iter()
            .map(|(name, cell)| {
                let snapshot = match cell.as_ref() {
                    MetricCell::Counter { passes, fails } => MetricSnapshot::Counter(CounterSnapshot {
                        passes: passes.load(Ordering::Relaxed),
                        fails: fails.load(Ordering::Relaxed),
                    }),
                    MetricCell::Distribution(samples) => {
                        let mut sorted = samples.lock().clone();
                        sorted.sort_by(f64::total_cmp);
                        MetricSnapshot::Distribution(DistributionSnapshot { sorted })
                    }
                };
                (name, snapshot)
            })
            .collect();

        MetricsSnapshot { metrics }
    }
}

/// Point in time copy of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub passes: u64,
    pub fails: u64,
}

impl CounterSnapshot {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// `fails / (passes + fails)`, or `None` if nothing was recorded.
    pub fn fail_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.fails as f64 / total as f64),
        }
    }

    pub fn pass_rate(&self) -> Option<f64> {
        self.fail_rate().map(|rate| 1.0 - rate)
    }
}

/// Point in time copy of a distribution, sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    sorted: Vec<f64>,
}

impl DistributionSnapshot {
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn percentile(&self, percentile: f64) -> Option<f64> {
        nearest_rank(&self.sorted, percentile)
    }

    pub fn stats(&self) -> Option<DistributionStats> {
        DistributionStats::from_sorted(&self.sorted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSnapshot {
    Counter(CounterSnapshot),
    Distribution(DistributionSnapshot),
}

/// Every metric recorded so far, keyed and ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<String, MetricSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn counter(&self, name: &str) -> Option<CounterSnapshot> {
        match self.metrics.get(name) {
            Some(MetricSnapshot::Counter(counter)) => Some(*counter),
            _ => None,
        }
    }

    pub fn distribution(&self, name: &str) -> Option<&DistributionSnapshot> {
        match self.metrics.get(name) {
            Some(MetricSnapshot::Distribution(distribution)) => Some(distribution),
            _ => None,
        }
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, CounterSnapshot)> {
        self.metrics.iter().filter_map(|(name, metric)| match metric {
            MetricSnapshot::Counter(counter) => Some((name.as_str(), *counter)),
            _ => None,
        })
    }

    pub fn distributions(&self) -> impl Iterator<Item = (&str, &DistributionSnapshot)> {
        self.metrics.iter().filter_map(|(name, metric)| match metric {
            MetricSnapshot::Distribution(distribution) => Some((name.as_str(), distribution)),
            _ => None,
        })
    }
}
