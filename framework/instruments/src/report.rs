mod summary_report;

use crate::metrics::{MetricStore, MetricsSnapshot};
use crate::threshold::ThresholdReport;
use crate::OperationRecord;
use std::time::Duration;

pub use summary_report::print_summary;

/// Choose how results are reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    summary: bool,
}

impl ReportConfig {
    /// Print tables of checks, metrics and thresholds to stdout when the run finishes.
    pub fn enable_summary(mut self) -> Self {
        self.summary = true;
        self
    }

    pub fn init(self) -> Reporter {
        Reporter {
            store: MetricStore::default(),
            summary: self.summary,
        }
    }
}

/// The metric recorder for a run.
///
/// One reporter is created per run and shared by reference with every virtual user. All
/// recording methods take `&self` and are safe to call from any number of threads.
#[derive(Debug)]
pub struct Reporter {
    store: MetricStore,
    summary: bool,
}

impl Reporter {
    /// Record a finished operation.
    ///
    /// This appends to the `<operation_id>_duration` distribution, to one extra distribution per
    /// attribute, and counts the operation in the `<operation_id>_failed` counter where a failed
    /// operation is a counter failure.
    pub fn add_operation(&self, operation_record: &OperationRecord) {
        let duration = operation_record.duration();
        let duration_metric = format!("{}_duration", operation_record.operation_id);

        self.record_duration(&duration_metric, duration);
        for (key, value) in &operation_record.attr {
            self.record_duration(&format!("{duration_metric}{{{key}:{value}}}"), duration);
        }

        self.record_check(
            &format!("{}_failed", operation_record.operation_id),
            !operation_record.is_error,
        );
    }

    /// Count a pass or a fail against a counter metric.
    pub fn record_check(&self, name: &str, passed: bool) {
        self.store.increment(name, passed);
    }

    /// Append a duration, in milliseconds, to a distribution metric.
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.store.append(name, duration.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.store.snapshot()
    }

    pub fn finalize(&self, thresholds: &ThresholdReport) {
        if self.summary {
            print_summary(&self.snapshot(), thresholds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_records_duration_series_and_failure_counter() {
        let reporter = ReportConfig::default().init();

        let mut ok = OperationRecord::new("http_req").with_attr("step", "claim_lock");
        ok.finish(false);
        reporter.add_operation(&ok);

        let mut failed = OperationRecord::new("http_req").with_attr("step", "claim_entry");
        failed.finish(true);
        reporter.add_operation(&failed);

        let snapshot = reporter.snapshot();
        assert_eq!(2, snapshot.distribution("http_req_duration").unwrap().len());
        assert_eq!(
            1,
            snapshot
                .distribution("http_req_duration{step:claim_lock}")
                .unwrap()
                .len()
        );
        assert_eq!(
            1,
            snapshot
                .distribution("http_req_duration{step:claim_entry}")
                .unwrap()
                .len()
        );

        let failed = snapshot.counter("http_req_failed").unwrap();
        assert_eq!(1, failed.passes);
        assert_eq!(1, failed.fails);
    }

    #[test]
    fn durations_are_recorded_in_milliseconds() {
        let reporter = ReportConfig::default().init();
        reporter.record_duration("d", Duration::from_micros(1_500));

        let stats = reporter.snapshot().distribution("d").unwrap().stats().unwrap();
        assert_eq!(1.5, stats.max);
    }
}
