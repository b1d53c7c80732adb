mod metrics;
mod operation;
mod report;
mod stats;
pub mod threshold;

pub use metrics::{CounterSnapshot, DistributionSnapshot, MetricSnapshot, MetricsSnapshot};
pub use operation::OperationRecord;
pub use report::{print_summary, ReportConfig, Reporter};
pub use stats::{nearest_rank, DistributionStats};
