use crate::threshold::ThresholdOutcome;
use crate::DistributionStats;
use tabled::Tabled;

#[derive(Tabled)]
pub struct CounterRow {
    pub metric: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "rate")]
    pub fail_rate: Option<f64>,
}

#[derive(Tabled)]
pub struct DistributionRow {
    pub metric: String,
    pub count: usize,
    #[tabled(display = "float2")]
    pub avg: f64,
    #[tabled(display = "float2")]
    pub min: f64,
    #[tabled(display = "float2")]
    pub med: f64,
    #[tabled(display = "float2")]
    pub p90: f64,
    #[tabled(display = "float2")]
    pub p95: f64,
    #[tabled(display = "float2")]
    pub p99: f64,
    #[tabled(display = "float2")]
    pub max: f64,
}

impl DistributionRow {
    pub fn new(metric: &str, stats: DistributionStats) -> Self {
        Self {
            metric: metric.to_string(),
            count: stats.count,
            avg: stats.avg,
            min: stats.min,
            med: stats.med,
            p90: stats.p90,
            p95: stats.p95,
            p99: stats.p99,
            max: stats.max,
        }
    }
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub metric: String,
    pub expression: String,
    pub observed: String,
    pub result: &'static str,
}

impl From<&ThresholdOutcome> for ThresholdRow {
    fn from(outcome: &ThresholdOutcome) -> Self {
        Self {
            metric: outcome.metric.clone(),
            expression: outcome.expression.clone(),
            observed: match (&outcome.observed, &outcome.reason) {
                (Some(observed), _) => format!("{observed:.4}"),
                (None, Some(reason)) => reason.clone(),
                (None, None) => "-".to_string(),
            },
            result: if outcome.passed { "pass" } else { "FAIL" },
        }
    }
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn rate(n: &Option<f64>) -> String {
    match n {
        Some(rate) => format!("{:.4}", rate),
        None => "-".to_string(),
    }
}
