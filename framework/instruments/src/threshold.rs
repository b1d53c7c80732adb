//! Pass/fail predicates over recorded metrics.
//!
//! A threshold pairs a metric name with an expression such as `p(95)<2000` or `rate<0.05`. The
//! expression grammar is `<aggregate> <comparison> <bound>[ms|s]` where the aggregate is one of
//! `avg`, `min`, `med`, `max`, `count`, `p(N)`, `rate`, `rate(fails)` or `rate(passes)`.
//! Whitespace is ignored. Time bounds are in milliseconds unless suffixed with `s`.
//!
//! `rate` on a counter is the failure rate, `fails / (passes + fails)`.

use crate::metrics::{MetricSnapshot, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("threshold `{0}` is missing a metric name")]
    EmptyMetric(String),
    #[error("threshold `{0}` has no comparison operator")]
    MissingComparison(String),
    #[error("unknown aggregate `{aggregate}` in threshold `{expression}`")]
    UnknownAggregate {
        aggregate: String,
        expression: String,
    },
    #[error("percentile must be in (0, 100], got `{0}`")]
    InvalidPercentile(String),
    #[error("invalid bound `{bound}` in threshold `{expression}`")]
    InvalidBound { bound: String, expression: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Percentile(f64),
    FailRate,
    PassRate,
}

impl Aggregate {
    fn parse(s: &str, expression: &str) -> Result<Self, ThresholdParseError> {
        let aggregate = match s {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "med" => Aggregate::Med,
            "max" => Aggregate::Max,
            "count" => Aggregate::Count,
            "rate" | "rate(fails)" => Aggregate::FailRate,
            "rate(passes)" => Aggregate::PassRate,
            other => {
                let percentile = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdParseError::UnknownAggregate {
                        aggregate: other.to_string(),
                        expression: expression.to_string(),
                    })?;
                let value = percentile
                    .parse::<f64>()
                    .map_err(|_| ThresholdParseError::InvalidPercentile(percentile.to_string()))?;
                if !(value > 0.0 && value <= 100.0) {
                    return Err(ThresholdParseError::InvalidPercentile(percentile.to_string()));
                }
                Aggregate::Percentile(value)
            }
        };

        Ok(aggregate)
    }

    fn is_rate(&self) -> bool {
        matches!(self, Aggregate::FailRate | Aggregate::PassRate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two character operators first so `<=` is not read as `<`.
    const OPERATORS: [(&'static str, Comparison); 7] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
        ("=", Comparison::Eq),
    ];

    fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }
}

/// A parsed threshold, ready to be evaluated against a [MetricsSnapshot].
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: String,
    expression: String,
    aggregate: Aggregate,
    comparison: Comparison,
    bound: f64,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ThresholdParseError> {
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(ThresholdParseError::EmptyMetric(expression.to_string()));
        }

        let compact = expression
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();

        let (at, operator, comparison) = Comparison::OPERATORS
            .iter()
            .filter_map(|(op, cmp)| compact.find(op).map(|at| (at, *op, *cmp)))
            .min_by_key(|(at, op, _)| (*at, std::cmp::Reverse(op.len())))
            .ok_or_else(|| ThresholdParseError::MissingComparison(expression.to_string()))?;

        let aggregate = Aggregate::parse(&compact[..at], expression)?;
        let bound = parse_bound(&compact[at + operator.len()..], aggregate, expression)?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            aggregate,
            comparison,
            bound,
        })
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdOutcome {
        match self.observe(snapshot) {
            Ok(observed) => ThresholdOutcome {
                metric: self.metric.clone(),
                expression: self.expression.clone(),
                observed: Some(observed),
                passed: self.comparison.holds(observed, self.bound),
                reason: None,
            },
            Err(reason) => ThresholdOutcome {
                metric: self.metric.clone(),
                expression: self.expression.clone(),
                observed: None,
                passed: false,
                reason: Some(reason),
            },
        }
    }

    fn observe(&self, snapshot: &MetricsSnapshot) -> Result<f64, String> {
        let metric = snapshot
            .get(&self.metric)
            .ok_or_else(|| "metric was never recorded".to_string())?;

        match (metric, self.aggregate) {
            (MetricSnapshot::Counter(counter), Aggregate::FailRate) => {
                counter.fail_rate().ok_or_else(|| "no samples".to_string())
            }
            (MetricSnapshot::Counter(counter), Aggregate::PassRate) => {
                counter.pass_rate().ok_or_else(|| "no samples".to_string())
            }
            (MetricSnapshot::Counter(counter), Aggregate::Count) => Ok(counter.total() as f64),
            (MetricSnapshot::Counter(_), aggregate) => Err(format!(
                "{aggregate:?} does not apply to a counter metric"
            )),
            (MetricSnapshot::Distribution(distribution), aggregate) => {
                let stats = distribution.stats().ok_or_else(|| "no samples".to_string())?;
                let observed = match aggregate {
                    Aggregate::Avg => stats.avg,
                    Aggregate::Min => stats.min,
                    Aggregate::Med => stats.med,
                    Aggregate::Max => stats.max,
                    Aggregate::Count => stats.count as f64,
                    Aggregate::Percentile(p) => distribution
                        .percentile(p)
                        .ok_or_else(|| "no samples".to_string())?,
                    Aggregate::FailRate | Aggregate::PassRate => {
                        return Err(format!(
                            "{aggregate:?} does not apply to a distribution metric"
                        ))
                    }
                };
                Ok(observed)
            }
        }
    }
}

fn parse_bound(raw: &str, aggregate: Aggregate, expression: &str) -> Result<f64, ThresholdParseError> {
    let invalid = || ThresholdParseError::InvalidBound {
        bound: raw.to_string(),
        expression: expression.to_string(),
    };

    let (number, scale) = if aggregate.is_rate() || aggregate == Aggregate::Count {
        (raw, 1.0)
    } else if let Some(number) = raw.strip_suffix("ms") {
        (number, 1.0)
    } else if let Some(number) = raw.strip_suffix('s') {
        (number, 1000.0)
    } else {
        (raw, 1.0)
    };

    let value = number.parse::<f64>().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }

    Ok(value * scale)
}

/// The result of evaluating one [Threshold].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    /// Why the threshold could not be evaluated. Unevaluable thresholds always fail.
    pub reason: Option<String>,
}

impl Display for ThresholdOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.passed { "pass" } else { "FAIL" };
        match (&self.observed, &self.reason) {
            (Some(observed), _) => write!(
                f,
                "{}: {} [{}] observed {:.4}",
                self.metric, self.expression, verdict, observed
            ),
            (None, Some(reason)) => {
                write!(f, "{}: {} [{}] {}", self.metric, self.expression, verdict, reason)
            }
            (None, None) => write!(f, "{}: {} [{}]", self.metric, self.expression, verdict),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl ThresholdReport {
    /// The run passes when every threshold passes. A run with no thresholds passes.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.passed)
    }
}

pub fn evaluate_thresholds(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> ThresholdReport {
    ThresholdReport {
        outcomes: thresholds
            .iter()
            .map(|threshold| threshold.evaluate(snapshot))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportConfig;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn snapshot_with_fail_rate(passes: u64, fails: u64) -> MetricsSnapshot {
        let reporter = ReportConfig::default().init();
        for _ in 0..passes {
            reporter.record_check("http_req_failed", true);
        }
        for _ in 0..fails {
            reporter.record_check("http_req_failed", false);
        }
        reporter.snapshot()
    }

    #[test]
    fn parse_percentile_with_unit() {
        let threshold = Threshold::parse("http_req_duration", "p(95) < 2000ms").unwrap();
        assert_eq!(Aggregate::Percentile(95.0), threshold.aggregate);
        assert_eq!(Comparison::Lt, threshold.comparison);
        assert_eq!(2000.0, threshold.bound);
    }

    #[test]
    fn parse_seconds_bound() {
        let threshold = Threshold::parse("http_req_duration", "avg<=1.5s").unwrap();
        assert_eq!(Comparison::Le, threshold.comparison);
        assert_eq!(1500.0, threshold.bound);
    }

    #[test]
    fn parse_rate_aliases() {
        let plain = Threshold::parse("checks", "rate<0.05").unwrap();
        let explicit = Threshold::parse("checks", "rate(fails) < 0.05").unwrap();
        assert_eq!(plain.aggregate, explicit.aggregate);
        assert_eq!(
            Aggregate::PassRate,
            Threshold::parse("checks", "rate(passes)>0.9").unwrap().aggregate
        );
    }

    #[test]
    fn reject_malformed() {
        assert!(matches!(
            Threshold::parse("m", "p(95) 2000"),
            Err(ThresholdParseError::MissingComparison(_))
        ));
        assert!(matches!(
            Threshold::parse("m", "p95<2000"),
            Err(ThresholdParseError::UnknownAggregate { .. })
        ));
        assert!(matches!(
            Threshold::parse("m", "p(150)<2000"),
            Err(ThresholdParseError::InvalidPercentile(_))
        ));
        assert!(matches!(
            Threshold::parse("m", "rate<abc"),
            Err(ThresholdParseError::InvalidBound { .. })
        ));
        assert!(matches!(
            Threshold::parse("m", "rate<0.05ms"),
            Err(ThresholdParseError::InvalidBound { .. })
        ));
        assert!(matches!(
            Threshold::parse(" ", "rate<0.05"),
            Err(ThresholdParseError::EmptyMetric(_))
        ));
    }

    #[test]
    fn rate_threshold_against_six_percent_fails() {
        let threshold = Threshold::parse("http_req_failed", "rate<0.05").unwrap();
        let outcome = threshold.evaluate(&snapshot_with_fail_rate(94, 6));
        assert!(!outcome.passed);
        assert_eq!(Some(0.06), outcome.observed);
    }

    #[test]
    fn rate_threshold_against_four_percent_passes() {
        let threshold = Threshold::parse("http_req_failed", "rate<0.05").unwrap();
        let outcome = threshold.evaluate(&snapshot_with_fail_rate(96, 4));
        assert!(outcome.passed);
    }

    #[test]
    fn missing_metric_fails() {
        let threshold = Threshold::parse("iteration_duration", "p(95)<100").unwrap();
        let outcome = threshold.evaluate(&MetricsSnapshot::default());
        assert!(!outcome.passed);
        assert_eq!(Some("metric was never recorded".to_string()), outcome.reason);
    }

    #[test]
    fn aggregate_of_wrong_kind_fails() {
        let reporter = ReportConfig::default().init();
        reporter.record_duration("http_req_duration", Duration::from_millis(5));

        let outcome = Threshold::parse("http_req_duration", "rate<0.1")
            .unwrap()
            .evaluate(&reporter.snapshot());
        assert!(!outcome.passed);
        assert!(outcome.reason.is_some());
    }

    #[test]
    fn percentile_threshold_over_distribution() {
        let reporter = ReportConfig::default().init();
        for ms in (1..=10).map(|i| i * 10) {
            reporter.record_duration("http_req_duration", Duration::from_millis(ms));
        }
        let snapshot = reporter.snapshot();

        let report = evaluate_thresholds(
            &[
                Threshold::parse("http_req_duration", "p(95)<=100").unwrap(),
                Threshold::parse("http_req_duration", "med==50").unwrap(),
                Threshold::parse("http_req_duration", "max<100").unwrap(),
            ],
            &snapshot,
        );

        assert_eq!(
            vec![true, true, false],
            report.outcomes.iter().map(|o| o.passed).collect::<Vec<_>>()
        );
        assert!(!report.passed());
        assert_eq!(1, report.failed().count());
    }

    #[test]
    fn percentile_threshold_uses_exact_rank() {
        let reporter = ReportConfig::default().init();
        for ms in 1..=100 {
            reporter.record_duration("http_req_duration", Duration::from_millis(ms));
        }
        let snapshot = reporter.snapshot();

        let report = evaluate_thresholds(
            &[
                Threshold::parse("http_req_duration", "p(55)<56").unwrap(),
                Threshold::parse("http_req_duration", "p(7)<8").unwrap(),
            ],
            &snapshot,
        );

        assert!(report.passed(), "{:?}", report.outcomes);
    }

    #[test]
    fn no_thresholds_pass() {
        assert!(ThresholdReport::default().passed());
    }
}
