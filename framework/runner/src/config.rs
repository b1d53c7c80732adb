use crate::stage::Stage;
use gangway_instruments::threshold::ThresholdParseError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Problems with the run configuration. All of these are fatal and are reported before any
/// virtual user starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no stages configured, pass --stages, add [[stages]] to the config file or choose a profile")]
    EmptyStages,
    #[error("invalid stage `{0}`, expected <duration>:<target> such as 30s:10")]
    MalformedStage(String),
    #[error("unknown profile `{name}`, available profiles: {available}")]
    UnknownProfile { name: String, available: String },
    #[error("invalid threshold argument `{0}`, expected <metric>=<expression>")]
    MalformedThresholdArg(String),
    #[error("invalid threshold on `{metric}`: {source}")]
    Threshold {
        metric: String,
        #[source]
        source: ThresholdParseError,
    },
    #[error("no connection string, pass --connection-string or set connection_string in the config file")]
    MissingConnectionString,
    #[error("scenario `{0}` does not define an agent behaviour")]
    MissingBehaviour(String),
    #[error("invalid scenario settings: {0}")]
    ScenarioSettings(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One expression or a list of expressions for a metric.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdExpressions {
    One(String),
    Many(Vec<String>),
}

impl ThresholdExpressions {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ThresholdExpressions::One(expression) => vec![expression],
            ThresholdExpressions::Many(expressions) => expressions,
        }
    }
}

/// The TOML run configuration file.
///
/// ```toml
/// connection_string = "http://localhost:8080/api"
///
/// [[stages]]
/// duration = "30s"
/// target = 5
///
/// [thresholds]
/// http_req_failed = "rate<0.01"
/// http_req_duration = ["p(95)<1000", "avg<500"]
///
/// [scenario]
/// schedule_ids = [1, 2]
/// ```
///
/// The `[scenario]` table is not interpreted by the runner. Scenarios read it through
/// [crate::context::RunnerContext::scenario_settings].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub connection_string: Option<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub thresholds: Option<BTreeMap<String, ThresholdExpressions>>,
    #[serde(default)]
    pub scenario: toml::Table,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Thresholds as `(metric, expression)` pairs, or `None` if the file has no `[thresholds]`
    /// table.
    pub fn threshold_pairs(&self) -> Option<Vec<(String, String)>> {
        self.thresholds.as_ref().map(|thresholds| {
            thresholds
                .iter()
                .flat_map(|(metric, expressions)| {
                    expressions
                        .clone()
                        .into_vec()
                        .into_iter()
                        .map(move |expression| (metric.clone(), expression))
                })
                .collect()
        })
    }
}

/// A named set of stages and thresholds that a scenario offers to its users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadProfile {
    pub stages: Vec<Stage>,
    pub thresholds: Vec<(String, String)>,
}

impl LoadProfile {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            thresholds: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, metric: impl Into<String>, expression: impl Into<String>) -> Self {
        self.thresholds.push((metric.into(), expression.into()));
        self
    }
}
