use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// One stage of the ramp schedule as it was configured for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSummary {
    /// Stage length in milliseconds
    pub duration_ms: u64,
    /// Target number of virtual users at the end of the stage
    pub target: usize,
}

/// Pass/fail totals for a counter metric, such as a check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSummary {
    pub passes: u64,
    pub fails: u64,
}

/// Statistics for a distribution metric, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimingSummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Result of one threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub reason: Option<String>,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless one is supplied on the command line.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The planned length of the run in seconds, the sum of all stage durations
    ///
    /// The run may have been shorter if it was stopped early.
    pub run_duration: u64,
    /// The stage schedule that drove the virtual user population
    pub stages: Vec<StageSummary>,
    /// The largest number of virtual users that were active at the same time
    pub peak_vus: usize,
    /// Total number of virtual users started over the run
    pub vus_started: u64,
    /// Counter metrics, keyed by metric name
    pub counters: BTreeMap<String, CounterSummary>,
    /// Distribution metrics, keyed by metric name
    pub timings: BTreeMap<String, TimingSummary>,
    /// Threshold results in the order they were configured
    pub thresholds: Vec<ThresholdSummary>,
    /// Whether every threshold passed
    pub passed: bool,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the scenario chooses
    /// to include.
    pub env: HashMap<String, String>,
    /// The version of Gangway that was used for this run
    pub gangway_version: String,
}

impl RunSummary {
    /// Create a new run summary with no results yet
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        stages: Vec<StageSummary>,
        gangway_version: String,
    ) -> Self {
        let run_duration = stages.iter().map(|s| s.duration_ms).sum::<u64>() / 1000;
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            stages,
            peak_vus: 0,
            vus_started: 0,
            counters: BTreeMap::new(),
            timings: BTreeMap::new(),
            thresholds: Vec::new(),
            passed: true,
            env: HashMap::with_capacity(0),
            gangway_version,
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the
    /// scenario. It uses the
    ///     - Scenario name
    ///     - Stages
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Gangway version
    ///
    /// Results and run identity are not part of the fingerprint, so two runs with the same
    /// configuration share it. The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        for stage in &self.stages {
            Digest::update(&mut hasher, stage.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, (stage.target as u64).to_le_bytes());
        }
        for threshold in &self.thresholds {
            Digest::update(&mut hasher, threshold.metric.as_bytes());
            Digest::update(&mut hasher, threshold.expression.as_bytes());
        }
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.gangway_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
