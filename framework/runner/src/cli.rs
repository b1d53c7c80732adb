use crate::config::ConfigError;
use crate::stage::Stage;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(about, long_about = None)]
pub struct GangwayScenarioCli {
    /// The base URL of the service to test, for example `http://localhost:8080/api`
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// Pick one of the load profiles that the scenario defines
    #[clap(long)]
    pub profile: Option<String>,

    /// Stages to run, as a comma separated list of `duration:target`. For example
    /// `--stages 30s:5,1m:10,30s:0`.
    ///
    /// Replaces the stages from the config file and the selected profile.
    #[clap(long, value_delimiter = ',')]
    pub stages: Vec<Stage>,

    /// Add a pass/fail criterion in the format `metric=expression`. For example
    /// `--threshold 'http_req_duration=p(95)<1000'`.
    ///
    /// You can specify multiple thresholds by using the flag multiple times. When any thresholds
    /// are given on the command line, thresholds from the config file and the profile are ignored.
    #[clap(long = "threshold", value_parser = parse_threshold_arg)]
    pub thresholds: Vec<(String, String)>,

    /// Path to a TOML run configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Identify this run in the summary output. A random id is generated if not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file
    #[clap(long)]
    pub summary_path: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

fn parse_threshold_arg(s: &str) -> Result<(String, String), ConfigError> {
    let (metric, expression) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::MalformedThresholdArg(s.to_string()))?;

    let metric = metric.trim();
    let expression = expression.trim();
    if metric.is_empty() || expression.is_empty() {
        return Err(ConfigError::MalformedThresholdArg(s.to_string()));
    }

    Ok((metric.to_string(), expression.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn parse_full_command_line() {
        let cli = GangwayScenarioCli::try_parse_from([
            "booking_flow",
            "--connection-string",
            "http://localhost:8080/api",
            "--stages",
            "30s:5,1m:10",
            "--threshold",
            "http_req_duration=p(95)<=1000",
            "--threshold",
            "checks=rate<0.1",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!(
            Some("http://localhost:8080/api".to_string()),
            cli.connection_string
        );
        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(30), 5),
                Stage::new(Duration::from_secs(60), 10)
            ],
            cli.stages
        );
        assert_eq!(
            vec![
                ("http_req_duration".to_string(), "p(95)<=1000".to_string()),
                ("checks".to_string(), "rate<0.1".to_string()),
            ],
            cli.thresholds
        );
        assert!(cli.no_progress);
    }

    #[test]
    fn reject_threshold_without_metric() {
        assert!(parse_threshold_arg("=p(95)<1000").is_err());
        assert!(parse_threshold_arg("p(95)<1000").is_err());
        assert!(parse_threshold_arg("http_req_duration=").is_err());
    }

    #[test]
    fn reject_bad_stage() {
        assert!(GangwayScenarioCli::try_parse_from(["booking_flow", "--stages", "30s"]).is_err());
    }
}
