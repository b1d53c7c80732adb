use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// A window of the run with the number of virtual users to reach by its end.
///
/// The target ramps linearly from the previous stage's target, or from zero for the first stage,
/// over the stage's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Parses the command line form `<duration>:<target>`, for example `30s:10` or `1m30s:50`.
impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedStage(s.to_string());

        let (duration, target) = s.trim().rsplit_once(':').ok_or_else(malformed)?;
        let duration = humantime::parse_duration(duration.trim()).map_err(|_| malformed())?;
        let target = target.trim().parse::<usize>().map_err(|_| malformed())?;

        Ok(Stage::new(duration, target))
    }
}

/// An ordered, non-empty list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSchedule {
    stages: Vec<Stage>,
}

impl StageSchedule {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// Elapsed times at which each stage ends.
    pub fn boundaries(&self) -> Vec<Duration> {
        self.stages
            .iter()
            .scan(Duration::ZERO, |end, stage| {
                *end += stage.duration;
                Some(*end)
            })
            .collect()
    }

    /// The number of virtual users that should be active at `elapsed`.
    ///
    /// Interpolated values are rounded down. Past the end of the schedule this is the last
    /// stage's target.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0usize;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let from = previous_target as f64;
                let to = stage.target as f64;
                return (from + (to - from) * progress).floor().max(0.0) as usize;
            }

            stage_start = stage_end;
            previous_target = stage.target;
        }

        previous_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn schedule() -> StageSchedule {
        StageSchedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 30),
            Stage::new(secs(20), 0),
        ])
        .unwrap()
    }

    #[test]
    fn parse_stage_argument() {
        assert_eq!(Stage::new(secs(30), 5), "30s:5".parse::<Stage>().unwrap());
        assert_eq!(Stage::new(secs(90), 50), "1m30s:50".parse::<Stage>().unwrap());
        assert_eq!(
            Stage::new(Duration::from_millis(500), 0),
            " 500ms : 0 ".parse::<Stage>().unwrap()
        );
    }

    #[test]
    fn reject_malformed_stage_argument() {
        for bad in ["30s", "30s:", "abc:5", "30s:-1", ":5"] {
            assert!(
                matches!(bad.parse::<Stage>(), Err(ConfigError::MalformedStage(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn empty_schedule_is_rejected() {
        assert!(matches!(
            StageSchedule::new(vec![]),
            Err(ConfigError::EmptyStages)
        ));
    }

    #[test]
    fn interpolates_within_stages() {
        let schedule = schedule();
        assert_eq!(0, schedule.target_at(Duration::ZERO));
        assert_eq!(5, schedule.target_at(secs(5)));
        assert_eq!(20, schedule.target_at(secs(15)));
        assert_eq!(15, schedule.target_at(secs(30)));
    }

    #[test]
    fn reaches_each_target_at_stage_end() {
        let schedule = schedule();
        assert_eq!(10, schedule.target_at(secs(10)));
        assert_eq!(30, schedule.target_at(secs(20)));
        assert_eq!(0, schedule.target_at(secs(40)));
        assert_eq!(0, schedule.target_at(secs(100)));
    }

    #[test]
    fn interpolation_rounds_down() {
        let schedule = StageSchedule::new(vec![Stage::new(secs(3), 1)]).unwrap();
        assert_eq!(0, schedule.target_at(Duration::from_millis(2_999)));
        assert_eq!(1, schedule.target_at(secs(3)));
    }

    #[test]
    fn zero_length_stage_jumps() {
        let schedule = StageSchedule::new(vec![
            Stage::new(Duration::ZERO, 50),
            Stage::new(secs(10), 50),
        ])
        .unwrap();
        assert_eq!(50, schedule.target_at(Duration::ZERO));
        assert_eq!(50, schedule.target_at(secs(5)));
    }

    #[test]
    fn boundaries_and_total() {
        let schedule = schedule();
        assert_eq!(vec![secs(10), secs(20), secs(40)], schedule.boundaries());
        assert_eq!(secs(40), schedule.total_duration());
    }
}
