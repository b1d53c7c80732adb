use std::time::Duration;

use booking_client_instrumented::prelude::DEFAULT_REQUEST_TIMEOUT;
use gangway_runner::prelude::ConfigError;
use rand::Rng;
use serde::Deserialize;

/// A pause between steps, either fixed or drawn uniformly from a range.
///
/// In the config file this is either a duration string such as `"1s"` or a table such as
/// `{ min = "2s", max = "5s" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ThinkTime {
    Fixed(#[serde(with = "humantime_serde")] Duration),
    Range {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl ThinkTime {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        match *self {
            ThinkTime::Fixed(duration) => duration,
            ThinkTime::Range { min, max } if min >= max => min,
            ThinkTime::Range { min, max } => rng.gen_range(min..=max),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        match self {
            ThinkTime::Range { min, max } if min > max => Err(ConfigError::ScenarioSettings(
                format!("think time `{name}` has min {min:?} greater than max {max:?}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Think time after each step of the booking flow succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThinkTimes {
    pub browse_schedules: ThinkTime,
    pub select_schedule: ThinkTime,
    pub claim_lock: ThinkTime,
    pub claim_entry: ThinkTime,
    pub payment_callback: ThinkTime,
    pub fetch_booking: ThinkTime,
}

impl Default for ThinkTimes {
    fn default() -> Self {
        Self {
            browse_schedules: ThinkTime::Fixed(Duration::from_secs(1)),
            select_schedule: ThinkTime::Fixed(Duration::from_secs(1)),
            claim_lock: ThinkTime::Fixed(Duration::from_millis(500)),
            claim_entry: ThinkTime::Fixed(Duration::from_secs(1)),
            payment_callback: ThinkTime::Fixed(Duration::from_secs(1)),
            fetch_booking: ThinkTime::Range {
                min: Duration::from_secs(2),
                max: Duration::from_secs(5),
            },
        }
    }
}

impl ThinkTimes {
    /// No pauses at all.
    pub fn none() -> Self {
        let none = ThinkTime::Fixed(Duration::ZERO);
        Self {
            browse_schedules: none,
            select_schedule: none,
            claim_lock: none,
            claim_entry: none,
            payment_callback: none,
            fetch_booking: none,
        }
    }
}

/// The `[scenario]` table of the run configuration for booking scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingSettings {
    /// Each iteration picks one of these uniformly.
    pub schedule_ids: Vec<u32>,
    pub class_id: u32,
    /// Passengers per claim entry.
    pub passengers: usize,
    pub payment_method: String,
    pub amount: u64,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub think_time: ThinkTimes,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            schedule_ids: vec![1, 2, 3, 4],
            class_id: 1,
            passengers: 1,
            payment_method: "BRIVA".to_string(),
            amount: 100_000,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            think_time: ThinkTimes::default(),
        }
    }
}

impl BookingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule_ids.is_empty() {
            return Err(ConfigError::ScenarioSettings(
                "schedule_ids must not be empty".to_string(),
            ));
        }
        if self.passengers == 0 {
            return Err(ConfigError::ScenarioSettings(
                "passengers must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ScenarioSettings(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        let think_time = &self.think_time;
        think_time.browse_schedules.validate("browse_schedules")?;
        think_time.select_schedule.validate("select_schedule")?;
        think_time.claim_lock.validate("claim_lock")?;
        think_time.claim_entry.validate("claim_entry")?;
        think_time.payment_callback.validate("payment_callback")?;
        think_time.fetch_booking.validate("fetch_booking")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn empty_table_gives_defaults() {
        let settings: BookingSettings = toml::from_str("").unwrap();
        assert_eq!(BookingSettings::default(), settings);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn parse_scenario_table() {
        let settings: BookingSettings = toml::from_str(
            r#"
schedule_ids = [5, 6]
passengers = 2
request_timeout = "10s"

[think_time]
claim_lock = "250ms"
fetch_booking = { min = "1s", max = "2s" }
"#,
        )
        .unwrap();

        assert_eq!(vec![5, 6], settings.schedule_ids);
        assert_eq!(2, settings.passengers);
        assert_eq!(Duration::from_secs(10), settings.request_timeout);
        assert_eq!(
            ThinkTime::Fixed(Duration::from_millis(250)),
            settings.think_time.claim_lock
        );
        assert_eq!(
            ThinkTime::Range {
                min: Duration::from_secs(1),
                max: Duration::from_secs(2)
            },
            settings.think_time.fetch_booking
        );
        assert_eq!(
            ThinkTime::Fixed(Duration::from_secs(1)),
            settings.think_time.browse_schedules
        );
    }

    #[test]
    fn empty_schedule_ids_are_rejected() {
        let settings = BookingSettings {
            schedule_ids: vec![],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ScenarioSettings(_))
        ));
    }

    #[test]
    fn inverted_think_time_range_is_rejected() {
        let mut settings = BookingSettings::default();
        settings.think_time.claim_entry = ThinkTime::Range {
            min: Duration::from_secs(3),
            max: Duration::from_secs(1),
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn range_samples_stay_inside() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = ThinkTime::Range {
            min: Duration::from_secs(2),
            max: Duration::from_secs(5),
        };
        for _ in 0..1_000 {
            let sample = range.sample(&mut rng);
            assert!(sample >= Duration::from_secs(2) && sample <= Duration::from_secs(5));
        }
    }
}
