use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gangway_instruments::threshold::Threshold;

use crate::cli::GangwayScenarioCli;
use crate::config::{ConfigError, ConfigFile, LoadProfile};
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::ramp::RampObserver;
use crate::stage::StageSchedule;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;

/// How often the ramp scheduler re-computes the target number of virtual users when no stage
/// boundary falls sooner.
pub const DEFAULT_RAMP_INTERVAL: Duration = Duration::from_secs(1);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you by [ScenarioDefinitionBuilder::new_with_init].
    #[doc(hidden)]
    cli: GangwayScenarioCli,
    /// Load profiles that the user can pick with `--profile`.
    profiles: BTreeMap<String, LoadProfile>,
    /// The profile used when the user does not pick one.
    default_profile: Option<String>,
    ramp_interval: Duration,
    ramp_observer: Option<RampObserver>,
    /// Environment variables to record in the run summary.
    capture_env: BTreeSet<String>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run once for each virtual user as it starts.
    ///
    /// If this hook fails, the virtual user does not run its behaviour.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The behaviour that each virtual user runs in a loop, one call per iteration.
    agent_behaviour: Option<AgentHookMut<RV, V>>,
    /// Teardown hook for a virtual user, run once as it stops.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook, run once after every virtual user has stopped.
    ///
    /// This hook is best effort. If it fails the error is logged and the run still reports.
    teardown_fn: Option<GlobalHook<RV>>,
}

/// A scenario with its configuration resolved and validated.
pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub schedule: StageSchedule,
    pub thresholds: Vec<Threshold>,
    pub connection_string: String,
    pub run_id: String,
    pub scenario_config: toml::Table,
    pub summary_path: Option<PathBuf>,
    pub no_progress: bool,
    pub ramp_interval: Duration,
    pub ramp_observer: Option<RampObserver>,
    pub capture_env: BTreeSet<String>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub agent_behaviour: AgentHookMut<RV, V>,
    pub teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise logging, parse the command line and create a new scenario definition.
    ///
    /// This is the usual entry point from a scenario's `main` function.
    pub fn new_with_init(name: &str) -> Self {
        env_logger::init();
        Self::new(name, GangwayScenarioCli::parse())
    }

    /// Create a scenario definition from already parsed command line arguments.
    pub fn new(name: &str, cli: GangwayScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            profiles: BTreeMap::new(),
            default_profile: None,
            ramp_interval: DEFAULT_RAMP_INTERVAL,
            ramp_observer: None,
            capture_env: BTreeSet::new(),
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: None,
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Offer a named load profile. Adding a profile with a name that is already used replaces it.
    pub fn with_profile(mut self, name: &str, profile: LoadProfile) -> Self {
        self.profiles.insert(name.to_string(), profile);
        self
    }

    /// Use this profile when neither the command line nor the config file provide stages or
    /// thresholds.
    pub fn with_default_profile(mut self, name: &str) -> Self {
        self.default_profile = Some(name.to_string());
        self
    }

    pub fn with_ramp_interval(mut self, ramp_interval: Duration) -> Self {
        self.ramp_interval = ramp_interval;
        self
    }

    /// Observe every ramp adjustment. Mostly useful for testing.
    pub fn with_ramp_observer(mut self, observer: RampObserver) -> Self {
        self.ramp_observer = Some(observer);
        self
    }

    /// Record the value of this environment variable in the run summary, if it is set.
    pub fn add_capture_env(mut self, key: &str) -> Self {
        self.capture_env.insert(key.to_string());
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the agent setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the agent behaviour hook [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(mut self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.agent_behaviour = Some(behaviour);
        self
    }

    /// Set the agent teardown hook [ScenarioDefinitionBuilder::teardown_agent_fn] for this scenario.
    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Resolve stages, thresholds and the connection string.
    ///
    /// Each setting is taken from the first source that provides it: the command line, the config
    /// file, the profile chosen with `--profile`, then the default profile.
    pub(crate) fn build(self) -> Result<ScenarioDefinition<RV, V>, ConfigError> {
        let agent_behaviour = self
            .agent_behaviour
            .ok_or_else(|| ConfigError::MissingBehaviour(self.name.clone()))?;

        let config = match &self.cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let profile = match self.cli.profile.as_ref().or(self.default_profile.as_ref()) {
            Some(name) => Some(self.profiles.get(name).cloned().ok_or_else(|| {
                ConfigError::UnknownProfile {
                    name: name.clone(),
                    available: self.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
                }
            })?),
            None => None,
        };

        let stages = if !self.cli.stages.is_empty() {
            self.cli.stages.clone()
        } else if !config.stages.is_empty() {
            config.stages.clone()
        } else {
            profile
                .as_ref()
                .map(|profile| profile.stages.clone())
                .unwrap_or_default()
        };
        let schedule = StageSchedule::new(stages)?;

        let threshold_pairs = if !self.cli.thresholds.is_empty() {
            self.cli.thresholds.clone()
        } else if let Some(pairs) = config.threshold_pairs() {
            pairs
        } else {
            profile
                .as_ref()
                .map(|profile| profile.thresholds.clone())
                .unwrap_or_default()
        };
        let thresholds = threshold_pairs
            .iter()
            .map(|(metric, expression)| {
                Threshold::parse(metric, expression).map_err(|source| ConfigError::Threshold {
                    metric: metric.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let connection_string = self
            .cli
            .connection_string
            .clone()
            .or(config.connection_string)
            .ok_or(ConfigError::MissingConnectionString)?;

        let run_id = self
            .cli
            .run_id
            .clone()
            .unwrap_or_else(|| nanoid::nanoid!());

        Ok(ScenarioDefinition {
            name: self.name,
            schedule,
            thresholds,
            connection_string,
            run_id,
            scenario_config: config.scenario,
            summary_path: self.cli.summary_path,
            no_progress: self.cli.no_progress,
            ramp_interval: self.ramp_interval,
            ramp_observer: self.ramp_observer,
            capture_env: self.capture_env,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
