use std::{fmt::Debug, sync::Arc};

use gangway_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gangway_instruments::Reporter;
use serde::de::DeserializeOwned;

use crate::config::ConfigError;
use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every virtual user in a run.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    connection_string: String,
    run_id: String,
    scenario_config: toml::Table,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        connection_string: String,
        run_id: String,
        scenario_config: toml::Table,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            connection_string,
            run_id,
            scenario_config,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    pub fn get_connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn get_run_id(&self) -> &str {
        &self.run_id
    }

    /// Deserialize the `[scenario]` table of the config file. Missing fields take the defaults
    /// of `T`, so `T` should use `#[serde(default)]`.
    pub fn scenario_settings<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.scenario_config.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ScenarioSettings(e.to_string()))
    }

    /// Stop the whole run. Virtual users finish the request they are making and stop at their
    /// next think time.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn new_shutdown_listener(&self) -> DelegatedShutdownListener {
        self.shutdown_handle.new_listener()
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// State owned by a single virtual user.
pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: u64,
    agent_name: String,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        vu_id: u64,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            agent_name: format!("vu-{vu_id}"),
            iteration: 0,
            runner_context,
            shutdown_listener,
            value: Default::default(),
        }
    }

    /// Unique within a run, assigned in start order from 1.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Zero based index of the current iteration. This is the number of iterations this virtual
    /// user has finished before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn complete_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// Listener for the run level stop signal.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Default)]
    struct Empty;
    impl UserValuesConstraint for Empty {}

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Settings {
        class_id: u32,
        schedule_ids: Vec<u32>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                class_id: 1,
                schedule_ids: vec![1, 2, 3, 4],
            }
        }
    }

    #[test]
    fn scenario_settings_fill_defaults() {
        let table: toml::Table = toml::from_str("schedule_ids = [9]").unwrap();
        let context = test_support::runner_context::<Empty>(table);

        assert_eq!(
            Settings {
                class_id: 1,
                schedule_ids: vec![9]
            },
            context.scenario_settings::<Settings>().unwrap()
        );
    }

    #[test]
    fn scenario_settings_reject_wrong_types() {
        let table: toml::Table = toml::from_str("class_id = \"one\"").unwrap();
        let context = test_support::runner_context::<Empty>(table);

        assert!(matches!(
            context.scenario_settings::<Settings>(),
            Err(ConfigError::ScenarioSettings(_))
        ));
    }

    #[test]
    fn agent_iteration_counts_up() {
        let runner_context = Arc::new(test_support::runner_context::<Empty>(toml::Table::new()));
        let listener = runner_context.new_shutdown_listener();
        let mut context = AgentContext::<Empty, Empty>::new(3, runner_context, listener);

        assert_eq!("vu-3", context.agent_name());
        assert_eq!(0, context.iteration());
        context.complete_iteration();
        context.complete_iteration();
        assert_eq!(2, context.iteration());
    }

    #[test]
    fn force_stop_reaches_listeners() {
        let context = test_support::runner_context::<Empty>(toml::Table::new());
        let listener = context.new_shutdown_listener();

        context.force_stop_scenario();
        assert!(listener.should_shutdown());
    }
}
