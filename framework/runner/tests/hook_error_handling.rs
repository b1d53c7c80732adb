use std::sync::Arc;
use std::time::Duration;

use gangway_runner::prelude::{
    run, AgentContext, GangwayScenarioCli, HookResult, RunnerContext, ScenarioDefinitionBuilder,
    Stage, UserValuesConstraint, VirtualUserBailError,
};

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct AgentContextValue {
    value: i32,
}

impl UserValuesConstraint for AgentContextValue {}

fn sample_cli_cfg() -> GangwayScenarioCli {
    GangwayScenarioCli {
        connection_string: Some("http://localhost:8080/api".to_string()),
        stages: vec![Stage::new(Duration::from_millis(300), 1)],
        no_progress: true,
        ..Default::default()
    }
}

fn idle(ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
    ctx.runner_context().executor().execute_in_place(async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    })
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_tx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "propagate_error_in_setup_hook",
        sample_cli_cfg(),
    )
    .use_setup(setup)
    .use_agent_behaviour(idle);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn capture_error_in_agent_setup() {
    fn agent_setup(_ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in agent setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_setup",
        sample_cli_cfg(),
    )
    .use_agent_setup(agent_setup)
    .use_agent_behaviour(idle);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_agent_behaviour_and_continue() {
    fn agent_behaviour(
        ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        if ctx.get().value < 5 {
            ctx.get_mut().value += 1;
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }

        Err(anyhow::anyhow!("Error in agent behaviour hook"))
    }

    let mut cfg = sample_cli_cfg();
    cfg.stages = vec![Stage::new(Duration::from_secs(30), 1)];
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_behaviour_and_continue",
        cfg,
    )
    .use_agent_behaviour(agent_behaviour);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn bail_error_stops_agent_behaviour() {
    fn agent_behaviour(ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>) -> HookResult {
        if ctx.vu_id() == 1 {
            return Err(VirtualUserBailError::new("first user gives up").into());
        }

        idle(ctx)
    }

    let mut cfg = sample_cli_cfg();
    cfg.stages = vec![
        Stage::new(Duration::ZERO, 2),
        Stage::new(Duration::from_millis(300), 2),
    ];
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "bail_error_stops_agent_behaviour",
        cfg,
    )
    .with_ramp_interval(Duration::from_millis(20))
    .use_agent_behaviour(agent_behaviour);

    let outcome = run(scenario).unwrap();

    // The user that bailed is replaced to keep up with the target.
    assert_eq!(3, outcome.vus_started);
    assert_eq!(2, outcome.peak_vus);
}

#[test]
fn capture_error_in_agent_teardown() {
    fn agent_teardown(
        _ctx: &mut AgentContext<RunnerContextValue, AgentContextValue>,
    ) -> HookResult {
        Err(anyhow::anyhow!("Error in agent teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_teardown",
        sample_cli_cfg(),
    )
    .use_agent_behaviour(idle)
    .use_agent_teardown(agent_teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_teardown",
        sample_cli_cfg(),
    )
    .use_agent_behaviour(idle)
    .use_teardown(teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn configuration_errors_stop_the_run_before_it_starts() {
    let mut cfg = sample_cli_cfg();
    cfg.thresholds = vec![("http_req_duration".to_string(), "p95<1000".to_string())];
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "configuration_errors_stop_the_run_before_it_starts",
        cfg,
    )
    .use_agent_behaviour(idle);

    let err = run(scenario).unwrap_err();

    assert!(err
        .downcast_ref::<gangway_runner::prelude::ConfigError>()
        .is_some());
}
