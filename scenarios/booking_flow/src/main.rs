use booking_gangway_runner::prelude::*;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

/// Warm up, climb to the expected daily peak and hold it.
fn load_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(secs(30), 20),
        Stage::new(mins(1), 50),
        Stage::new(mins(1), 100),
        Stage::new(mins(1), 200),
        Stage::new(mins(1), 300),
        Stage::new(mins(5), 250),
        Stage::new(secs(30), 0),
    ])
    .with_threshold("http_req_failed", "rate<0.01")
    .with_threshold("http_req_duration", "p(95)<1000")
}

/// Push well past the expected peak. Some failures are tolerated.
fn stress_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(mins(1), 50),
        Stage::new(mins(1), 100),
        Stage::new(mins(1), 200),
        Stage::new(mins(1), 300),
        Stage::new(mins(1), 400),
        Stage::new(mins(3), 500),
        Stage::new(mins(1), 0),
    ])
    .with_threshold("http_req_duration", "p(95)<1000")
    .with_threshold("http_req_failed", "rate<0.1")
}

/// Long climb to 500 virtual users and a gradual descent. No pass/fail criteria.
fn heavy_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(mins(2), 50),
        Stage::new(mins(3), 250),
        Stage::new(mins(4), 500),
        Stage::new(mins(3), 200),
        Stage::new(mins(2), 0),
    ])
}

/// A sudden burst from idle.
fn spike_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(secs(10), 0),
        Stage::new(secs(10), 50),
        Stage::new(secs(30), 50),
        Stage::new(secs(10), 0),
    ])
    .with_threshold("http_req_duration", "p(95)<2000")
    .with_threshold("http_req_failed", "rate<0.05")
}

/// Gentle ramp used by the end to end flow.
fn flow_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(mins(2), 10),
        Stage::new(mins(5), 20),
        Stage::new(mins(3), 30),
        Stage::new(mins(2), 0),
    ])
    .with_threshold("http_req_duration", "p(95)<2000")
    .with_threshold("http_req_failed", "rate<0.05")
}

/// Short ramp to a modest peak, failures counted against every check.
fn ramp_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(secs(30), 5),
        Stage::new(mins(1), 10),
        Stage::new(mins(2), 20),
        Stage::new(mins(1), 30),
        Stage::new(secs(30), 0),
    ])
    .with_threshold("http_req_duration", "p(95)<2000")
    .with_threshold("http_req_failed", "rate<0.1")
    .with_threshold("checks", "rate<0.1")
}

/// A quick check that the target is reachable and the flow works at all.
fn smoke_profile() -> LoadProfile {
    LoadProfile::new(vec![
        Stage::new(secs(10), 2),
        Stage::new(secs(20), 2),
        Stage::new(secs(5), 0),
    ])
    .with_threshold("checks", "rate<0.01")
    .with_threshold("iterations", "rate<0.01")
}

fn teardown(ctx: Arc<RunnerContext<BookingRunnerContext>>) -> HookResult {
    log::info!("Finished run {}", ctx.get_run_id());
    Ok(())
}

fn main() -> GangwayResult<ExitCode> {
    let builder = ScenarioDefinitionBuilder::<BookingRunnerContext, BookingAgentContext>::new_with_init(
        env!("CARGO_PKG_NAME"),
    )
    .with_profile("load", load_profile())
    .with_profile("stress", stress_profile())
    .with_profile("heavy", heavy_profile())
    .with_profile("spike", spike_profile())
    .with_profile("flow", flow_profile())
    .with_profile("ramp", ramp_profile())
    .with_profile("smoke", smoke_profile())
    .with_default_profile("flow")
    .add_capture_env("BOOKING_API_BUILD")
    .use_setup(configure_booking_client)
    .use_agent_setup(attach_booking_client)
    .use_agent_behaviour(run_booking_iteration)
    .use_agent_teardown(report_agent_iterations)
    .use_teardown(teardown);

    Ok(run(builder)?.exit_code())
}
