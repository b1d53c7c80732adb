use std::sync::Arc;

use anyhow::Context;
use booking_client_instrumented::prelude::{BookingApiClient, ReqwestTransport, Transport};
use gangway_runner::prelude::{AgentContext, GangwayResult, HookResult, RunnerContext};

use crate::context::{BookingAgentContext, BookingRunnerContext};
use crate::scenario::{record_run, run_iteration};
use crate::settings::BookingSettings;

/// Reads and validates the `[scenario]` settings and creates the booking client for the run.
///
/// Use this as the global setup hook:
/// ```rust,no_run
/// use booking_gangway_runner::prelude::*;
///
/// let builder = ScenarioDefinitionBuilder::<BookingRunnerContext, BookingAgentContext>::new_with_init("booking_flow")
///     .use_setup(configure_booking_client);
/// ```
///
/// Invalid settings or an invalid base URL fail the setup, so the run stops before any virtual
/// user starts.
pub fn configure_booking_client(ctx: &mut RunnerContext<BookingRunnerContext>) -> HookResult {
    let settings = ctx.scenario_settings::<BookingSettings>()?;
    settings.validate()?;

    let transport = ReqwestTransport::new(settings.request_timeout)
        .context("Unable to create the HTTP transport")?;
    configure_booking_client_with_transport(ctx, settings, Arc::new(transport))
}

/// Like [configure_booking_client] but with settings and a transport of your choice.
pub fn configure_booking_client_with_transport(
    ctx: &mut RunnerContext<BookingRunnerContext>,
    settings: BookingSettings,
    transport: Arc<dyn Transport>,
) -> HookResult {
    settings.validate()?;

    let base_url = ctx.get_connection_string().to_string();
    let client = BookingApiClient::new(&base_url, transport, ctx.reporter())?;
    log::info!(
        "Targeting {} with schedules {:?}",
        client.base_url(),
        settings.schedule_ids
    );

    ctx.get_mut().configure(settings, client);
    Ok(())
}

/// Gives the virtual user its handle on the shared booking client.
pub fn attach_booking_client(
    ctx: &mut AgentContext<BookingRunnerContext, BookingAgentContext>,
) -> HookResult {
    let client = ctx.runner_context().get().client()?.clone();
    ctx.get_mut().client = Some(client);
    Ok(())
}

/// Runs one iteration of the booking flow and records its outcome.
///
/// Step failures are recorded as metrics and never returned as errors. The iteration only fails
/// if the hooks were not set up.
pub fn run_booking_iteration(
    ctx: &mut AgentContext<BookingRunnerContext, BookingAgentContext>,
) -> HookResult {
    let vu_id = ctx.vu_id();
    let iteration = ctx.iteration();
    let runner_context = ctx.runner_context().clone();
    let settings = runner_context.get().settings()?;
    let client = booking_client(ctx)?;
    let mut shutdown_listener = ctx.shutdown_listener().clone();

    let run = runner_context.executor().execute_to_completion(async {
        let mut rng = rand::thread_rng();
        run_iteration(
            &client,
            settings,
            vu_id,
            iteration,
            &mut rng,
            &mut shutdown_listener,
        )
        .await
    });

    record_run(&runner_context.reporter(), &run);
    if run.completed() {
        ctx.get_mut().completed_iterations += 1;
    }
    log::trace!(
        "{} finished iteration {} after {} steps",
        ctx.agent_name(),
        iteration,
        run.outcomes.len()
    );

    Ok(())
}

/// Logs how much of the flow this virtual user got through.
pub fn report_agent_iterations(
    ctx: &mut AgentContext<BookingRunnerContext, BookingAgentContext>,
) -> HookResult {
    log::debug!(
        "{} completed {} of {} iterations",
        ctx.agent_name(),
        ctx.get().completed_iterations,
        ctx.iteration()
    );
    Ok(())
}

fn booking_client(
    ctx: &AgentContext<BookingRunnerContext, BookingAgentContext>,
) -> GangwayResult<BookingApiClient> {
    match &ctx.get().client {
        Some(client) => Ok(client.clone()),
        None => Ok(ctx.runner_context().get().client()?.clone()),
    }
}
