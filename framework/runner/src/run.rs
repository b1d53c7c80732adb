use std::process::ExitCode;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use anyhow::Context;
use gangway_core::prelude::{DelegatedShutdownListener, ShutdownSignalError, VirtualUserBailError};
use gangway_instruments::threshold::{evaluate_thresholds, ThresholdReport};
use gangway_instruments::{MetricsSnapshot, ReportConfig};
use gangway_summary_model::{
    append_run_summary, CounterSummary, RunSummary, StageSummary, ThresholdSummary, TimingSummary,
};

use crate::definition::ScenarioDefinition;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::ramp::{RampScheduler, RampStats};
use crate::{
    context::{AgentContext, RunnerContext, UserValuesConstraint},
    definition::ScenarioDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// The result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub metrics: MetricsSnapshot,
    pub thresholds: ThresholdReport,
    pub peak_vus: usize,
    pub vus_started: u64,
}

impl RunOutcome {
    /// True when every threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.passed()
    }

    /// Exit code for the scenario binary, non-zero when any threshold failed.
    pub fn exit_code(&self) -> ExitCode {
        if self.passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Run a scenario to completion.
///
/// Configuration errors are returned before any virtual user starts. Once the run has started,
/// failures inside virtual users are logged and recorded as metrics, and the verdict is reported
/// through [RunOutcome::passed].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario {} as run {}",
        definition.name,
        definition.run_id
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let reporter = Arc::new(ReportConfig::default().enable_summary().init());
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        definition.connection_string.clone(),
        definition.run_id.clone(),
        definition.scenario_config.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let started_at = chrono::Utc::now().timestamp();
    let active_vus = Arc::new(AtomicUsize::new(0));
    if !definition.no_progress {
        start_progress(
            definition.schedule.total_duration(),
            active_vus.clone(),
            shutdown_handle.new_listener(),
        );
    }

    let runner_context = Arc::new(runner_context);

    // Ready to start spawning virtual users so start the resource monitor to report high usage
    // which might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener());

    let stats = {
        let runner_context = runner_context.clone();
        let vu_shutdown_handle = shutdown_handle.clone();
        let setup_agent_fn = definition.setup_agent_fn;
        let behaviour = definition.agent_behaviour;
        let teardown_agent_fn = definition.teardown_agent_fn;

        let mut spawn_vu = move |vu_id: u64, vu_stop: DelegatedShutdownListener| {
            let runner_context = runner_context.clone();
            // For us to check if the run is stopping between iterations
            let run_stop = vu_shutdown_handle.new_listener();
            // For the behaviour implementation to listen for shutdown and respond appropriately
            let delegated_shutdown_listener = vu_shutdown_handle.new_listener();

            std::thread::Builder::new()
                .name(format!("vu-{vu_id}"))
                .spawn(move || {
                    let mut context =
                        AgentContext::new(vu_id, runner_context, delegated_shutdown_listener);
                    if let Some(setup_agent_fn) = setup_agent_fn {
                        if let Err(e) = setup_agent_fn(&mut context) {
                            log::error!(
                                "Agent setup failed for {}: {:?}",
                                context.agent_name(),
                                e
                            );
                            return;
                        }
                    }

                    loop {
                        if vu_stop.should_shutdown() || run_stop.should_shutdown() {
                            log::debug!("Stopping {}", context.agent_name());
                            break;
                        }

                        match behaviour(&mut context) {
                            Ok(()) => {}
                            Err(e) if e.is::<ShutdownSignalError>() => {
                                // Expected when the run is stopping. The check at the top of the
                                // loop will catch this and break out.
                            }
                            Err(e) if e.is::<VirtualUserBailError>() => {
                                log::warn!("{} is bailing: {}", context.agent_name(), e);
                                break;
                            }
                            Err(e) => {
                                log::error!(
                                    "Agent behaviour failed for {}: {:?}",
                                    context.agent_name(),
                                    e
                                );
                            }
                        }
                        context.complete_iteration();
                    }

                    if let Some(teardown_agent_fn) = teardown_agent_fn {
                        if let Err(e) = teardown_agent_fn(&mut context) {
                            log::error!(
                                "Agent teardown failed for {}: {:?}",
                                context.agent_name(),
                                e
                            );
                        }
                    }
                })
        };

        RampScheduler::new(
            definition.schedule.clone(),
            definition.ramp_interval,
            &mut spawn_vu,
        )
        .with_observer(definition.ramp_observer.clone())
        .with_active_gauge(active_vus)
        .run(&shutdown_handle)
    };

    log::info!(
        "All virtual users stopped. Peak {} active, {} started",
        stats.peak_active,
        stats.started
    );

    if let Some(teardown_fn) = definition.teardown_fn {
        // Best effort, reporting still happens.
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    let metrics = reporter.snapshot();
    let thresholds = evaluate_thresholds(&definition.thresholds, &metrics);
    reporter.finalize(&thresholds);

    if let Some(summary_path) = &definition.summary_path {
        let summary = build_summary(&definition, started_at, stats, &metrics, &thresholds);
        if let Err(e) = append_run_summary(&summary, summary_path.clone()) {
            log::error!(
                "Failed to write run summary to {}: {:?}",
                summary_path.display(),
                e
            );
        }
    }

    Ok(RunOutcome {
        run_id: definition.run_id,
        metrics,
        thresholds,
        peak_vus: stats.peak_active,
        vus_started: stats.started,
    })
}

fn build_summary<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    started_at: i64,
    stats: RampStats,
    metrics: &MetricsSnapshot,
    thresholds: &ThresholdReport,
) -> RunSummary {
    let stages = definition
        .schedule
        .stages()
        .iter()
        .map(|stage| StageSummary {
            duration_ms: stage.duration.as_millis() as u64,
            target: stage.target,
        })
        .collect();

    let mut summary = RunSummary::new(
        definition.run_id.clone(),
        definition.name.clone(),
        started_at,
        stages,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.peak_vus = stats.peak_active;
    summary.vus_started = stats.started;

    summary.counters = metrics
        .counters()
        .map(|(name, counter)| {
            (
                name.to_string(),
                CounterSummary {
                    passes: counter.passes,
                    fails: counter.fails,
                },
            )
        })
        .collect();
    summary.timings = metrics
        .distributions()
        .filter_map(|(name, distribution)| {
            distribution.stats().map(|stats| {
                (
                    name.to_string(),
                    TimingSummary {
                        count: stats.count,
                        avg: stats.avg,
                        min: stats.min,
                        med: stats.med,
                        p90: stats.p90,
                        p95: stats.p95,
                        p99: stats.p99,
                        max: stats.max,
                    },
                )
            })
        })
        .collect();
    summary.thresholds = thresholds
        .outcomes
        .iter()
        .map(|outcome| ThresholdSummary {
            metric: outcome.metric.clone(),
            expression: outcome.expression.clone(),
            observed: outcome.observed,
            passed: outcome.passed,
            reason: outcome.reason.clone(),
        })
        .collect();
    summary.passed = thresholds.passed();

    for key in &definition.capture_env {
        if let Ok(value) = std::env::var(key) {
            summary.add_env(key.clone(), value);
        }
    }

    summary
}
