use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use booking_client_instrumented::prelude::{ApiCall, ApiError, BookingApiClient};
use gangway_runner::prelude::{DelegatedShutdownListener, Reporter};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;

use crate::settings::{BookingSettings, ThinkTime};
use crate::test_data;

/// The steps of the booking flow, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    BrowseSchedules,
    SelectScheduleDetail,
    ClaimLock,
    ClaimEntry,
    PaymentCallback,
    FetchBooking,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::BrowseSchedules,
        Step::SelectScheduleDetail,
        Step::ClaimLock,
        Step::ClaimEntry,
        Step::PaymentCallback,
        Step::FetchBooking,
    ];

    /// Name of the counter metric that records this step's check.
    pub fn check_name(&self) -> &'static str {
        match self {
            Step::BrowseSchedules => "load schedules success",
            Step::SelectScheduleDetail => "load class success",
            Step::ClaimLock => "claim lock success",
            Step::ClaimEntry => "claim entry success",
            Step::PaymentCallback => "payment success",
            Step::FetchBooking => "get booking success",
        }
    }

    fn think_time(&self, settings: &BookingSettings) -> ThinkTime {
        let think_time = &settings.think_time;
        match self {
            Step::BrowseSchedules => think_time.browse_schedules,
            Step::SelectScheduleDetail => think_time.select_schedule,
            Step::ClaimLock => think_time.claim_lock,
            Step::ClaimEntry => think_time.claim_entry,
            Step::PaymentCallback => think_time.payment_callback,
            Step::FetchBooking => think_time.fetch_booking,
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub success: bool,
    /// Absent when no response arrived.
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}

/// One virtual user iteration of the booking flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRun {
    pub vu_id: u64,
    pub iteration: u64,
    pub schedule_id: u32,
    /// Set once ClaimLock has succeeded.
    pub session_id: Option<String>,
    /// Set once ClaimEntry has succeeded.
    pub order_id: Option<String>,
    /// Outcomes of the steps that were attempted, in order. Steps after a failure are absent.
    pub outcomes: Vec<StepOutcome>,
    pub duration: Duration,
    /// The run was stopped during a think time.
    pub interrupted: bool,
}

impl ScenarioRun {
    fn new(vu_id: u64, iteration: u64, schedule_id: u32) -> Self {
        Self {
            vu_id,
            iteration,
            schedule_id,
            session_id: None,
            order_id: None,
            outcomes: Vec::with_capacity(Step::ALL.len()),
            duration: Duration::ZERO,
            interrupted: false,
        }
    }

    /// Every step ran and passed.
    pub fn completed(&self) -> bool {
        self.outcomes.len() == Step::ALL.len() && self.outcomes.iter().all(|o| o.success)
    }

    /// Record the check for this step and log a diagnostic if it failed. Returns the response
    /// data when the step passed.
    fn check<T>(&mut self, step: Step, call: ApiCall<T>) -> Option<T> {
        match call.result {
            Ok(reply) => {
                self.outcomes.push(StepOutcome {
                    step,
                    success: true,
                    status: Some(reply.status),
                    latency: call.latency,
                    error: None,
                });
                Some(reply.data)
            }
            Err(e) => {
                self.log_failure(&call.endpoint, &e);
                self.outcomes.push(StepOutcome {
                    step,
                    success: false,
                    status: e.status(),
                    latency: call.latency,
                    error: Some(e.to_string()),
                });
                None
            }
        }
    }

    fn log_failure(&self, endpoint: &str, error: &ApiError) {
        let record = match error {
            ApiError::Transport(transport_error) => json!({
                "vu": self.vu_id,
                "iter": self.iteration,
                "endpoint": endpoint,
                "status": null,
                "body": null,
                "transport_error": transport_error.kind.to_string(),
                "error": transport_error.message,
            }),
            _ => json!({
                "vu": self.vu_id,
                "iter": self.iteration,
                "endpoint": endpoint,
                "status": error.status(),
                "body": error.body(),
                "error": error.to_string(),
            }),
        };
        log::error!("{record}");
    }
}

/// Sleep for the step's think time. Returns false if the run is stopping.
async fn think<R: Rng>(
    step: Step,
    settings: &BookingSettings,
    rng: &mut R,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> bool {
    if shutdown_listener.should_shutdown() {
        return false;
    }

    let pause = step.think_time(settings).sample(rng);
    tokio::select! {
        _ = tokio::time::sleep(pause) => true,
        _ = shutdown_listener.wait_for_shutdown() => false,
    }
}

/// Run the booking flow once.
///
/// Each step runs only if the previous one passed. Requests are always allowed to finish, a run
/// level stop takes effect at the next think time.
pub async fn run_iteration<R: Rng>(
    client: &BookingApiClient,
    settings: &BookingSettings,
    vu_id: u64,
    iteration: u64,
    rng: &mut R,
    shutdown_listener: &mut DelegatedShutdownListener,
) -> ScenarioRun {
    let started = Instant::now();
    let schedule_id = settings.schedule_ids.choose(rng).copied();
    let mut run = ScenarioRun::new(vu_id, iteration, schedule_id.unwrap_or_default());

    run_steps(client, settings, schedule_id, rng, shutdown_listener, &mut run).await;

    run.duration = started.elapsed();
    run
}

async fn run_steps<R: Rng>(
    client: &BookingApiClient,
    settings: &BookingSettings,
    schedule_id: Option<u32>,
    rng: &mut R,
    shutdown_listener: &mut DelegatedShutdownListener,
    run: &mut ScenarioRun,
) {
    let Some(schedule_id) = schedule_id else {
        log::error!("No schedule ids configured, skipping iteration");
        run.interrupted = true;
        return;
    };

    macro_rules! pause_after {
        ($step:expr) => {
            if !think($step, settings, rng, shutdown_listener).await {
                run.interrupted = true;
                return;
            }
        };
    }

    let call = client.list_schedules().await;
    if run.check(Step::BrowseSchedules, call).is_none() {
        return;
    }
    pause_after!(Step::BrowseSchedules);

    let call = client.get_schedule(schedule_id).await;
    if run.check(Step::SelectScheduleDetail, call).is_none() {
        return;
    }
    pause_after!(Step::SelectScheduleDetail);

    let request = test_data::claim_lock_request(schedule_id, settings);
    let call = client.claim_lock(&request).await;
    let Some(lock) = run.check(Step::ClaimLock, call) else {
        return;
    };
    run.session_id = Some(lock.session_id.clone());
    pause_after!(Step::ClaimLock);

    let request = test_data::claim_entry_request(rng, run.vu_id, run.iteration, settings);
    let call = client.claim_entry(&lock.session_id, &request).await;
    let Some(entry) = run.check(Step::ClaimEntry, call) else {
        return;
    };
    run.order_id = Some(entry.order_id.clone());
    pause_after!(Step::ClaimEntry);

    let request = test_data::payment_callback_request(
        run.vu_id,
        run.iteration,
        &entry.order_id,
        chrono::Utc::now().timestamp_millis(),
        settings,
    );
    let call = client.payment_callback(&request).await;
    if run.check(Step::PaymentCallback, call).is_none() {
        return;
    }
    pause_after!(Step::PaymentCallback);

    let call = client.get_booking(&entry.order_id).await;
    if run.check(Step::FetchBooking, call).is_none() {
        return;
    }
    // The chain is complete, a stop here only shortens the pause.
    think(Step::FetchBooking, settings, rng, shutdown_listener).await;
}

/// Report an iteration to the metric recorder.
///
/// Every attempted step counts against its own check and the `checks` aggregate. An iteration
/// interrupted by the run stopping is not counted in `iterations` or `iteration_duration`.
pub fn record_run(reporter: &Reporter, run: &ScenarioRun) {
    for outcome in &run.outcomes {
        reporter.record_check(outcome.step.check_name(), outcome.success);
        reporter.record_check("checks", outcome.success);
    }

    if run.interrupted {
        return;
    }

    reporter.record_check("iterations", run.completed());
    reporter.record_duration("iteration_duration", run.duration);
}
