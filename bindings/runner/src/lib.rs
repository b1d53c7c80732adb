mod common;
mod context;
mod scenario;
mod settings;
mod test_data;

pub mod prelude {
    /// Hooks and helpers for booking scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::context::{BookingAgentContext, BookingRunnerContext};
    pub use crate::scenario::{record_run, run_iteration, ScenarioRun, Step, StepOutcome};
    pub use crate::settings::{BookingSettings, ThinkTime, ThinkTimes};
    pub use crate::test_data::{
        claim_entry_request, claim_lock_request, id_number, passenger, payment_callback_request,
        phone_number,
    };

    /// Re-export of the `gangway_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use gangway_runner::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use booking_client_instrumented::prelude::*;
}
