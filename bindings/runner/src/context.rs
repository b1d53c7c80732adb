use anyhow::Context;
use booking_client_instrumented::prelude::BookingApiClient;
use gangway_runner::prelude::UserValuesConstraint;

use crate::settings::BookingSettings;

/// Shared by every virtual user. Filled in by [crate::common::configure_booking_client].
#[derive(Default, Debug)]
pub struct BookingRunnerContext {
    settings: Option<BookingSettings>,
    client: Option<BookingApiClient>,
}

impl BookingRunnerContext {
    pub fn configure(&mut self, settings: BookingSettings, client: BookingApiClient) {
        self.settings = Some(settings);
        self.client = Some(client);
    }

    pub fn settings(&self) -> anyhow::Result<&BookingSettings> {
        self.settings
            .as_ref()
            .context("Booking settings are not configured, use configure_booking_client as the setup hook")
    }

    pub fn client(&self) -> anyhow::Result<&BookingApiClient> {
        self.client
            .as_ref()
            .context("Booking client is not configured, use configure_booking_client as the setup hook")
    }
}

impl UserValuesConstraint for BookingRunnerContext {}

#[derive(Default, Debug)]
pub struct BookingAgentContext {
    pub client: Option<BookingApiClient>,
    /// Iterations of this virtual user that got through the whole flow.
    pub completed_iterations: u64,
}

impl UserValuesConstraint for BookingAgentContext {}
