mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod monitor;
mod progress;
mod ramp;
mod run;
mod shutdown;
mod stage;
mod types;

pub mod prelude {
    pub use crate::cli::GangwayScenarioCli;
    pub use crate::config::{ConfigError, ConfigFile, LoadProfile, ThresholdExpressions};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{
        AgentHookMut, GlobalHook, GlobalHookMut, HookResult, ScenarioDefinitionBuilder,
        DEFAULT_RAMP_INTERVAL,
    };
    pub use crate::executor::Executor;
    pub use crate::ramp::{RampObserver, RampSample};
    pub use crate::run::{run, RunOutcome};
    pub use crate::stage::{Stage, StageSchedule};
    pub use crate::types::GangwayResult;

    pub use gangway_core::prelude::*;
    pub use gangway_instruments::threshold::{Threshold, ThresholdOutcome, ThresholdReport};
    pub use gangway_instruments::{MetricsSnapshot, OperationRecord, ReportConfig, Reporter};
}
