// airly-core: Sync coordinator between airly-api and consumers (CLI).

pub mod command;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod model;
pub mod persistence;
pub mod push;
pub mod retry;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{BaseOperation, CoordinatorConfig, ModeDurationDefaults};
pub use coordinator::{
    Coordinator, CoordinatorEvent, DegradedReason, SessionState, UpdateSource,
};
pub use error::CoreError;
pub use persistence::DurationStore;
pub use retry::RetryPolicy;
pub use store::{DurationMap, UnitStore};
pub use stream::{UnitStream, UnitWatchStream};

pub use model::{
    ActiveFunctions, AirflowLevel, Alarms, DurationUnit, StatusUpdate, TimedMode, UnitState,
    UserMode,
};
