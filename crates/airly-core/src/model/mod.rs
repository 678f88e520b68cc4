// ── Domain model ──

mod mode;
mod status;
mod unit;

pub use mode::{AirflowLevel, DurationUnit, TimedMode, UserMode};
pub use status::StatusUpdate;
pub use unit::{ActiveFunctions, Alarms, UnitState};
