// ── Command API ──
//
// Every write against a unit flows through the `Command` enum. Local
// commands touch only the stored durations; the rest go to the device.

use std::sync::Arc;

use crate::error::CoreError;
use crate::model::{AirflowLevel, TimedMode, UnitState, UserMode};

/// Setpoint bounds accepted by the device, in degrees Celsius.
pub const MIN_TEMPERATURE: f64 = 12.0;
pub const MAX_TEMPERATURE: f64 = 28.0;

/// Upper bound for locally stored durations, in minutes.
pub const MAX_LOCAL_DURATION: u32 = 24 * 60;

/// A command envelope sent through the command channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against a ventilation unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch mode. Timed modes resolve their duration like
    /// [`SetModeWithDuration`](Self::SetModeWithDuration) with `None`.
    SetMode { unit_id: String, mode: UserMode },
    SetModeWithDuration {
        unit_id: String,
        mode: TimedMode,
        minutes: Option<u32>,
    },
    /// Raw fan level, clamped into 1..=5.
    SetFanSpeed { unit_id: String, level: i64 },
    /// The airflow picker: 2..=4 implies manual mode, 5 is the refresh mode.
    SelectAirflow {
        unit_id: String,
        level: AirflowLevel,
    },
    SetTemperature { unit_id: String, celsius: f64 },
    /// Store a duration locally without touching the device.
    SetModeDuration {
        unit_id: String,
        mode: TimedMode,
        minutes: u32,
    },
    ClearModeDuration { unit_id: String, mode: TimedMode },
    /// Restore the configured base mode and airflow.
    ApplyBaseOperation { unit_id: String },
}

impl Command {
    pub fn unit_id(&self) -> &str {
        match self {
            Self::SetMode { unit_id, .. }
            | Self::SetModeWithDuration { unit_id, .. }
            | Self::SetFanSpeed { unit_id, .. }
            | Self::SelectAirflow { unit_id, .. }
            | Self::SetTemperature { unit_id, .. }
            | Self::SetModeDuration { unit_id, .. }
            | Self::ClearModeDuration { unit_id, .. }
            | Self::ApplyBaseOperation { unit_id } => unit_id,
        }
    }

    /// Whether the command only changes local state.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::SetModeDuration { .. } | Self::ClearModeDuration { .. }
        )
    }
}

/// Outcome of a successful command: the unit after the optimistic update.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub unit: Arc<UnitState>,
}

// ── Validation ───────────────────────────────────────────────────────

/// Check the setpoint range and snap to the 0.5 grid.
pub fn snap_temperature(celsius: f64) -> Result<f64, CoreError> {
    if !celsius.is_finite() || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&celsius) {
        return Err(CoreError::validation(format!(
            "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE} °C, got {celsius}"
        )));
    }
    Ok((celsius * 2.0).round() / 2.0)
}

/// Setpoint in tenths of a degree, as written to the device.
pub(crate) fn temperature_tenths(celsius: f64) -> i64 {
    // Only called on snapped values within 12..=28.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let tenths = (celsius * 10.0).round() as i64;
    tenths
}

/// Explicit durations sent to the device: 1..=mode maximum.
pub fn validate_duration(mode: TimedMode, minutes: u32) -> Result<u32, CoreError> {
    let max = mode.max_minutes();
    if (1..=max).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(CoreError::validation(format!(
            "{mode} duration must be between 1 and {max} minutes, got {minutes}"
        )))
    }
}

/// Locally stored durations: 1..=1440 and within the mode maximum.
pub fn validate_local_duration(mode: TimedMode, minutes: u32) -> Result<u32, CoreError> {
    let max = mode.max_minutes().min(MAX_LOCAL_DURATION);
    if (1..=max).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(CoreError::validation(format!(
            "stored {mode} duration must be between 1 and {max} minutes, got {minutes}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_snaps_to_half_degrees() {
        assert_eq!(snap_temperature(21.3).ok(), Some(21.5));
        assert_eq!(snap_temperature(21.2).ok(), Some(21.0));
        assert_eq!(snap_temperature(12.0).ok(), Some(12.0));
        assert_eq!(snap_temperature(28.0).ok(), Some(28.0));
        assert_eq!(temperature_tenths(21.5), 215);
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        assert!(snap_temperature(11.9).is_err());
        assert!(snap_temperature(28.1).is_err());
        assert!(snap_temperature(f64::NAN).is_err());
    }

    #[test]
    fn durations_bounded_per_mode() {
        assert!(validate_duration(TimedMode::Holiday, 43_200).is_ok());
        assert!(validate_duration(TimedMode::Fireplace, 121).is_err());
        assert!(validate_duration(TimedMode::Away, 0).is_err());
    }

    #[test]
    fn local_durations_capped_at_a_day() {
        assert!(validate_local_duration(TimedMode::Holiday, 1440).is_ok());
        assert!(validate_local_duration(TimedMode::Holiday, 1441).is_err());
        assert!(validate_local_duration(TimedMode::Crowded, 721).is_err());
        assert!(validate_local_duration(TimedMode::Refresh, 120).is_ok());
    }

    #[test]
    fn local_commands() {
        let cmd = Command::ClearModeDuration {
            unit_id: "dev1".into(),
            mode: TimedMode::Away,
        };
        assert!(cmd.is_local());
        assert_eq!(cmd.unit_id(), "dev1");
        assert!(!Command::ApplyBaseOperation { unit_id: "dev1".into() }.is_local());
    }
}
