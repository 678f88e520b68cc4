// ── Runtime coordinator configuration ──
//
// These types describe how a coordinator behaves: duration defaults,
// base operation, timing and retry policies. They never touch disk.
// The CLI builds a `CoordinatorConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{AirflowLevel, TimedMode, UserMode};
use crate::retry::RetryPolicy;

/// Per-mode durations used when a timed mode is activated without an
/// explicit or stored duration. Each value is in the mode's native unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDurationDefaults {
    pub holiday_days: u32,
    pub away_hours: u32,
    pub fireplace_minutes: u32,
    pub refresh_minutes: u32,
    pub crowded_hours: u32,
}

impl Default for ModeDurationDefaults {
    fn default() -> Self {
        Self {
            holiday_days: 1,
            away_hours: 2,
            fireplace_minutes: 15,
            refresh_minutes: 30,
            crowded_hours: 1,
        }
    }
}

impl ModeDurationDefaults {
    /// The default for `mode`, in minutes.
    pub fn minutes(&self, mode: TimedMode) -> u32 {
        let native = match mode {
            TimedMode::Holiday => self.holiday_days,
            TimedMode::Away => self.away_hours,
            TimedMode::Fireplace => self.fireplace_minutes,
            TimedMode::Refresh => self.refresh_minutes,
            TimedMode::Crowded => self.crowded_hours,
        };
        native.saturating_mul(mode.native_unit().minutes())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let checks = [
            ("holiday_days", self.holiday_days, 30),
            ("away_hours", self.away_hours, 24),
            ("fireplace_minutes", self.fireplace_minutes, 120),
            ("refresh_minutes", self.refresh_minutes, 120),
            ("crowded_hours", self.crowded_hours, 12),
        ];
        for (name, value, max) in checks {
            if !(1..=max).contains(&value) {
                return Err(CoreError::Config {
                    message: format!("{name} must be between 1 and {max}, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// The mode (and airflow, when manual) that "apply base operation" restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOperation {
    pub mode: UserMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airflow: Option<AirflowLevel>,
}

impl Default for BaseOperation {
    fn default() -> Self {
        Self {
            mode: UserMode::Manual,
            airflow: Some(AirflowLevel::NORMAL),
        }
    }
}

impl BaseOperation {
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.mode, self.airflow) {
            (UserMode::Manual, None) => Err(CoreError::Config {
                message: "base airflow is required when the base mode is manual".into(),
            }),
            (UserMode::Manual, Some(level)) if !(2..=4).contains(&level.value()) => {
                Err(CoreError::Config {
                    message: format!("base airflow must be low, normal or high, got {level}"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Everything a coordinator needs besides its API and push collaborators.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Names the persisted duration record.
    pub instance_id: String,
    pub durations: ModeDurationDefaults,
    pub base: BaseOperation,
    /// Steady-state poll cadence. Zero disables the background poller.
    pub poll_interval: Duration,
    /// Pause between successive unit fetches within one cycle.
    pub request_delay: Duration,
    pub discovery_retry: RetryPolicy,
    pub poll_retry: RetryPolicy,
    pub command_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
    /// Concurrent command dispatches.
    pub command_workers: usize,
    pub push_enabled: bool,
    /// Directory holding the duration store. `None` keeps durations in memory only.
    pub storage_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            instance_id: "default".into(),
            durations: ModeDurationDefaults::default(),
            base: BaseOperation::default(),
            poll_interval: Duration::from_secs(30),
            request_delay: Duration::from_millis(500),
            discovery_retry: RetryPolicy::discovery(),
            poll_retry: RetryPolicy::poll(),
            command_retry: RetryPolicy::command(),
            push_retry: RetryPolicy::push(),
            command_workers: 4,
            push_enabled: true,
            storage_dir: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.durations.validate()?;
        self.base.validate()?;
        if self.command_workers == 0 {
            return Err(CoreError::Config {
                message: "command_workers must be at least 1".into(),
            });
        }
        if self.instance_id.trim().is_empty() {
            return Err(CoreError::Config {
                message: "instance id must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_in_minutes() {
        let d = ModeDurationDefaults::default();
        assert_eq!(d.minutes(TimedMode::Holiday), 1440);
        assert_eq!(d.minutes(TimedMode::Away), 120);
        assert_eq!(d.minutes(TimedMode::Fireplace), 15);
        assert_eq!(d.minutes(TimedMode::Refresh), 30);
        assert_eq!(d.minutes(TimedMode::Crowded), 60);
    }

    #[test]
    fn out_of_range_default_rejected() {
        let d = ModeDurationDefaults {
            away_hours: 25,
            ..ModeDurationDefaults::default()
        };
        assert!(matches!(d.validate(), Err(CoreError::Config { .. })));
        let d = ModeDurationDefaults {
            holiday_days: 0,
            ..ModeDurationDefaults::default()
        };
        assert!(d.validate().is_err());
    }

    #[test]
    fn manual_base_needs_airflow() {
        let base = BaseOperation {
            mode: UserMode::Manual,
            airflow: None,
        };
        assert!(base.validate().is_err());

        let base = BaseOperation {
            mode: UserMode::Auto,
            airflow: None,
        };
        assert!(base.validate().is_ok());
        assert!(BaseOperation::default().validate().is_ok());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
    }
}
