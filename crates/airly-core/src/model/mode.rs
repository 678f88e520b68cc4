// ── Operating modes and airflow levels ──

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use airly_api::ModeTimer;

/// Operating mode reported and accepted by the unit.
///
/// Discriminants match the device's user-mode codes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UserMode {
    #[default]
    Auto,
    Manual,
    Crowded,
    Refresh,
    Fireplace,
    Away,
    Holiday,
}

impl UserMode {
    /// Device code, 0..=6.
    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::Manual => 1,
            Self::Crowded => 2,
            Self::Refresh => 3,
            Self::Fireplace => 4,
            Self::Away => 5,
            Self::Holiday => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Auto,
            1 => Self::Manual,
            2 => Self::Crowded,
            3 => Self::Refresh,
            4 => Self::Fireplace,
            5 => Self::Away,
            6 => Self::Holiday,
            _ => return None,
        })
    }

    /// Accepts either a mode name (`"Manual"`) or a numeric code (`1`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s
                .parse()
                .ok()
                .or_else(|| s.trim().parse::<i64>().ok().and_then(Self::from_code)),
            Value::Number(n) => n.as_i64().and_then(Self::from_code),
            _ => None,
        }
    }

    /// The timed variant of this mode, if it auto-reverts.
    pub fn timed(self) -> Option<TimedMode> {
        match self {
            Self::Holiday => Some(TimedMode::Holiday),
            Self::Away => Some(TimedMode::Away),
            Self::Fireplace => Some(TimedMode::Fireplace),
            Self::Refresh => Some(TimedMode::Refresh),
            Self::Crowded => Some(TimedMode::Crowded),
            Self::Auto | Self::Manual => None,
        }
    }
}

/// Modes that revert after a duration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TimedMode {
    Holiday,
    Away,
    Fireplace,
    Refresh,
    Crowded,
}

/// Unit in which the device stores a timed mode's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Days,
    Hours,
    Minutes,
}

impl DurationUnit {
    pub fn minutes(self) -> u32 {
        match self {
            Self::Days => 24 * 60,
            Self::Hours => 60,
            Self::Minutes => 1,
        }
    }
}

impl TimedMode {
    pub fn user_mode(self) -> UserMode {
        match self {
            Self::Holiday => UserMode::Holiday,
            Self::Away => UserMode::Away,
            Self::Fireplace => UserMode::Fireplace,
            Self::Refresh => UserMode::Refresh,
            Self::Crowded => UserMode::Crowded,
        }
    }

    /// The device's native unit for this mode's timer.
    pub fn native_unit(self) -> DurationUnit {
        match self {
            Self::Holiday => DurationUnit::Days,
            Self::Away | Self::Crowded => DurationUnit::Hours,
            Self::Fireplace | Self::Refresh => DurationUnit::Minutes,
        }
    }

    /// Longest accepted duration, in minutes.
    pub fn max_minutes(self) -> u32 {
        match self {
            Self::Holiday => 30 * 24 * 60,
            Self::Away => 24 * 60,
            Self::Fireplace | Self::Refresh => 120,
            Self::Crowded => 12 * 60,
        }
    }

    /// Convert minutes to the device's native unit, rounding up, at least 1.
    pub fn to_native(self, minutes: u32) -> u32 {
        minutes.div_ceil(self.native_unit().minutes()).max(1)
    }

    pub fn timer(self) -> ModeTimer {
        match self {
            Self::Holiday => ModeTimer::Holiday,
            Self::Away => ModeTimer::Away,
            Self::Fireplace => ModeTimer::Fireplace,
            Self::Refresh => ModeTimer::Refresh,
            Self::Crowded => ModeTimer::Crowded,
        }
    }
}

impl From<TimedMode> for UserMode {
    fn from(mode: TimedMode) -> Self {
        mode.user_mode()
    }
}

// ── Airflow ──────────────────────────────────────────────────────────

/// Supply airflow level, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "i64")]
pub struct AirflowLevel(u8);

impl AirflowLevel {
    pub const OFF: Self = Self(1);
    pub const LOW: Self = Self(2);
    pub const NORMAL: Self = Self(3);
    pub const HIGH: Self = Self(4);
    pub const REFRESH: Self = Self(5);

    /// `max(1, min(5, x))`.
    pub fn clamp(level: i64) -> Self {
        Self(u8::try_from(level.clamp(1, 5)).unwrap_or(5))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "off",
            2 => "low",
            3 => "normal",
            4 => "high",
            _ => "refresh",
        }
    }

    /// Parse `low` / `normal` / `high` (and `off` / `refresh`), or a number.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::OFF),
            "low" => Some(Self::LOW),
            "normal" => Some(Self::NORMAL),
            "high" => Some(Self::HIGH),
            "refresh" => Some(Self::REFRESH),
            other => other.parse::<i64>().ok().map(Self::clamp),
        }
    }
}

impl Default for AirflowLevel {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i64> for AirflowLevel {
    fn from(level: i64) -> Self {
        Self::clamp(level)
    }
}

impl From<AirflowLevel> for u8 {
    fn from(level: AirflowLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for AirflowLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn clamp_law_holds() {
        for x in -10_i64..=10 {
            let expected = x.clamp(1, 5);
            assert_eq!(i64::from(AirflowLevel::clamp(x).value()), expected, "x = {x}");
        }
        assert_eq!(AirflowLevel::clamp(i64::MAX).value(), 5);
        assert_eq!(AirflowLevel::clamp(i64::MIN).value(), 1);
    }

    #[test]
    fn mode_codes_round_trip() {
        for mode in UserMode::iter() {
            assert_eq!(UserMode::from_code(i64::from(mode.code())), Some(mode));
        }
        assert_eq!(UserMode::from_code(7), None);
    }

    #[test]
    fn mode_from_value_accepts_names_and_codes() {
        assert_eq!(UserMode::from_value(&json!("Manual")), Some(UserMode::Manual));
        assert_eq!(UserMode::from_value(&json!("holiday")), Some(UserMode::Holiday));
        assert_eq!(UserMode::from_value(&json!(4)), Some(UserMode::Fireplace));
        assert_eq!(UserMode::from_value(&json!("5")), Some(UserMode::Away));
        assert_eq!(UserMode::from_value(&json!("turbo")), None);
        assert_eq!(UserMode::from_value(&json!(null)), None);
    }

    #[test]
    fn only_five_modes_are_timed() {
        let timed: Vec<_> = UserMode::iter().filter_map(UserMode::timed).collect();
        assert_eq!(timed.len(), 5);
        assert!(UserMode::Auto.timed().is_none());
        assert!(UserMode::Manual.timed().is_none());
    }

    #[test]
    fn native_conversion_rounds_up() {
        assert_eq!(TimedMode::Holiday.to_native(1440), 1);
        assert_eq!(TimedMode::Holiday.to_native(1441), 2);
        assert_eq!(TimedMode::Away.to_native(90), 2);
        assert_eq!(TimedMode::Crowded.to_native(60), 1);
        assert_eq!(TimedMode::Fireplace.to_native(15), 15);
        assert_eq!(TimedMode::Refresh.to_native(0), 1);
    }

    #[test]
    fn airflow_labels_parse() {
        assert_eq!(AirflowLevel::parse("low"), Some(AirflowLevel::LOW));
        assert_eq!(AirflowLevel::parse("High"), Some(AirflowLevel::HIGH));
        assert_eq!(AirflowLevel::parse("9"), Some(AirflowLevel::REFRESH));
        assert_eq!(AirflowLevel::parse("loud"), None);
    }
}
