// ── Ventilation unit state ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mode::{AirflowLevel, TimedMode, UserMode};

/// Heating/cooling functions the unit reports as currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFunctions {
    pub heating: bool,
    pub cooling: bool,
    pub defrosting: bool,
    pub eco: bool,
    pub free_cooling: bool,
}

impl ActiveFunctions {
    /// Set one function by its normalized name. Unknown names are ignored.
    pub(crate) fn set(&mut self, name: &str, on: bool) -> bool {
        let slot = match name {
            "heating" => &mut self.heating,
            "cooling" => &mut self.cooling,
            "defrosting" => &mut self.defrosting,
            "eco" => &mut self.eco,
            "free_cooling" => &mut self.free_cooling,
            _ => return false,
        };
        *slot = on;
        true
    }

    /// Names of the functions that are on.
    pub fn active(&self) -> Vec<&'static str> {
        [
            ("heating", self.heating),
            ("cooling", self.cooling),
            ("defrosting", self.defrosting),
            ("eco", self.eco),
            ("free_cooling", self.free_cooling),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

/// Named alarm flags. Always contains at least the filter alarm once a
/// status blob has reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alarms(BTreeMap<String, bool>);

impl Alarms {
    pub fn get(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn filter(&self) -> bool {
        self.get("filter")
    }

    pub(crate) fn set(&mut self, name: impl Into<String>, on: bool) {
        self.0.insert(name.into(), on);
    }

    /// Names of raised alarms.
    pub fn raised(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, on)| **on).map(|(k, _)| k.as_str())
    }
}

/// One ventilation unit as the coordinator sees it.
///
/// Created at discovery and mutated in place afterwards. `mode_durations`
/// is local policy state: it is never read back from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub firmware_versions: BTreeMap<String, String>,

    pub mode: UserMode,
    pub airflow_level: AirflowLevel,

    pub temperature_current: Option<f64>,
    pub temperature_setpoint: Option<f64>,
    pub temperature_outdoor: Option<f64>,
    pub temperature_supply: Option<f64>,
    pub humidity: Option<f64>,
    pub air_quality: Option<i64>,

    pub active_functions: ActiveFunctions,
    pub alarms: Alarms,

    /// Seconds left in the current timed mode.
    pub mode_remaining_time: Option<u64>,

    /// Minutes to use when a timed mode is activated without a duration.
    pub mode_durations: BTreeMap<TimedMode, u32>,

    pub connected: Option<bool>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl UnitState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            firmware_versions: BTreeMap::new(),
            mode: UserMode::default(),
            airflow_level: AirflowLevel::default(),
            temperature_current: None,
            temperature_setpoint: None,
            temperature_outdoor: None,
            temperature_supply: None,
            humidity: None,
            air_quality: None,
            active_functions: ActiveFunctions::default(),
            alarms: Alarms::default(),
            mode_remaining_time: None,
            mode_durations: BTreeMap::new(),
            connected: None,
            last_updated: None,
        }
    }

    pub fn mode_duration(&self, mode: TimedMode) -> Option<u32> {
        self.mode_durations.get(&mode).copied()
    }

    pub fn filter_alarm(&self) -> bool {
        self.alarms.filter()
    }
}
