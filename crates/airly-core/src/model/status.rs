// ── Partial status updates ──
//
// Poll responses and push events both carry a loosely-shaped JSON status
// blob. `StatusUpdate` is the parsed, partial form: only fields present in
// the blob are `Some`, and only `Some` fields overwrite unit state.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use super::mode::{AirflowLevel, UserMode};
use super::unit::UnitState;

/// Fields parsed out of one status blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub mode: Option<UserMode>,
    pub airflow_level: Option<AirflowLevel>,
    pub temperature_current: Option<f64>,
    pub temperature_setpoint: Option<f64>,
    pub temperature_outdoor: Option<f64>,
    pub temperature_supply: Option<f64>,
    pub humidity: Option<f64>,
    pub air_quality: Option<i64>,
    /// Remaining seconds; `Some(0)` clears the countdown.
    pub mode_remaining_time: Option<u64>,
    pub active_functions: BTreeMap<String, bool>,
    pub alarms: BTreeMap<String, bool>,
    pub connected: Option<bool>,
    pub model: Option<String>,
    pub firmware_versions: BTreeMap<String, String>,
}

impl StatusUpdate {
    /// Parse whatever fields `blob` carries. Unknown keys are ignored.
    pub fn from_json(blob: &Value) -> Self {
        let temps = blob.get("temperatures");
        let nested = |key: &str| temps.and_then(|t| t.get(key)).and_then(number);

        let mut update = Self {
            mode: first(blob, &["mode", "userMode", "user_mode"]).and_then(UserMode::from_value),
            airflow_level: first(blob, &["airflow", "airflowLevel", "airflow_level", "fanSpeed"])
                .and_then(integer)
                .map(AirflowLevel::clamp),
            temperature_current: first(blob, &["temp", "temperature", "roomTemperature"])
                .and_then(number)
                .or_else(|| nested("rat")),
            temperature_setpoint: first(blob, &["setpoint", "temperatureSetpoint", "targetTemperature"])
                .and_then(number)
                .or_else(|| nested("setpoint")),
            temperature_outdoor: first(blob, &["outdoorTemp", "outdoorTemperature"])
                .and_then(number)
                .or_else(|| nested("oat")),
            temperature_supply: first(blob, &["supplyTemp", "supplyTemperature"])
                .and_then(number)
                .or_else(|| nested("sat")),
            humidity: first(blob, &["humidity", "rh"]).and_then(number),
            air_quality: first(blob, &["airQuality", "air_quality", "iaq"]).and_then(integer),
            mode_remaining_time: first(blob, &["modeRemainingTime", "remainingTime", "remaining_time"])
                .map(|v| integer(v).and_then(|n| u64::try_from(n).ok()).unwrap_or(0)),
            connected: first(blob, &["connected", "connectivity", "connectionStatus"])
                .and_then(connectivity),
            model: first(blob, &["model"])
                .and_then(Value::as_str)
                .map(str::to_owned),
            ..Self::default()
        };

        if let Some(funcs) = blob.get("activeFunctions").and_then(Value::as_object) {
            for (key, value) in funcs {
                if let Some(on) = boolean(value) {
                    update.active_functions.insert(normalize_function(key), on);
                }
            }
        }

        if let Some(alarms) = blob.get("alarms").and_then(Value::as_object) {
            for (key, value) in alarms {
                if let Some(on) = boolean(value) {
                    update.alarms.insert(to_snake(key), on);
                }
            }
        }
        if let Some(on) = blob.get("filterAlarm").and_then(boolean) {
            update.alarms.insert("filter".into(), on);
        }

        if let Some(versions) = blob.get("versions").and_then(Value::as_array) {
            for v in versions {
                if let (Some(kind), Some(version)) = (v["type"].as_str(), v["version"].as_str()) {
                    update
                        .firmware_versions
                        .insert(kind.to_owned(), version.to_owned());
                }
            }
        }

        update
    }

    /// Whether the blob carried nothing this crate understands.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the fields present in this update. Last write wins.
    pub fn apply_to(&self, unit: &mut UnitState) {
        if let Some(mode) = self.mode {
            unit.mode = mode;
        }
        if let Some(level) = self.airflow_level {
            unit.airflow_level = level;
        }
        overwrite(&mut unit.temperature_current, self.temperature_current);
        overwrite(&mut unit.temperature_setpoint, self.temperature_setpoint);
        overwrite(&mut unit.temperature_outdoor, self.temperature_outdoor);
        overwrite(&mut unit.temperature_supply, self.temperature_supply);
        overwrite(&mut unit.humidity, self.humidity);
        overwrite(&mut unit.air_quality, self.air_quality);
        overwrite(&mut unit.connected, self.connected);
        overwrite(&mut unit.model, self.model.clone());

        if let Some(secs) = self.mode_remaining_time {
            unit.mode_remaining_time = (secs > 0).then_some(secs);
        }
        for (name, on) in &self.active_functions {
            unit.active_functions.set(name, *on);
        }
        for (name, on) in &self.alarms {
            unit.alarms.set(name.clone(), *on);
        }
        for (kind, version) in &self.firmware_versions {
            unit.firmware_versions.insert(kind.clone(), version.clone());
        }

        unit.last_updated = Some(Utc::now());
    }
}

// ── JSON helpers ─────────────────────────────────────────────────────

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn first<'a>(blob: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| blob.get(*k))
        .find(|v| !v.is_null())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_to_i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn round_to_i64(f: f64) -> Option<i64> {
    let rounded = f.round();
    // Range-checked above, so the conversion is exact.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let n = rounded as i64;
    (rounded.is_finite() && rounded.abs() < 9.0e15).then_some(n)
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "active" => Some(true),
            "false" | "off" | "0" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn connectivity(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) => Some(matches!(
            s.to_ascii_lowercase().as_str(),
            "online" | "connected" | "true"
        )),
        other => boolean(other),
    }
}

/// `freeCooling` -> `free_cooling`, `ecoMode` -> `eco`.
fn normalize_function(key: &str) -> String {
    match to_snake(key).as_str() {
        "eco_mode" => "eco".into(),
        "defrost" => "defrosting".into(),
        other => other.to_owned(),
    }
}

fn to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '-' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_poll_blob() {
        let update = StatusUpdate::from_json(&json!({ "airflow": 3, "mode": "Manual" }));
        assert_eq!(update.airflow_level, Some(AirflowLevel::NORMAL));
        assert_eq!(update.mode, Some(UserMode::Manual));
        assert!(update.temperature_current.is_none());
    }

    #[test]
    fn parses_gateway_status_shape() {
        let update = StatusUpdate::from_json(&json!({
            "userMode": 5,
            "airflow": "4",
            "temperature": 21.0,
            "humidity": 40,
            "airQuality": 2,
            "modeRemainingTime": 3600,
            "connectivity": "ONLINE",
            "temperatures": { "oat": -3.5, "sat": 19.0, "setpoint": 22.0 },
            "activeFunctions": { "heating": true, "freeCooling": false, "ecoMode": true },
            "alarms": { "filter": true, "frost": false },
            "versions": [{ "type": "MB", "version": "1.2.3" }]
        }));

        assert_eq!(update.mode, Some(UserMode::Away));
        assert_eq!(update.airflow_level, Some(AirflowLevel::HIGH));
        assert_eq!(update.temperature_setpoint, Some(22.0));
        assert_eq!(update.temperature_outdoor, Some(-3.5));
        assert_eq!(update.connected, Some(true));
        assert_eq!(update.active_functions.get("eco"), Some(&true));
        assert_eq!(update.active_functions.get("free_cooling"), Some(&false));
        assert_eq!(update.alarms.get("filter"), Some(&true));
        assert_eq!(update.firmware_versions.get("MB").map(String::as_str), Some("1.2.3"));
    }

    #[test]
    fn airflow_out_of_range_is_clamped() {
        let update = StatusUpdate::from_json(&json!({ "airflow": 9 }));
        assert_eq!(update.airflow_level, Some(AirflowLevel::REFRESH));
        let update = StatusUpdate::from_json(&json!({ "airflow": 0 }));
        assert_eq!(update.airflow_level, Some(AirflowLevel::OFF));
    }

    #[test]
    fn apply_only_overwrites_present_fields() {
        let mut unit = UnitState::new("dev1", "Hall");
        unit.temperature_current = Some(20.0);
        unit.humidity = Some(35.0);

        StatusUpdate::from_json(&json!({ "temp": 21.5 })).apply_to(&mut unit);

        assert_eq!(unit.temperature_current, Some(21.5));
        assert_eq!(unit.humidity, Some(35.0));
        assert!(unit.last_updated.is_some());
    }

    #[test]
    fn zero_remaining_time_clears_countdown() {
        let mut unit = UnitState::new("dev1", "Hall");
        unit.mode_remaining_time = Some(600);
        StatusUpdate::from_json(&json!({ "remainingTime": 0 })).apply_to(&mut unit);
        assert_eq!(unit.mode_remaining_time, None);
    }

    #[test]
    fn empty_blob_is_empty_update() {
        assert!(StatusUpdate::from_json(&json!({ "unrelated": 1 })).is_empty());
        assert!(StatusUpdate::from_json(&json!(null)).is_empty());
    }
}
