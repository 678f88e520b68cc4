// ── Device list extraction ──
//
// The account-devices response has been seen in two envelopes:
//   { "data": { "GetAccountDevices": [ ... ] } }
//   { "data": { "account": { "devices": [ ... ] } } }
// Anything else is treated as zero devices.

use serde_json::Value;
use tracing::{debug, error, warn};

/// A device as listed by the account, before any status fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: String,
    pub name: String,
}

/// Pull the device list out of a raw account-devices response.
///
/// Entries lacking an id (`identifier` or `id`) or a name are skipped.
pub fn extract_devices(response: &Value) -> Vec<DiscoveredDevice> {
    if let Some(errors) = response.get("errors") {
        error!(%errors, "device listing returned errors");
    }

    let data = response.get("data").unwrap_or(&Value::Null);
    let list = if let Some(list) = data.get("GetAccountDevices") {
        debug!("devices found under data.GetAccountDevices");
        list
    } else if let Some(list) = data.get("account").and_then(|a| a.get("devices")) {
        debug!("devices found under data.account.devices");
        list
    } else {
        let keys: Vec<&str> = data
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        warn!(?keys, "unrecognized device listing shape, treating as empty");
        return Vec::new();
    };

    let Some(entries) = list.as_array() else {
        warn!("device listing is not an array, treating as empty");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|device| {
            let id = string_field(device, "identifier").or_else(|| string_field(device, "id"));
            let name = string_field(device, "name");
            match (id, name) {
                (Some(id), Some(name)) => Some(DiscoveredDevice { id, name }),
                _ => {
                    warn!(%device, "skipping device without id or name");
                    None
                }
            }
        })
        .collect()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_list_shape() {
        let devices = extract_devices(&json!({
            "data": { "GetAccountDevices": [
                { "identifier": "IAM_1", "name": "Hall" },
                { "id": "IAM_2", "name": "Attic" }
            ]}
        }));
        assert_eq!(
            devices,
            vec![
                DiscoveredDevice { id: "IAM_1".into(), name: "Hall".into() },
                DiscoveredDevice { id: "IAM_2".into(), name: "Attic".into() },
            ]
        );
    }

    #[test]
    fn nested_account_shape() {
        let devices = extract_devices(&json!({
            "data": { "account": { "devices": [{ "id": "dev1", "name": "Hall" }] } }
        }));
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "dev1");
    }

    #[test]
    fn identifier_wins_over_id() {
        let devices = extract_devices(&json!({
            "data": { "GetAccountDevices": [{ "identifier": "A", "id": "B", "name": "x" }] }
        }));
        assert_eq!(devices[0].id, "A");
    }

    #[test]
    fn unknown_shape_is_zero_devices() {
        assert!(extract_devices(&json!({ "data": { "somethingElse": [] } })).is_empty());
        assert!(extract_devices(&json!({})).is_empty());
        assert!(extract_devices(&json!({ "data": { "GetAccountDevices": null } })).is_empty());
    }

    #[test]
    fn incomplete_entries_are_skipped() {
        let devices = extract_devices(&json!({
            "data": { "GetAccountDevices": [
                { "identifier": "A" },
                { "name": "nameless" },
                { "identifier": "B", "name": "Kept" }
            ]}
        }));
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Kept");
    }
}
