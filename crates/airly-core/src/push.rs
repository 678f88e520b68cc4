// ── Push message routing ──
//
// Two envelopes carry unit status over the push channel:
//   structured: { "type": "SYSTEM_EVENT", "action": "DEVICE_STATUS_UPDATE",
//                 "properties": { "id": "<unit>", ...status } }
//   flat:       { "identifier": "<unit>", ...status }

use serde_json::Value;

use crate::model::StatusUpdate;

const SYSTEM_EVENT: &str = "SYSTEM_EVENT";
const DEVICE_STATUS_UPDATE: &str = "DEVICE_STATUS_UPDATE";

/// Where an inbound push message should go.
#[derive(Debug, Clone, PartialEq)]
pub enum PushRoute {
    /// A status update for a registered unit.
    Unit { id: String, update: StatusUpdate },
    /// Recognized envelope, but the id is not a registered unit.
    Unknown { id: String },
    /// Not a status message.
    Ignored,
}

/// Classify `message` against the set of registered unit ids.
pub fn route_push(message: &Value, is_known: impl Fn(&str) -> bool) -> PushRoute {
    let (id, payload) = if is_status_event(message) {
        let properties = message.get("properties").unwrap_or(&Value::Null);
        match properties.get("id").and_then(Value::as_str) {
            Some(id) => (id, status_payload(properties)),
            None => return PushRoute::Ignored,
        }
    } else if let Some(id) = message.get("identifier").and_then(Value::as_str) {
        (id, status_payload(message))
    } else {
        return PushRoute::Ignored;
    };

    if is_known(id) {
        PushRoute::Unit {
            id: id.to_owned(),
            update: StatusUpdate::from_json(payload),
        }
    } else {
        PushRoute::Unknown { id: id.to_owned() }
    }
}

fn is_status_event(message: &Value) -> bool {
    message.get("action").and_then(Value::as_str) == Some(DEVICE_STATUS_UPDATE)
        && message.get("type").and_then(Value::as_str) == Some(SYSTEM_EVENT)
}

/// Some senders nest the status one level down under `data` or `status`.
fn status_payload(container: &Value) -> &Value {
    ["data", "status"]
        .iter()
        .filter_map(|k| container.get(*k))
        .find(|v| v.is_object())
        .unwrap_or(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known(id: &str) -> bool {
        id == "dev1"
    }

    #[test]
    fn structured_event_routes_to_unit() {
        let route = route_push(
            &json!({
                "type": "SYSTEM_EVENT",
                "action": "DEVICE_STATUS_UPDATE",
                "properties": { "id": "dev1", "temp": 21.5 }
            }),
            known,
        );
        let PushRoute::Unit { id, update } = route else {
            panic!("expected unit route, got {route:?}");
        };
        assert_eq!(id, "dev1");
        assert_eq!(update.temperature_current, Some(21.5));
    }

    #[test]
    fn flat_message_routes_to_unit() {
        let route = route_push(&json!({ "identifier": "dev1", "airflow": 4 }), known);
        assert!(matches!(route, PushRoute::Unit { ref id, .. } if id == "dev1"));
    }

    #[test]
    fn nested_data_payload_is_unwrapped() {
        let route = route_push(
            &json!({ "identifier": "dev1", "data": { "humidity": 44 } }),
            known,
        );
        let PushRoute::Unit { update, .. } = route else {
            panic!("expected unit route");
        };
        assert_eq!(update.humidity, Some(44.0));
    }

    #[test]
    fn unknown_unit_is_reported() {
        let route = route_push(
            &json!({
                "type": "SYSTEM_EVENT",
                "action": "DEVICE_STATUS_UPDATE",
                "properties": { "id": "other", "temp": 19.0 }
            }),
            known,
        );
        assert_eq!(route, PushRoute::Unknown { id: "other".into() });
    }

    #[test]
    fn other_messages_are_ignored() {
        assert_eq!(route_push(&json!({ "type": "PING" }), known), PushRoute::Ignored);
        assert_eq!(
            route_push(
                &json!({ "type": "SYSTEM_EVENT", "action": "ALARM", "properties": { "id": "dev1" } }),
                known
            ),
            PushRoute::Ignored
        );
    }
}
