use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// The kind of an inbound or outbound envelope.
///
/// Every `type` string the backend emits maps to a variant here, so new
/// message kinds are a compile-time-visible extension. Anything the crate
/// does not recognize lands in [`EventKind::Unknown`] and is still routed
/// to catch-all subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pipeline status snapshot
    Status,
    /// Incremental progress for the running step
    ProgressUpdate,
    /// The pipeline moved to a different step
    StepChange,
    /// Chapter list changed
    ChapterUpdate,
    /// Processing history changed
    HistoryUpdate,
    /// A batch operation started or finished
    BatchOperation,
    /// Backend-reported error
    Error,
    /// Selection statistics recomputed
    SelectionStats,
    /// A `type` string this crate does not recognize
    Unknown(String),
}

impl EventKind {
    /// The wire string for this kind
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Status => "status",
            EventKind::ProgressUpdate => "progress_update",
            EventKind::StepChange => "step_change",
            EventKind::ChapterUpdate => "chapter_update",
            EventKind::HistoryUpdate => "history_update",
            EventKind::BatchOperation => "batch_operation",
            EventKind::Error => "error",
            EventKind::SelectionStats => "selection_stats",
            EventKind::Unknown(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "status" => EventKind::Status,
            "progress_update" => EventKind::ProgressUpdate,
            "step_change" => EventKind::StepChange,
            "chapter_update" => EventKind::ChapterUpdate,
            "history_update" => EventKind::HistoryUpdate,
            "batch_operation" => EventKind::BatchOperation,
            "error" => EventKind::Error,
            "selection_stats" => EventKind::SelectionStats,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventKind::from(raw.as_str()))
    }
}

/// Wire message shape exchanged over the connection: `{"type": .., "data": ..}`.
///
/// The crate routes envelopes by `type` and never interprets `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Selects which event subscribers are told about
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Opaque payload; defaults to JSON null when absent
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self { kind, data }
    }
}

/// Outbound message accepted by `send()`: either a preformatted text frame
/// or a structured envelope serialized to the wire format before sending.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Sent as-is
    Text(String),
    /// Serialized to `{"type": .., "data": ..}` JSON
    Envelope(Envelope),
}

impl Outbound {
    pub(crate) fn into_text(self) -> serde_json::Result<String> {
        match self {
            Outbound::Text(text) => Ok(text),
            Outbound::Envelope(envelope) => serde_json::to_string(&envelope),
        }
    }
}

impl From<String> for Outbound {
    fn from(value: String) -> Self {
        Outbound::Text(value)
    }
}

impl From<&str> for Outbound {
    fn from(value: &str) -> Self {
        Outbound::Text(value.to_string())
    }
}

impl From<Envelope> for Outbound {
    fn from(value: Envelope) -> Self {
        Outbound::Envelope(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_kind() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"progress_update","data":{"pct":42}}"#).unwrap();
        assert_eq!(envelope.kind, EventKind::ProgressUpdate);
        assert_eq!(envelope.data, json!({"pct": 42}));
    }

    #[test]
    fn test_decode_unknown_kind_is_preserved() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"mystery","data":1}"#).unwrap();
        assert_eq!(envelope.kind, EventKind::Unknown("mystery".to_string()));
        assert_eq!(envelope.kind.as_str(), "mystery");
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"status"}"#).unwrap();
        assert_eq!(envelope.kind, EventKind::Status);
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let result = serde_json::from_str::<Envelope>(r#"{"data":{"pct":42}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_serializes_with_wire_field_names() {
        let text = serde_json::to_string(&Envelope::new(
            EventKind::ChapterUpdate,
            json!({"count": 3}),
        ))
        .unwrap();
        assert_eq!(text, r#"{"type":"chapter_update","data":{"count":3}}"#);
    }

    #[test]
    fn test_all_wire_strings_round_trip() {
        for name in [
            "status",
            "progress_update",
            "step_change",
            "chapter_update",
            "history_update",
            "batch_operation",
            "error",
            "selection_stats",
        ] {
            let kind = EventKind::from(name);
            assert!(!matches!(kind, EventKind::Unknown(_)), "{name}");
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_outbound_conversions() {
        let raw = Outbound::from("ping").into_text().unwrap();
        assert_eq!(raw, "ping");

        let structured = Outbound::from(Envelope::new(EventKind::Status, Value::Null))
            .into_text()
            .unwrap();
        assert_eq!(structured, r#"{"type":"status","data":null}"#);
    }
}
