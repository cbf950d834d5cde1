use serde::Serialize;
use serde_json::{Map, Value};

pub const UNKNOWN: &str = "unknown";

/// One user-interaction record as received on `flowback.signal.raw`.
///
/// Never mutated after decoding; the session store only moves it around.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub session_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub payload: Map<String, Value>,
}

impl InteractionEvent {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            project_id: UNKNOWN.to_string(),
            timestamp: None,
            kind: Some("signal.raw".to_string()),
            payload: Map::new(),
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.payload
            .insert("action".to_string(), Value::String(action.to_string()));
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_payload(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Lowercased `payload.action`, falling back to the event type, then `"unknown"`.
    pub fn normalized_action(&self) -> String {
        self.payload_str("action")
            .or(self.kind.as_deref().filter(|k| !k.is_empty()))
            .unwrap_or(UNKNOWN)
            .to_lowercase()
    }

    pub fn dwell_ms(&self) -> Option<f64> {
        self.payload.get("dwellMs").and_then(Value::as_f64)
    }
}

/// A `flowback.feedback.recorded` record. Only logged, never buffered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    pub session_id: String,
    pub project_id: String,
    pub reaction: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}
