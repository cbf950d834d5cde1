//! JSON wire format for everything exchanged over the bus.
//!
//! Decoding never fails on missing optional fields; it substitutes the
//! documented defaults instead. Only bodies that are not a JSON object at all
//! produce a [`DecodeError`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{DecodeError, EncodeError},
    events::{
        AnalysisKind, AnalysisResult, FeedbackEvent, FrictionMetrics, InteractionEvent,
        SentimentResult, UNKNOWN,
    },
};

pub const DEFAULT_SENTIMENT: &str = "neutral";
pub const DEFAULT_SENTIMENT_SCORE: f64 = 0.5;

pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(record).map_err(|source| EncodeError {
        record: std::any::type_name::<T>(),
        source,
    })
}

pub fn decode_signal(raw: &[u8]) -> Result<InteractionEvent, DecodeError> {
    let map = parse_object(raw)?;

    Ok(InteractionEvent {
        session_id: string_field(&map, "sessionId").unwrap_or_else(|| UNKNOWN.to_string()),
        project_id: string_field(&map, "projectId").unwrap_or_else(|| UNKNOWN.to_string()),
        timestamp: map.get("timestamp").and_then(timestamp_ms),
        kind: string_field(&map, "type"),
        payload: object_field(&map, "payload"),
    })
}

pub fn decode_feedback(raw: &[u8]) -> Result<FeedbackEvent, DecodeError> {
    let map = parse_object(raw)?;
    let payload = object_field(&map, "payload");

    Ok(FeedbackEvent {
        session_id: string_field(&map, "sessionId").unwrap_or_else(|| UNKNOWN.to_string()),
        project_id: string_field(&map, "projectId").unwrap_or_else(|| UNKNOWN.to_string()),
        reaction: string_field(&payload, "reaction").unwrap_or_else(|| UNKNOWN.to_string()),
        comment: string_field(&payload, "comment")
            .or_else(|| string_field(&payload, "feedback"))
            .unwrap_or_default(),
        page: string_field(&payload, "page"),
    })
}

pub fn decode_friction(raw: &[u8]) -> Result<AnalysisResult, DecodeError> {
    let map = parse_object(raw)?;

    let page = map
        .get("location")
        .and_then(|l| l.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| string_field(&map, "page"));

    Ok(AnalysisResult {
        analysis_id: string_field(&map, "analysisId").and_then(|id| id.parse().ok()),
        session_id: string_field(&map, "sessionId").unwrap_or_else(|| UNKNOWN.to_string()),
        project_id: string_field(&map, "projectId").unwrap_or_else(|| UNKNOWN.to_string()),
        kind: AnalysisKind::Friction,
        produced_at: map.get("timestamp").and_then(produced_at),
        summary: text_field(&map, "analysis").unwrap_or_default(),
        page,
        metrics: map
            .get("metrics")
            .filter(|m| m.is_object())
            .and_then(|m| serde_json::from_value::<FrictionMetrics>(m.clone()).ok()),
        severity: map.get("severity").and_then(number),
        evidence: text_field(&map, "evidence"),
        recommendation: text_field(&map, "recommendation"),
    })
}

pub fn decode_sentiment(raw: &[u8]) -> Result<SentimentResult, DecodeError> {
    let map = parse_object(raw)?;

    Ok(SentimentResult {
        session_id: string_field(&map, "sessionId").unwrap_or_else(|| UNKNOWN.to_string()),
        project_id: string_field(&map, "projectId"),
        sentiment: string_field(&map, "sentiment")
            .unwrap_or_else(|| DEFAULT_SENTIMENT.to_string()),
        score: map
            .get("score")
            .and_then(number)
            .unwrap_or(DEFAULT_SENTIMENT_SCORE),
        feedback: text_field(&map, "feedback").unwrap_or_default(),
    })
}

fn parse_object(raw: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DecodeError::new(
            raw,
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
        Err(e) => Err(DecodeError::new(raw, e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Like [`string_field`] but renders non-string JSON values instead of dropping them.
fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn object_field(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.get(key) {
        Some(Value::Object(inner)) => inner.clone(),
        _ => Map::new(),
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn produced_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(_) => timestamp_ms(value).and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn signal_with_all_fields() {
        let raw = json!({
            "sessionId": "s_demo",
            "projectId": "demo",
            "timestamp": 1_700_000_000_000_i64,
            "type": "signal.raw",
            "payload": {"action": "click", "target": "#btn"}
        })
        .to_string();

        let event = decode_signal(raw.as_bytes()).unwrap();
        assert_eq!(event.session_id, "s_demo");
        assert_eq!(event.project_id, "demo");
        assert_eq!(event.timestamp, Some(1_700_000_000_000));
        assert_eq!(event.kind.as_deref(), Some("signal.raw"));
        assert_eq!(event.normalized_action(), "click");
        assert_eq!(event.payload_str("target"), Some("#btn"));
    }

    #[test]
    fn signal_missing_fields_get_defaults() {
        let event = decode_signal(br#"{"payload": {}}"#).unwrap();
        assert_eq!(event.session_id, UNKNOWN);
        assert_eq!(event.project_id, UNKNOWN);
        assert_eq!(event.timestamp, None);
        assert_eq!(event.normalized_action(), UNKNOWN);
    }

    #[test]
    fn signal_timestamp_accepts_numeric_strings_and_floats() {
        let event = decode_signal(br#"{"sessionId": "a", "timestamp": "1200"}"#).unwrap();
        assert_eq!(event.timestamp, Some(1200));

        let event = decode_signal(br#"{"sessionId": "a", "timestamp": 1200.9}"#).unwrap();
        assert_eq!(event.timestamp, Some(1200));

        let event = decode_signal(br#"{"sessionId": "a", "timestamp": "soon"}"#).unwrap();
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = decode_signal(b"not json at all").unwrap_err();
        assert_eq!(err.len, 15);
        assert_eq!(err.preview, "not json at all");
    }

    #[test]
    fn non_object_json_is_a_decode_error() {
        let err = decode_signal(b"[1, 2, 3]").unwrap_err();
        assert!(err.reason.contains("an array"));
    }

    #[test]
    fn feedback_comment_falls_back_to_feedback_field() {
        let fb = decode_feedback(br#"{"payload": {"reaction": "thumbs_down", "feedback": "slow"}}"#)
            .unwrap();
        assert_eq!(fb.session_id, UNKNOWN);
        assert_eq!(fb.reaction, "thumbs_down");
        assert_eq!(fb.comment, "slow");

        let fb = decode_feedback(br#"{"sessionId": "s1"}"#).unwrap();
        assert_eq!(fb.reaction, UNKNOWN);
        assert_eq!(fb.comment, "");
    }

    #[test]
    fn friction_record_survives_encode_and_decode() {
        let produced = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let metrics = FrictionMetrics {
            interactions: 5,
            click_count: 3,
            rapid_clicks: 2,
            friction_score: 0.12,
            ..FrictionMetrics::default()
        };
        let result = AnalysisResult::friction(
            "s_demo",
            "demo",
            produced,
            "Session has 5 interactions: 3 click".to_string(),
            metrics.clone(),
            Some("/checkout".to_string()),
        );

        let bytes = encode(&result).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire["type"], "friction.analysis");
        assert_eq!(wire["analysis"], "Session has 5 interactions: 3 click");
        assert_eq!(wire["metrics"]["rapidClicks"], 2);

        let decoded = decode_friction(&bytes).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn friction_record_from_agent_uses_location_and_naive_timestamp() {
        let raw = json!({
            "sessionId": "abc",
            "type": "friction.analysis",
            "timestamp": "2026-03-01T12:00:00.250000",
            "analysis": {"verdict": "rage"},
            "severity": 8,
            "location": {"url": "/pricing"}
        })
        .to_string();

        let decoded = decode_friction(raw.as_bytes()).unwrap();
        assert_eq!(decoded.page.as_deref(), Some("/pricing"));
        assert_eq!(decoded.severity, Some(8.0));
        assert_eq!(decoded.summary, r#"{"verdict":"rage"}"#);
        let expected =
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250);
        assert_eq!(decoded.produced_at, Some(expected));
        assert!(decoded.metrics.is_none());
    }

    #[test]
    fn sentiment_defaults() {
        let s = decode_sentiment(br#"{}"#).unwrap();
        assert_eq!(s.session_id, UNKNOWN);
        assert_eq!(s.sentiment, DEFAULT_SENTIMENT);
        assert_eq!(s.score, DEFAULT_SENTIMENT_SCORE);
        assert_eq!(s.feedback, "");

        let s = decode_sentiment(br#"{"sessionId": "x", "sentiment": "negative", "score": "0.2"}"#)
            .unwrap();
        assert_eq!(s.sentiment, "negative");
        assert_eq!(s.score, 0.2);
    }
}
