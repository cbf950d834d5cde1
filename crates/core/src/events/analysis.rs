use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisKind {
    #[serde(rename = "friction.analysis")]
    Friction,
    #[serde(rename = "sentiment.analysis")]
    Sentiment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCount {
    pub action: String,
    pub count: usize,
}

/// Structured counterpart of the textual summary, for downstream consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrictionMetrics {
    pub interactions: usize,
    /// Histogram in first-seen order.
    pub actions: Vec<ActionCount>,
    pub click_count: usize,
    pub rapid_clicks: usize,
    pub hesitations: usize,
    pub backtracks: usize,
    pub avg_dwell_ms: f64,
    pub friction_score: f64,
}

/// Analysis record published on `flowback.analysis.friction`.
///
/// Upstream analysis agents may attach `severity`, `evidence` and
/// `recommendation`; records produced by the bridge itself carry `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<Uuid>,
    pub session_id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub produced_at: Option<DateTime<Utc>>,
    #[serde(rename = "analysis")]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FrictionMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl AnalysisResult {
    pub fn friction(
        session_id: impl Into<String>,
        project_id: impl Into<String>,
        produced_at: DateTime<Utc>,
        summary: String,
        metrics: FrictionMetrics,
        page: Option<String>,
    ) -> Self {
        Self {
            analysis_id: Some(Uuid::new_v4()),
            session_id: session_id.into(),
            project_id: project_id.into(),
            kind: AnalysisKind::Friction,
            produced_at: Some(produced_at),
            summary,
            page,
            metrics: Some(metrics),
            severity: None,
            evidence: None,
            recommendation: None,
        }
    }
}

/// Record received on `flowback.analysis.sentiment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub sentiment: String,
    pub score: f64,
    pub feedback: String,
}
