//! Projection of analysis records onto the analytics store's HTTP API.

pub mod http;

pub use http::*;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::ForwardError,
    events::{AnalysisResult, SentimentResult, UNKNOWN},
};

pub const HOTSPOTS_ENDPOINT: &str = "/api/hotspots";
pub const SENTIMENT_ENDPOINT: &str = "/api/sentiment";
pub const DEFAULT_FRICTION_SCORE: f64 = 0.5;

#[async_trait]
pub trait AnalyticsSink: Send + Sync + 'static {
    /// One POST per call; implementations keep no per-request state.
    async fn forward(&self, payload: &ForwardedPayload) -> Result<(), ForwardError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ForwardedPayload {
    Hotspot(HotspotPayload),
    Sentiment(SentimentPayload),
}

impl ForwardedPayload {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ForwardedPayload::Hotspot(_) => HOTSPOTS_ENDPOINT,
            ForwardedPayload::Sentiment(_) => SENTIMENT_ENDPOINT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotMetrics {
    pub click_count: usize,
    pub rage_clicks: usize,
    pub hesitations: usize,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotPayload {
    pub project_id: String,
    pub page: String,
    pub metrics: HotspotMetrics,
    pub friction_score: f64,
    pub evidence: String,
    pub recommendation: String,
}

impl HotspotPayload {
    pub fn from_analysis(result: &AnalysisResult, default_project: &str) -> Self {
        let metrics = result.metrics.as_ref();

        let friction_score = match result.severity {
            Some(severity) => (severity / 10.0).clamp(0.0, 1.0),
            None => metrics.map_or(DEFAULT_FRICTION_SCORE, |m| m.friction_score),
        };

        Self {
            project_id: project_or_default(Some(&result.project_id), default_project),
            page: result.page.clone().unwrap_or_else(|| "/".to_string()),
            metrics: HotspotMetrics {
                click_count: metrics.map_or(0, |m| m.click_count),
                rage_clicks: metrics.map_or(0, |m| m.rapid_clicks),
                hesitations: metrics.map_or(0, |m| m.hesitations),
                avg_duration: metrics.map_or(0.0, |m| m.avg_dwell_ms),
            },
            friction_score,
            evidence: result
                .evidence
                .clone()
                .unwrap_or_else(|| result.summary.clone()),
            recommendation: result.recommendation.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentPayload {
    pub project_id: String,
    pub session_id: String,
    pub sentiment: String,
    pub score: f64,
    pub feedback: String,
}

impl SentimentPayload {
    pub fn from_result(result: &SentimentResult, default_project: &str) -> Self {
        Self {
            project_id: project_or_default(result.project_id.as_deref(), default_project),
            session_id: result.session_id.clone(),
            sentiment: result.sentiment.clone(),
            score: result.score,
            feedback: result.feedback.clone(),
        }
    }
}

fn project_or_default(project: Option<&str>, default_project: &str) -> String {
    match project {
        Some(p) if !p.is_empty() && p != UNKNOWN => p.to_string(),
        _ => default_project.to_string(),
    }
}
