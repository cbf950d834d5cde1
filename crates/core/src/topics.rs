//! Bus subjects exchanged between the ingest service, the bridge and the
//! analysis agents.

pub const SIGNAL_RAW: &str = "flowback.signal.raw";
pub const FEEDBACK_RECORDED: &str = "flowback.feedback.recorded";
pub const ANALYSIS_FRICTION: &str = "flowback.analysis.friction";
pub const ANALYSIS_SENTIMENT: &str = "flowback.analysis.sentiment";
