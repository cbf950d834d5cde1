use std::time::Duration;

use thiserror::Error;

/// Bytes of the offending message kept in a [`DecodeError`] preview.
pub const PREVIEW_LEN: usize = 64;

/// A message body that could not be turned into a record.
///
/// Carries only the length and a short lossy preview of the raw bytes so the
/// caller can log and drop the message without holding on to the payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("undecodable message ({len} bytes, preview {preview:?}): {reason}")]
pub struct DecodeError {
    pub len: usize,
    pub preview: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(raw: &[u8], reason: impl Into<String>) -> Self {
        let cut = raw.len().min(PREVIEW_LEN);
        Self {
            len: raw.len(),
            preview: String::from_utf8_lossy(&raw[..cut]).into_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to encode {record}: {source}")]
pub struct EncodeError {
    pub record: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("message bus at {url} unreachable: {reason}")]
    Bus { url: String, reason: String },

    #[error("connecting to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("analytics sink at {url} unreachable: {reason}")]
    Sink { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("bus connection closed")]
    Closed,

    #[error("publish to {topic} timed out after {after:?}")]
    Timeout { topic: String, after: Duration },

    #[error("publish to {topic} failed: {reason}")]
    Transport { topic: String, reason: String },

    #[error("publish to {topic} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        topic: String,
        attempts: u32,
        last_error: String,
    },
}

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} did not answer within {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Outcome of a single handler invocation that did not succeed.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
