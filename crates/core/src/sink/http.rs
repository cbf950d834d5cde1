use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::{ConnectError, ForwardError},
    sink::{AnalyticsSink, ForwardedPayload},
};

/// Analytics store reached over HTTP. The inner client is pooled and shared;
/// each `forward` builds its own request.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Sink {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Any HTTP answer proves the store is reachable; only transport
    /// failures count.
    pub async fn probe(&self) -> Result<(), ConnectError> {
        match self.client.get(format!("{}/", self.base_url)).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "analytics store reachable");
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(ConnectError::Timeout {
                url: self.base_url.clone(),
                after: self.timeout,
            }),
            Err(e) => Err(ConnectError::Sink {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl AnalyticsSink for HttpSink {
    async fn forward(&self, payload: &ForwardedPayload) -> Result<(), ForwardError> {
        let endpoint = format!("{}{}", self.base_url, payload.endpoint());

        let response = self
            .client
            .post(&endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    ForwardError::Timeout {
                        endpoint: endpoint.clone(),
                        after: self.timeout,
                    }
                } else {
                    ForwardError::Transport {
                        endpoint: endpoint.clone(),
                        source,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
