//! Region health probes.
//!
//! # Responsibilities
//! - Issue one bounded-timeout GET against a region's health URL
//! - Classify the outcome: healthy iff the response status is exactly 200
//!
//! Probe failures are data. Callers fold them into `is_healthy = false`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time;

#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("invalid health check url '{0}'")]
    InvalidUrl(String),

    #[error("connection error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status {0}")]
    Status(u16),
}

/// Health-probe transport.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeFailure>;
}

/// HTTP GET probe.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("resilience-plane-health-check")
            .connect_timeout(timeout)
            // A redirect is not a 200.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str) -> Result<(), ProbeFailure> {
        let url = url::Url::parse(url).map_err(|_| ProbeFailure::InvalidUrl(url.to_string()))?;

        match time::timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => Ok(()),
            Ok(Ok(response)) => Err(ProbeFailure::Status(response.status().as_u16())),
            Ok(Err(e)) => Err(ProbeFailure::Transport(e.to_string())),
            Err(_) => Err(ProbeFailure::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_a_failure() {
        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        let err = probe.probe("not a url").await.unwrap_err();
        assert!(matches!(err, ProbeFailure::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        let err = probe
            .probe(&format!("http://{}/health", addr))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProbeFailure::Transport(_) | ProbeFailure::Timeout(_)
        ));
    }
}
