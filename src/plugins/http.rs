//! Shared HTTP plumbing for the network plugins.
//!
//! Every request runs under the plugin's own timeout, separate from the
//! gateway's dispatch deadline. Failures are classified so plugins can answer
//! the node with a short, specific message instead of failing the dispatch.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl HttpError {
    /// Short text suitable for a radio reply.
    pub fn user_message(&self, service: &str) -> String {
        match self {
            HttpError::Connect(_) => format!("Cannot connect to {}.", service),
            HttpError::Timeout(_) => format!("{} request timed out.", service),
            HttpError::Status(404) => "Not found.".to_string(),
            HttpError::Status(code) => format!("{} error (HTTP {}).", service, code),
            HttpError::Decode(_) | HttpError::Request(_) => format!("{} error. Try again later.", service),
        }
    }

    fn from_reqwest(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            HttpError::Timeout(timeout_secs)
        } else if e.is_connect() {
            HttpError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            HttpError::Status(status.as_u16())
        } else {
            HttpError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("meshgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, HttpError> {
        debug!("GET {}", url);
        self.execute(self.client.get(url).query(query)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T, HttpError> {
        debug!("POST {}", url);
        self.execute(self.client.post(url).json(body)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, HttpError> {
        let secs = self.timeout.as_secs();
        let response = timeout(self.timeout, request.send())
            .await
            .map_err(|_| HttpError::Timeout(secs))?
            .map_err(|e| HttpError::from_reqwest(e, secs))?;

        if !response.status().is_success() {
            return Err(HttpError::Status(response.status().as_u16()));
        }

        timeout(self.timeout, response.json::<T>())
            .await
            .map_err(|_| HttpError::Timeout(secs))?
            .map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_short() {
        assert_eq!(
            HttpError::Connect("refused".into()).user_message("Ollama"),
            "Cannot connect to Ollama."
        );
        assert_eq!(
            HttpError::Timeout(10).user_message("Weather"),
            "Weather request timed out."
        );
        assert_eq!(HttpError::Status(503).user_message("Wikipedia"), "Wikipedia error (HTTP 503).");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connect_or_timeout_error() {
        let client = HttpClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .get_json::<serde_json::Value>("http://127.0.0.1:9/", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Connect(_) | HttpError::Timeout(_) | HttpError::Request(_)));
    }
}
