//! HTTP client for the cluster API. Every call distinguishes transport
//! failure, non-success status and undecodable body, and honors a
//! caller-supplied cancellation token.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {path} returned status {status}")]
    Status { path: String, status: u16 },
    #[error("failed to decode the response from {path}: {detail}")]
    Decode { path: String, detail: String },
    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct EsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl EsClient {
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        Self::with_timeout(endpoint, Duration::from_secs(30))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ClientError::Transport {
                path: "/".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            endpoint: sanitize_endpoint(endpoint),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, sanitize_path(path))
    }

    async fn get(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = self.http.get(&url).send() => {
                response.map_err(|source| ClientError::Transport {
                    path: path.to_string(),
                    source,
                })?
            }
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    pub async fn fetch_text(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let response = self.get(path, cancel).await?;
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            body = response.text() => {
                body.map_err(|source| ClientError::Decode {
                    path: path.to_string(),
                    detail: source.to_string(),
                })?
            }
        };
        tracing::trace!(path, body = %body, "response body");
        Ok(body)
    }

    pub async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T, ClientError> {
        let body = self.fetch_text(path, cancel).await?;
        serde_json::from_str(&body).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            detail: source.to_string(),
        })
    }
}

fn sanitize_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

fn sanitize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}
