//! Blob-gateway boundary: `GET <base><hash>` against one content gateway.

use std::fmt;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use thiserror::Error;

use crate::endpoint::Endpoint;
use crate::error::TraceError;
use crate::rpc::http_client;

static CONTENT_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Qm[1-9A-HJ-NP-Za-km-z]{44}|bafy[a-z0-9]{50,})$")
        .expect("content hash pattern is valid")
});

/// A content identifier that passed the shape check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Accepts CIDv0 (`Qm…`, base58) and CIDv1 (`bafy…`, base32), in any
    /// letter case. The gateway decides whether the content exists.
    pub fn parse(raw: &str) -> Result<Self, TraceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TraceError::InvalidArgument("content hash is required".into()));
        }
        if !CONTENT_HASH.is_match(trimmed) {
            return Err(TraceError::InvalidArgument(format!(
                "'{trimmed}' is not a valid content hash"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The well-known blob used for gateway health checks.
    pub fn probe() -> Self {
        Self(PROBE_HASH.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<base><hash>`, inserting a `/` when the base lacks one.
pub fn blob_url(endpoint: &Endpoint, hash: &ContentHash) -> String {
    let base = endpoint.as_str();
    if base.ends_with('/') {
        format!("{base}{hash}")
    } else {
        format!("{base}/{hash}")
    }
}

/// Failure of one gateway to serve one blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),
}

/// Well-known blob used to check that a gateway answers.
pub const PROBE_HASH: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

/// Fetches a blob from a single gateway.
pub trait BlobGateway: Send + Sync {
    fn fetch(
        &self,
        endpoint: &Endpoint,
        hash: &ContentHash,
    ) -> impl Future<Output = Result<Vec<u8>, GatewayError>> + Send;

    /// Check that `hash` is reachable without downloading it.
    fn probe(
        &self,
        endpoint: &Endpoint,
        hash: &ContentHash,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Plain HTTP gateway client.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
}

impl HttpGateway {
    pub fn new(
        connect_timeout: Option<Duration>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TraceError> {
        let client = http_client(connect_timeout, request_timeout)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl BlobGateway for HttpGateway {
    async fn fetch(&self, endpoint: &Endpoint, hash: &ContentHash) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get(blob_url(endpoint, hash))
            .header("accept", "*/*")
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn probe(&self, endpoint: &Endpoint, hash: &ContentHash) -> Result<(), GatewayError> {
        let response = self
            .client
            .head(blob_url(endpoint, hash))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(())
    }
}
