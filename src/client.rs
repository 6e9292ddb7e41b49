//! The read-path client: the only component callers use directly.
//!
//! Record reads go through [`RetryConfig::run`] against the RPC pool. Blob
//! reads try every gateway once, in rotation order, with no backoff; the
//! gateway that answers becomes the current one.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, EndpointPool};
use crate::error::TraceError;
use crate::format::{Record, RecordKind, format_record, is_absent, parse_bool, parse_integer};
use crate::gateway::{self, BlobGateway, ContentHash, HttpGateway};
use crate::retry::{RetryConfig, RetryError};
use crate::rpc::{JsonRpcTransport, RecordRpc};

/// Cheap call used to check that an RPC node answers.
pub const BLOCK_NUMBER_METHOD: &str = "eth_blockNumber";

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid"));

/// A product together with its full event trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductHistory {
    pub product: Record,
    pub events: Vec<Record>,
    pub retrieved_at: DateTime<Utc>,
}

/// A certification document and the metadata that points at it.
#[derive(Debug, Clone, PartialEq)]
pub struct Certification {
    pub metadata: Value,
    pub file: Vec<u8>,
    pub url: String,
}

/// Where one pool currently points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub current: Endpoint,
    pub current_index: usize,
    pub available: usize,
}

/// Current endpoints of both pools. Computed locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    pub rpc: PoolStatus,
    pub gateway: PoolStatus,
}

/// Outcome of a single liveness check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointHealth {
    pub endpoint: Endpoint,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointHealth {
    fn up(endpoint: Endpoint, block_number: Option<u64>) -> Self {
        Self {
            endpoint,
            healthy: true,
            block_number,
            error: None,
        }
    }

    fn down(endpoint: Endpoint, error: String) -> Self {
        tracing::warn!(endpoint = %endpoint, %error, "health check failed");
        Self {
            endpoint,
            healthy: false,
            block_number: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub rpc: EndpointHealth,
    pub gateway: EndpointHealth,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.rpc.healthy && self.gateway.healthy
    }
}

/// Resilient read access to the contract and the content network.
pub struct ReadClient<R = JsonRpcTransport, G = HttpGateway> {
    rpc: R,
    gateway: G,
    rpc_pool: Arc<EndpointPool>,
    gateway_pool: Arc<EndpointPool>,
    retry: RetryConfig,
}

impl ReadClient {
    /// Build a client with the HTTP transports.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TraceError> {
        let rpc = JsonRpcTransport::new(config.connect_timeout(), config.request_timeout())?;
        let gateway = HttpGateway::new(config.connect_timeout(), config.request_timeout())?;
        Self::new(config, rpc, gateway)
    }
}

impl<R: RecordRpc, G: BlobGateway> ReadClient<R, G> {
    pub fn new(config: &ClientConfig, rpc: R, gateway: G) -> Result<Self, TraceError> {
        config.validate()?;
        let rpc_pool = Arc::new(EndpointPool::parse(&config.rpc_endpoints)?);
        let gateway_pool = Arc::new(EndpointPool::parse(&config.gateway_endpoints)?);
        Self::with_pools(rpc, gateway, rpc_pool, gateway_pool, config.retry())
    }

    /// Build a client over existing pools, e.g. to share rotation state
    /// between clients of one session.
    pub fn with_pools(
        rpc: R,
        gateway: G,
        rpc_pool: Arc<EndpointPool>,
        gateway_pool: Arc<EndpointPool>,
        retry: RetryConfig,
    ) -> Result<Self, TraceError> {
        if retry.max_attempts == 0 {
            return Err(TraceError::Config("max_attempts must be at least 1".into()));
        }
        Ok(Self {
            rpc,
            gateway,
            rpc_pool,
            gateway_pool,
            retry,
        })
    }

    pub fn rpc_pool(&self) -> &Arc<EndpointPool> {
        &self.rpc_pool
    }

    pub fn gateway_pool(&self) -> &Arc<EndpointPool> {
        &self.gateway_pool
    }

    /// Product record for a batch id.
    pub async fn fetch_record(&self, id: &str) -> Result<Record, TraceError> {
        let batch_id = require_id("batch id", id)?;
        self.fetch_kind(RecordKind::Product, batch_id).await
    }

    pub async fn fetch_product_summary(&self, batch_id: &str) -> Result<Record, TraceError> {
        let batch_id = require_id("batch id", batch_id)?;
        self.fetch_kind(RecordKind::ProductSummary, batch_id).await
    }

    pub async fn fetch_user(&self, address: &str) -> Result<Record, TraceError> {
        let address = require_address(address)?;
        self.fetch_kind(RecordKind::User, address).await
    }

    pub async fn is_user_registered(&self, address: &str) -> Result<bool, TraceError> {
        let address = require_address(address)?;
        self.call_bool("isUserRegistered", address).await
    }

    pub async fn is_user_verified(&self, address: &str) -> Result<bool, TraceError> {
        let address = require_address(address)?;
        self.call_bool("isUserVerified", address).await
    }

    /// Events recorded for a batch, oldest first. No events is not an error.
    pub async fn fetch_events(&self, batch_id: &str) -> Result<Vec<Record>, TraceError> {
        let batch_id = require_id("batch id", batch_id)?;
        let method = RecordKind::Event.query_method();
        let raw = self.call(method, json!([batch_id])).await?;

        let events = match raw {
            Value::Array(items) => items
                .iter()
                .map(|item| format_record(RecordKind::Event, item))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(method, "expected a list of events; formatting reply as one event");
                vec![format_record(RecordKind::Event, &other)]
            }
        };
        Ok(events)
    }

    /// Product and events, fetched concurrently.
    pub async fn fetch_product_history(&self, batch_id: &str) -> Result<ProductHistory, TraceError> {
        let (product, events) =
            tokio::try_join!(self.fetch_record(batch_id), self.fetch_events(batch_id))?;
        Ok(ProductHistory {
            product,
            events,
            retrieved_at: Utc::now(),
        })
    }

    pub async fn fetch_batch_ids(&self) -> Result<Vec<String>, TraceError> {
        let method = "getAllBatchIds";
        let raw = self.call(method, json!([])).await?;
        serde_json::from_value(raw).map_err(|e| {
            TraceError::PermanentRemote(format!("{method}: unexpected reply shape: {e}"))
        })
    }

    pub async fn fetch_product_count(&self) -> Result<u64, TraceError> {
        let method = "getProductCount";
        let raw = self.call(method, json!([])).await?;
        parse_integer(&raw).ok_or_else(|| {
            TraceError::PermanentRemote(format!("{method}: expected an integer, got {raw}"))
        })
    }

    /// Raw bytes of a blob from the first gateway that serves it.
    pub async fn fetch_blob(&self, hash: &str) -> Result<Vec<u8>, TraceError> {
        let hash = ContentHash::parse(hash)?;
        self.fetch_content(&hash).await
    }

    /// A blob parsed as JSON.
    pub async fn fetch_json(&self, hash: &str) -> Result<Value, TraceError> {
        let hash = ContentHash::parse(hash)?;
        let bytes = self.fetch_content(&hash).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TraceError::PermanentRemote(format!("blob {hash} is not valid JSON: {e}")))
    }

    /// Certification metadata plus the document its `fileHash` names.
    pub async fn fetch_certification(&self, metadata_hash: &str) -> Result<Certification, TraceError> {
        let metadata = self.fetch_json(metadata_hash).await?;
        let file_hash = metadata
            .get("fileHash")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TraceError::PermanentRemote(format!(
                    "certification metadata {} has no fileHash",
                    metadata_hash.trim()
                ))
            })?;
        let file_hash = ContentHash::parse(file_hash).map_err(|e| {
            TraceError::PermanentRemote(format!("certification metadata names a bad file: {e}"))
        })?;

        let file = self.fetch_content(&file_hash).await?;
        let url = gateway::blob_url(&self.gateway_pool.current(), &file_hash);
        Ok(Certification {
            metadata,
            file,
            url,
        })
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            rpc: pool_status(&self.rpc_pool),
            gateway: pool_status(&self.gateway_pool),
        }
    }

    /// One request to the current RPC node and one HEAD to the current
    /// gateway, concurrently. No retries and no rotation.
    pub async fn health(&self) -> HealthReport {
        let (rpc, gateway) = tokio::join!(self.rpc_health(), self.gateway_health());
        HealthReport {
            rpc,
            gateway,
            checked_at: Utc::now(),
        }
    }

    /// Where `hash` lives on the current gateway. No network call.
    pub fn blob_url(&self, hash: &str) -> Result<String, TraceError> {
        let hash = ContentHash::parse(hash)?;
        Ok(gateway::blob_url(&self.gateway_pool.current(), &hash))
    }

    async fn fetch_kind(&self, kind: RecordKind, id: &str) -> Result<Record, TraceError> {
        let raw = self.call(kind.query_method(), json!([id])).await?;
        if is_absent(kind, &raw) {
            return Err(TraceError::NotFound(format!(
                "{} reported no record for '{id}'",
                kind.query_method()
            )));
        }
        Ok(format_record(kind, &raw))
    }

    async fn rpc_health(&self) -> EndpointHealth {
        let endpoint = self.rpc_pool.current();
        match self.rpc.call(&endpoint, BLOCK_NUMBER_METHOD, json!([])).await {
            Ok(raw) => match parse_integer(&raw) {
                Some(block) => EndpointHealth::up(endpoint, Some(block)),
                None => EndpointHealth::down(endpoint, format!("unexpected block number {raw}")),
            },
            Err(error) => EndpointHealth::down(endpoint, error.to_string()),
        }
    }

    async fn gateway_health(&self) -> EndpointHealth {
        let endpoint = self.gateway_pool.current();
        match self.gateway.probe(&endpoint, &ContentHash::probe()).await {
            Ok(()) => EndpointHealth::up(endpoint, None),
            Err(error) => EndpointHealth::down(endpoint, error.to_string()),
        }
    }

    async fn call_bool(&self, method: &str, address: &str) -> Result<bool, TraceError> {
        let raw = self.call(method, json!([address])).await?;
        parse_bool(&raw).ok_or_else(|| {
            TraceError::PermanentRemote(format!("{method}: expected a boolean, got {raw}"))
        })
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, TraceError> {
        let result = self
            .retry
            .run(&self.rpc_pool, |endpoint| {
                let args = args.clone();
                async move { self.rpc.call(&endpoint, method, args).await }
            })
            .await;

        result.map_err(|e| match e {
            RetryError::Permanent { error, .. } => error.into_permanent(method),
            RetryError::Exhausted {
                error,
                attempts,
                endpoints,
            } => TraceError::Unavailable {
                attempts,
                endpoints,
                last_error: error.to_string(),
            },
        })
    }

    async fn fetch_content(&self, hash: &ContentHash) -> Result<Vec<u8>, TraceError> {
        let mut tried = Vec::with_capacity(self.gateway_pool.len());
        let mut failures = Vec::with_capacity(self.gateway_pool.len());

        for (index, endpoint) in self.gateway_pool.rotation() {
            match self.gateway.fetch(&endpoint, hash).await {
                Ok(bytes) => {
                    tracing::debug!(gateway = %endpoint, %hash, len = bytes.len(), "blob fetched");
                    self.gateway_pool.select(index);
                    return Ok(bytes);
                }
                Err(error) => {
                    tracing::warn!(gateway = %endpoint, %hash, %error, "gateway failed");
                    failures.push(format!("{endpoint}: {error}"));
                    tried.push(endpoint);
                }
            }
        }

        Err(TraceError::Unavailable {
            attempts: u32::try_from(tried.len()).unwrap_or(u32::MAX),
            endpoints: tried,
            last_error: failures.join("; "),
        })
    }
}

/// Rejects blank ids. The id itself is sent as given.
fn require_id<'a>(what: &str, id: &'a str) -> Result<&'a str, TraceError> {
    if id.trim().is_empty() {
        return Err(TraceError::InvalidArgument(format!("{what} is required")));
    }
    Ok(id)
}

fn require_address(address: &str) -> Result<&str, TraceError> {
    let address = address.trim();
    if !ADDRESS.is_match(address) {
        return Err(TraceError::InvalidArgument(format!(
            "'{address}' is not a 0x-prefixed 20-byte address"
        )));
    }
    Ok(address)
}

fn pool_status(pool: &EndpointPool) -> PoolStatus {
    let current_index = pool.current_index();
    PoolStatus {
        current: pool.endpoints()[current_index].clone(),
        current_index,
        available: pool.len(),
    }
}
