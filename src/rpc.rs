//! Record-RPC boundary: `call(method, args)` against one endpoint.
//!
//! [`JsonRpcTransport`] speaks JSON-RPC 2.0 over HTTP POST to a contract
//! bridge that returns already-decoded values. Errors are classified from
//! HTTP status and JSON-RPC error codes first, and from the message text only
//! when neither says anything useful.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::{Classify, ErrorClass, TraceError};

/// Server error range used by Ethereum nodes for stale state, pruned tries, etc.
pub const SERVER_ERROR: i64 = -32000;
/// Request rejected by node-side limits.
pub const LIMIT_EXCEEDED: i64 = -32005;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Execution reverted (geth-style).
pub const EXECUTION_REVERTED: i64 = 3;

/// Message fragments that indicate a transient node-side condition.
const TRANSIENT_PATTERNS: &[&str] = &[
    "missing trie node",
    "internal json-rpc error",
    "header not found",
    "request timed out",
    "too many requests",
];

/// Message fragments meaning the contract reported the record as absent.
const ABSENCE_PATTERNS: &[&str] = &["not found", "does not exist", "not registered"];

/// Failure of a single record-RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response envelope: {0}")]
    Malformed(String),

    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl RpcError {
    /// Whether the remote reported that the requested record does not exist.
    pub fn is_absence(&self) -> bool {
        match self {
            RpcError::Remote { message, .. } => {
                let lower = message.to_lowercase();
                ABSENCE_PATTERNS.iter().any(|p| lower.contains(p))
            }
            _ => false,
        }
    }

    /// Map a permanent failure onto the caller-facing taxonomy.
    pub fn into_permanent(self, what: &str) -> TraceError {
        if self.is_absence() {
            TraceError::NotFound(format!("{what}: {self}"))
        } else {
            TraceError::PermanentRemote(format!("{what}: {self}"))
        }
    }
}

impl Classify for RpcError {
    fn class(&self) -> ErrorClass {
        match self {
            RpcError::Connect(_)
            | RpcError::Timeout(_)
            | RpcError::Transport(_)
            | RpcError::Malformed(_) => ErrorClass::TransientNetwork,
            RpcError::Status { status, .. } => classify_status(*status),
            RpcError::Remote { code, message } => classify_remote(*code, message),
        }
    }
}

fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 | 500..=599 => ErrorClass::TransientNetwork,
        _ => ErrorClass::Permanent,
    }
}

fn classify_remote(code: i64, message: &str) -> ErrorClass {
    match code {
        LIMIT_EXCEEDED => return ErrorClass::TransientNetwork,
        INTERNAL_ERROR => return ErrorClass::TransientProtocol,
        EXECUTION_REVERTED => return ErrorClass::Permanent,
        _ => {}
    }

    let lower = message.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::TransientProtocol;
    }
    if lower.contains("revert") || ABSENCE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::Permanent;
    }

    // The -32000 range with an unrecognised message is most often a node
    // hiccup rather than a contract decision.
    if (-32099..=SERVER_ERROR).contains(&code) {
        ErrorClass::TransientProtocol
    } else {
        ErrorClass::Permanent
    }
}

/// Opaque remote procedure call against a record endpoint.
pub trait RecordRpc: Send + Sync {
    fn call(
        &self,
        endpoint: &Endpoint,
        method: &str,
        args: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcTransport {
    client: Client,
}

impl JsonRpcTransport {
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

impl RecordRpc for JsonRpcTransport {
    async fn call(&self, endpoint: &Endpoint, method: &str, args: Value) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params: args,
            id: Uuid::new_v4().to_string(),
        };

        let response = self
            .client
            .post(endpoint.as_str())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(transport_error)?;
        parse_envelope(&body)
    }
}

/// Shared HTTP client setup. Timeouts are applied only when given.
pub(crate) fn http_client(
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
) -> Result<Client, TraceError> {
    let mut builder = Client::builder().user_agent(concat!("agritrace/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| TraceError::Config(format!("failed to build HTTP client: {e}")))
}

fn transport_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout(e.to_string())
    } else if e.is_connect() {
        RpcError::Connect(e.to_string())
    } else {
        RpcError::Transport(e.to_string())
    }
}

fn parse_envelope(body: &str) -> Result<Value, RpcError> {
    let envelope: JsonRpcResponse =
        serde_json::from_str(body).map_err(|e| RpcError::Malformed(e.to_string()))?;

    match (envelope.result, envelope.error) {
        (_, Some(error)) => Err(RpcError::Remote {
            code: error.code,
            message: error.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(RpcError::Malformed(
            "response has neither result nor error".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote(code: i64, message: &str) -> RpcError {
        RpcError::Remote {
            code,
            message: message.into(),
        }
    }

    #[test]
    fn network_failures_are_transient() {
        assert_eq!(RpcError::Connect("refused".into()).class(), ErrorClass::TransientNetwork);
        assert_eq!(RpcError::Timeout("10s".into()).class(), ErrorClass::TransientNetwork);
        assert_eq!(RpcError::Malformed("eof".into()).class(), ErrorClass::TransientNetwork);
    }

    #[test]
    fn status_classification() {
        for status in [408, 429, 500, 502, 503, 504] {
            let err = RpcError::Status { status, body: String::new() };
            assert_eq!(err.class(), ErrorClass::TransientNetwork, "status {status}");
        }
        for status in [400, 401, 403, 404] {
            let err = RpcError::Status { status, body: String::new() };
            assert_eq!(err.class(), ErrorClass::Permanent, "status {status}");
        }
    }

    #[test]
    fn remote_codes_take_precedence_over_message() {
        assert_eq!(remote(INTERNAL_ERROR, "product not found").class(), ErrorClass::TransientProtocol);
        assert_eq!(remote(LIMIT_EXCEEDED, "anything").class(), ErrorClass::TransientNetwork);
        assert_eq!(remote(EXECUTION_REVERTED, "execution reverted").class(), ErrorClass::Permanent);
    }

    #[test]
    fn remote_messages_fall_back_to_patterns() {
        assert_eq!(
            remote(SERVER_ERROR, "missing trie node 7a3f (path )").class(),
            ErrorClass::TransientProtocol
        );
        assert_eq!(
            remote(SERVER_ERROR, "execution reverted: Product not found").class(),
            ErrorClass::Permanent
        );
        assert_eq!(remote(SERVER_ERROR, "something odd").class(), ErrorClass::TransientProtocol);
        assert_eq!(remote(-1, "unauthorized").class(), ErrorClass::Permanent);
    }

    #[test]
    fn absence_maps_to_not_found() {
        let err = remote(EXECUTION_REVERTED, "execution reverted: Product not found");
        assert!(err.is_absence());
        assert!(matches!(err.into_permanent("getProduct"), TraceError::NotFound(_)));

        let err = remote(EXECUTION_REVERTED, "execution reverted: Only admin");
        assert!(!err.is_absence());
        assert!(matches!(err.into_permanent("verifyUser"), TraceError::PermanentRemote(_)));
    }

    #[test]
    fn envelope_parsing() {
        assert_eq!(
            parse_envelope(r#"{"jsonrpc":"2.0","id":"1","result":{"a":1}}"#).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            parse_envelope(r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32000,"message":"header not found"}}"#)
                .unwrap_err(),
            remote(SERVER_ERROR, "header not found")
        );
        assert!(matches!(parse_envelope("<html>"), Err(RpcError::Malformed(_))));
        assert!(matches!(
            parse_envelope(r#"{"jsonrpc":"2.0","id":"1"}"#),
            Err(RpcError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn posts_json_rpc_request_and_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "getProduct",
                "params": ["BATCH-001"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "x",
                "result": {"batchId": "BATCH-001"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            JsonRpcTransport::new(Some(Duration::from_secs(2)), None).unwrap();
        let endpoint = Endpoint::parse(&server.uri()).unwrap();
        let result = transport
            .call(&endpoint, "getProduct", json!(["BATCH-001"]))
            .await
            .unwrap();

        assert_eq!(result, json!({"batchId": "BATCH-001"}));
    }

    #[tokio::test]
    async fn server_errors_surface_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let transport =
            JsonRpcTransport::new(Some(Duration::from_secs(2)), None).unwrap();
        let endpoint = Endpoint::parse(&server.uri()).unwrap();
        let err = transport
            .call(&endpoint, "getProduct", json!(["BATCH-001"]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RpcError::Status {
                status: 503,
                body: "overloaded".into()
            }
        );
        assert_eq!(err.class(), ErrorClass::TransientNetwork);
    }
}
