use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors surfaced by the read path to its callers.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Bad setup: empty endpoint list, unparseable URL, zero attempts.
    #[error("Config error: {0}")]
    Config(String),

    /// Bad caller input, rejected before any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The remote explicitly reported that the record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every attempt or endpoint failed.
    #[error(
        "Unavailable after {attempts} attempt(s) via [{}]: {last_error}",
        join_endpoints(.endpoints)
    )]
    Unavailable {
        attempts: u32,
        endpoints: Vec<Endpoint>,
        last_error: String,
    },

    /// The remote rejected the request for a business reason other than absence.
    #[error("Remote rejected request: {0}")]
    PermanentRemote(String),
}

impl TraceError {
    /// Readable message for the UI layer.
    pub fn hint(&self) -> &'static str {
        match self {
            TraceError::Config(_) => "Check agritrace.toml or the AGRITRACE_* environment variables.",
            TraceError::InvalidArgument(_) => "The identifier you entered is not well formed.",
            TraceError::NotFound(_) => "No record exists for that identifier.",
            TraceError::Unavailable { .. } => {
                "Network connection issue. Please try again or switch RPC endpoint."
            }
            TraceError::PermanentRemote(_) => "The contract rejected the request.",
        }
    }
}

fn join_endpoints(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(Endpoint::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a failed remote call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection refused, timeout, rate limit, server error, broken envelope.
    TransientNetwork,
    /// The node answered but reported a transient condition (stale state, internal error).
    TransientProtocol,
    /// Business-rule failure; retrying cannot help.
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorClass::Permanent)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::TransientNetwork => write!(f, "transient-network"),
            ErrorClass::TransientProtocol => write!(f, "transient-protocol"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors that can tell the retry loop whether they are worth retrying.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_display_lists_endpoints() {
        let err = TraceError::Unavailable {
            attempts: 3,
            endpoints: vec![
                Endpoint::parse("https://rpc-a.test/").unwrap(),
                Endpoint::parse("https://rpc-b.test/").unwrap(),
            ],
            last_error: "connection failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unavailable after 3 attempt(s) via [https://rpc-a.test/, https://rpc-b.test/]: connection failed"
        );
    }

    #[test]
    fn hints_are_kind_specific() {
        assert_eq!(
            TraceError::NotFound("BATCH-1".into()).hint(),
            "No record exists for that identifier."
        );
        assert!(
            TraceError::Unavailable {
                attempts: 1,
                endpoints: vec![],
                last_error: String::new(),
            }
            .hint()
            .starts_with("Network connection issue")
        );
    }

    #[test]
    fn error_class_transience() {
        assert!(ErrorClass::TransientNetwork.is_transient());
        assert!(ErrorClass::TransientProtocol.is_transient());
        assert!(!ErrorClass::Permanent.is_transient());
        assert_eq!(ErrorClass::TransientProtocol.to_string(), "transient-protocol");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TraceError>();
    }
}
