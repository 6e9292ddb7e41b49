//! Resilient read path for the AgriTrace produce-traceability network.
//!
//! Records live behind a JSON-RPC contract interface served by several
//! interchangeable nodes; documents live on content-addressed storage served
//! by several gateways. [`ReadClient`] hides transient failures of either
//! behind endpoint rotation and exponential backoff, and normalizes raw
//! contract replies into typed [`Record`]s.

pub mod cli;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod format;
pub mod gateway;
pub mod retry;
pub mod rpc;
pub mod ui;

pub use client::{
    Certification, ClientStatus, EndpointHealth, HealthReport, PoolStatus, ProductHistory, ReadClient,
};
pub use config::ClientConfig;
pub use endpoint::{Endpoint, EndpointPool};
pub use error::TraceError;
pub use format::{FieldValue, Record, RecordKind};
pub use gateway::ContentHash;
pub use retry::RetryConfig;
