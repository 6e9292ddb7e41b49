//! Ordered pools of interchangeable endpoints (RPC nodes or storage gateways).
//!
//! A pool holds a non-empty list of endpoints plus a "current" pointer. The
//! pointer is the only mutable state and is shared by every caller holding
//! the pool, so rotations by concurrent requests interleave round-robin.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::Url;
use serde::Serialize;

use crate::error::TraceError;

/// An absolute `http`/`https` URL. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, TraceError> {
        let raw = raw.trim();
        let url = Url::parse(raw)
            .map_err(|e| TraceError::Config(format!("invalid endpoint '{raw}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TraceError::Config(format!(
                "invalid endpoint '{raw}': must start with http:// or https://"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty, ordered endpoint list with a circular "current" pointer.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    current: AtomicUsize,
}

impl EndpointPool {
    /// Build a pool; the first endpoint is the primary.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, TraceError> {
        if endpoints.is_empty() {
            return Err(TraceError::Config("endpoint list must not be empty".into()));
        }
        Ok(Self {
            endpoints,
            current: AtomicUsize::new(0),
        })
    }

    /// Parse every URL and build a pool from them.
    pub fn parse<I, S>(urls: I) -> Result<Self, TraceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = urls
            .into_iter()
            .map(|url| Endpoint::parse(url.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints)
    }

    pub fn current(&self) -> Endpoint {
        self.endpoints[self.current_index()].clone()
    }

    /// Move to the next endpoint (wrapping) and return it.
    pub fn advance(&self) -> Endpoint {
        let len = self.endpoints.len();
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        self.endpoints[(previous + 1) % len].clone()
    }

    /// Every endpoint exactly once, starting at the current one.
    pub fn rotation(&self) -> Vec<(usize, Endpoint)> {
        let len = self.endpoints.len();
        let start = self.current_index();
        (0..len)
            .map(|offset| {
                let index = (start + offset) % len;
                (index, self.endpoints[index].clone())
            })
            .collect()
    }

    /// Make the endpoint at `index` current. Out-of-range indexes wrap.
    pub fn select(&self, index: usize) {
        self.current
            .store(index % self.endpoints.len(), Ordering::Release);
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> EndpointPool {
        EndpointPool::parse(["http://a.test/", "http://b.test/", "http://c.test/"]).unwrap()
    }

    #[test]
    fn empty_pool_is_config_error() {
        let err = EndpointPool::new(vec![]).unwrap_err();
        assert!(matches!(err, TraceError::Config(_)));
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(matches!(
            Endpoint::parse("ftp://files.test/"),
            Err(TraceError::Config(_))
        ));
        assert!(matches!(
            Endpoint::parse("127.0.0.1:8545"),
            Err(TraceError::Config(_))
        ));
        assert_eq!(
            Endpoint::parse("  https://ipfs.io/ipfs/ ").unwrap().as_str(),
            "https://ipfs.io/ipfs/"
        );
    }

    #[test]
    fn advance_twice_then_wraps() {
        let pool = abc();
        assert_eq!(pool.current().as_str(), "http://a.test/");

        pool.advance();
        let second = pool.advance();
        assert_eq!(second.as_str(), "http://c.test/");
        assert_eq!(pool.current().as_str(), "http://c.test/");

        assert_eq!(pool.advance().as_str(), "http://a.test/");
        assert_eq!(pool.current().as_str(), "http://a.test/");
    }

    #[test]
    fn advance_len_times_is_cyclic() {
        for len in 1..=6 {
            let urls: Vec<String> = (0..len).map(|i| format!("http://node-{i}.test/")).collect();
            let pool = EndpointPool::parse(&urls).unwrap();
            pool.advance();
            let start = pool.current();
            for _ in 0..len {
                pool.advance();
            }
            assert_eq!(pool.current(), start, "pool of {len} did not cycle");
        }
    }

    #[test]
    fn rotation_starts_at_current() {
        let pool = abc();
        pool.advance();
        let order: Vec<String> = pool
            .rotation()
            .into_iter()
            .map(|(_, e)| e.to_string())
            .collect();
        assert_eq!(order, ["http://b.test/", "http://c.test/", "http://a.test/"]);
        // Rotation is read-only.
        assert_eq!(pool.current().as_str(), "http://b.test/");
    }

    #[test]
    fn select_moves_pointer() {
        let pool = abc();
        pool.select(2);
        assert_eq!(pool.current().as_str(), "http://c.test/");
        pool.select(4);
        assert_eq!(pool.current_index(), 1);
    }

    #[test]
    fn concurrent_advances_stay_in_range() {
        let pool = std::sync::Arc::new(abc());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..300 {
                        pool.advance();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 2400 advances over 3 endpoints lands back on the primary.
        assert_eq!(pool.current_index(), 0);
    }
}
