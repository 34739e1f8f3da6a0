//! RPC endpoint identity and round-robin failover pool.
//!
//! The pool never removes or scores endpoints: a dead endpoint is
//! simply stepped past on the next failure and stays in rotation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One JSON-RPC provider URL. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap a URL string.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The raw URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors constructing an [`EndpointPool`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("endpoint pool must contain at least one endpoint")]
    Empty,
}

/// Ordered list of equivalent endpoints plus the index of the active one.
///
/// `advance` takes `&self` so the pool can be shared between the executor
/// and the waiters; the index is the only mutable state.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    current: AtomicUsize,
}

impl EndpointPool {
    /// Build a pool starting at the first endpoint.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, PoolError> {
        if endpoints.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            endpoints,
            current: AtomicUsize::new(0),
        })
    }

    /// The currently active endpoint.
    pub fn current(&self) -> Endpoint {
        self.endpoints[self.current_index()].clone()
    }

    /// Index of the active endpoint.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire) % self.endpoints.len()
    }

    /// Step to `(current + 1) mod len` and return the new active endpoint.
    pub fn advance(&self) -> Endpoint {
        let len = self.endpoints.len();
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        self.endpoints[(previous + 1) % len].clone()
    }

    /// Number of endpoints in rotation.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; an empty pool cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// All endpoints in rotation order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
