//! Failover - Endpoint Pool Bound to a Live Client
//!
//! Holds the endpoint pool, the connector that builds clients, and the
//! client for the currently active endpoint. Rotation advances the pool
//! and swaps in a fresh client, so every caller that fetches
//! `client()` after a rotation talks to the new endpoint.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::domain::{Endpoint, EndpointPool};
use crate::ports::{ChainConnector, ChainError, NoopTelemetry, Telemetry};

/// Endpoint pool plus the client bound to its current endpoint.
pub struct Failover<K: ChainConnector> {
  pool: EndpointPool,
  connector: K,
  /// Client for `pool.current()`.
  client: ArcSwap<K::Client>,
  telemetry: Arc<dyn Telemetry>,
}

impl<K: ChainConnector> Failover<K> {
  /// Connect to the pool's first endpoint.
  pub fn new(pool: EndpointPool, connector: K) -> Result<Self, ChainError> {
    let client = connector.connect(&pool.current())?;
    Ok(Self {
      pool,
      connector,
      client: ArcSwap::from_pointee(client),
      telemetry: Arc::new(NoopTelemetry),
    })
  }

  /// Report rotations to `telemetry`.
  #[must_use]
  pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
    self.telemetry = telemetry;
    self
  }

  /// Client bound to the active endpoint.
  pub fn client(&self) -> Arc<K::Client> {
    self.client.load_full()
  }

  pub fn endpoint(&self) -> Endpoint {
    self.pool.current()
  }

  /// Advance to the next endpoint and swap in a client for it.
  ///
  /// An endpoint whose client cannot be built is stepped past; after a
  /// full pass with no buildable client the last error is returned.
  pub fn rotate(&self) -> Result<Endpoint, ChainError> {
    let previous = self.pool.current();
    let mut last_error = ChainError::Transport("endpoint pool has no usable endpoint".into());

    for _ in 0..self.pool.len() {
      let next = self.pool.advance();
      self.telemetry.endpoint_rotated(self.pool.current_index());

      match self.connector.connect(&next) {
        Ok(client) => {
          self.client.store(Arc::new(client));
          warn!(from = %previous, to = %next, "Rotated to next RPC endpoint");
          return Ok(next);
        }
        Err(e) => {
          warn!(endpoint = %next, error = %e, "Failed to build client, skipping endpoint");
          last_error = e;
        }
      }
    }

    Err(last_error)
  }

  /// Run `op` once against the active client, rotating if it fails
  /// with a transport error. The error is returned either way.
  pub async fn attempt<T, F, Fut>(&self, op: F) -> Result<T, ChainError>
  where
    F: FnOnce(Arc<K::Client>) -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
  {
    let result = op(self.client()).await;
    if let Err(ref e) = result {
      if e.is_transport() {
        debug!(endpoint = %self.pool.current(), error = %e, "Transport failure");
        if let Err(rotate_err) = self.rotate() {
          warn!(error = %rotate_err, "Endpoint rotation failed");
        }
      }
    }
    result
  }

  /// Run a read-only `op`, moving through the pool on transport errors.
  ///
  /// Each endpoint is tried at most once. Non-transport errors are
  /// returned immediately.
  pub async fn read<T, F, Fut>(&self, op: F) -> Result<T, ChainError>
  where
    F: Fn(Arc<K::Client>) -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
  {
    let mut tries = 0;
    loop {
      tries += 1;
      match self.attempt(&op).await {
        Err(e) if e.is_transport() && tries < self.pool.len() => continue,
        other => return other,
      }
    }
  }
}
