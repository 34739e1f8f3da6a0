//! Telemetry Port - Execution Event Sink
//!
//! Use cases report what happened (rotations, retries, submissions)
//! through this trait; the metrics adapter turns the events into
//! Prometheus counters. Every method defaults to a no-op.

use crate::domain::{ActionKind, ReceiptStatus};

/// Receives execution events.
pub trait Telemetry: Send + Sync + 'static {
  /// The endpoint pool advanced; `index` is the new active endpoint.
  fn endpoint_rotated(&self, _index: usize) {}

  /// An executor attempt failed with a retryable error of `kind`.
  fn retry(&self, _kind: &'static str) {}

  /// An endpoint accepted a transaction.
  fn submitted(&self, _action: ActionKind) {}

  /// An action was skipped because the balance could not cover gas.
  fn insufficient_funds(&self) {}

  /// A receipt was observed.
  fn confirmed(&self, _status: ReceiptStatus) {}

  /// A wrap/unwrap round trip finished.
  fn iteration_completed(&self) {}

  /// A gas price was drawn for an action.
  fn gas_price_selected(&self, _wei: u128) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}
