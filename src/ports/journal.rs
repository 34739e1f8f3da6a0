//! Journal Port - Append-only Transaction Record
//!
//! Every broadcast and every confirmation is recorded so an operator
//! can always tell whether a transaction actually left the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActionKind, ReceiptStatus, TxHash};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
  /// A transaction was accepted by an endpoint.
  Broadcast {
    /// 1-based schedule iteration.
    iteration: u32,
    action: ActionKind,
    tx_hash: TxHash,
    /// Amount moved, decimal wei.
    amount_wei: String,
    /// Gas price, decimal wei.
    gas_price_wei: String,
    nonce: u64,
    endpoint: String,
    timestamp: DateTime<Utc>,
  },
  /// A broadcast got no definite answer; the node may hold it.
  Unconfirmed {
    iteration: u32,
    action: ActionKind,
    tx_hash: TxHash,
    nonce: u64,
    endpoint: String,
    timestamp: DateTime<Utc>,
  },
  /// A receipt was observed.
  Confirmed {
    iteration: u32,
    action: ActionKind,
    tx_hash: TxHash,
    status: ReceiptStatus,
    block_number: Option<u64>,
    timestamp: DateTime<Utc>,
  },
}

impl JournalEntry {
  /// Hash the entry refers to.
  pub const fn tx_hash(&self) -> &TxHash {
    match self {
      Self::Broadcast { tx_hash, .. }
      | Self::Unconfirmed { tx_hash, .. }
      | Self::Confirmed { tx_hash, .. } => tx_hash,
    }
  }
}

/// Sink for journal entries.
#[async_trait]
pub trait Journal: Send + Sync + 'static {
  /// Append one entry.
  async fn record(&self, entry: &JournalEntry) -> anyhow::Result<()>;
}
