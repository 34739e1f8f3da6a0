//! Chain Client Port - JSON-RPC Interaction Interface
//!
//! A `ChainClient` is bound to one endpoint for its whole lifetime.
//! After the endpoint pool advances, a fresh client must be obtained
//! from a `ChainConnector`. Failures come back already classified so
//! use cases never inspect error text.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Endpoint, Receipt, TxHash};
use crate::ports::signer::SignedTx;

/// Classified chain failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
  /// Endpoint unreachable, timed out, or returned a malformed response.
  /// Recovered by rotating to the next endpoint.
  #[error("transport failure: {0}")]
  Transport(String),
  /// Local nonce is stale relative to the node.
  /// Recovered by re-querying the pending nonce.
  #[error("nonce conflict: {0}")]
  NonceConflict(String),
  /// The node already holds this exact signed transaction, so an
  /// earlier broadcast reached it.
  #[error("transaction already known: {0}")]
  AlreadyKnown(String),
  /// Node refused the transaction because the account cannot pay for it.
  #[error("insufficient funds: {0}")]
  InsufficientFunds(String),
  /// Any other node-side rejection.
  #[error("rejected by node: {0}")]
  Rejected(String),
  /// Response was well-formed JSON-RPC but could not be interpreted.
  #[error("decode failure: {0}")]
  Decode(String),
}

impl ChainError {
  /// Short label for logs and metrics.
  pub const fn kind(&self) -> &'static str {
    match self {
      Self::Transport(_) => "transport",
      Self::NonceConflict(_) => "nonce_conflict",
      Self::AlreadyKnown(_) => "already_known",
      Self::InsufficientFunds(_) => "insufficient_funds",
      Self::Rejected(_) => "rejected",
      Self::Decode(_) => "decode",
    }
  }

  pub const fn is_transport(&self) -> bool {
    matches!(self, Self::Transport(_))
  }
}

/// Operations against a single JSON-RPC endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
  /// Native balance in wei (`eth_getBalance`, latest block).
  async fn balance(&self, address: Address) -> Result<U256, ChainError>;

  /// Next nonce including pending transactions
  /// (`eth_getTransactionCount(address, "pending")`).
  async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

  /// Broadcast a signed transaction (`eth_sendRawTransaction`).
  async fn submit(&self, tx: &SignedTx) -> Result<TxHash, ChainError>;

  /// Receipt lookup. `None` means not mined yet, which is not an error.
  async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ChainError>;

  /// `balanceOf(owner)` on a token contract.
  async fn token_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
}

/// Builds clients bound to a given endpoint.
pub trait ChainConnector: Send + Sync + 'static {
  type Client: ChainClient;

  /// Create a client for `endpoint`. Construction is local; no request
  /// is made until the client is used.
  fn connect(&self, endpoint: &Endpoint) -> Result<Self::Client, ChainError>;
}
