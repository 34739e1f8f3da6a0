//! Signer Port - Injected Transaction Signing Capability
//!
//! Key material never leaves the implementor; callers only see the
//! account address and the signed, encoded transaction.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{TxHash, TxIntent};

/// Signing failed. Not retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to sign transaction: {0}")]
pub struct SignError(pub String);

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
  /// EIP-2718 encoded bytes.
  pub raw: Bytes,
  /// Hash computed locally from the signed envelope.
  pub hash: TxHash,
  /// Nonce the transaction was signed with.
  pub nonce: u64,
}

/// Signs transactions for exactly one account.
#[async_trait]
pub trait TxSigner: Send + Sync + 'static {
  /// Public address of the account.
  fn address(&self) -> Address;

  /// Sign a fully specified intent.
  async fn sign(&self, intent: &TxIntent) -> Result<SignedTx, SignError>;
}
