//! Local Private-key Signer - Legacy EIP-155 Transactions
//!
//! Implements the `TxSigner` port with an in-process key. Builds a
//! legacy (gas-price) transaction from the intent, signs it with the
//! chain id attached, and returns the EIP-2718 encoding for
//! `eth_sendRawTransaction`.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::{TxHash, TxIntent};
use crate::ports::{SignError, SignedTx, TxSigner};

/// Signs with a private key held in memory.
///
/// The key is never logged or serialized; `Debug` shows the address only.
pub struct LocalSigner {
    address: Address,
    wallet: EthereumWallet,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Parse a hex private key (with or without `0x`).
    pub fn from_hex(key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Private key is not a valid secp256k1 key")?;
        Ok(Self::from_signer(signer))
    }

    /// Read the key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let key = std::env::var(var).with_context(|| format!("{var} not set"))?;
        Self::from_hex(&key)
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            address,
            wallet: EthereumWallet::from(signer),
        }
    }
}

/// Legacy transaction request for an intent.
pub fn request_for(intent: &TxIntent) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(intent.from)
        .with_to(intent.to)
        .with_value(intent.value)
        .with_input(intent.input.clone())
        .with_nonce(intent.nonce)
        .with_chain_id(intent.chain_id)
        .with_gas_limit(intent.gas_limit)
        .with_gas_price(intent.gas_price)
}

#[async_trait]
impl TxSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self, intent), fields(kind = %intent.kind, nonce = intent.nonce))]
    async fn sign(&self, intent: &TxIntent) -> Result<SignedTx, SignError> {
        if intent.from != self.address {
            return Err(SignError(format!(
                "intent sender {} does not match signer {}",
                intent.from, self.address
            )));
        }

        let envelope = request_for(intent)
            .build(&self.wallet)
            .await
            .map_err(|e| SignError(e.to_string()))?;

        let hash = TxHash(*envelope.tx_hash());
        debug!(tx_hash = %hash, "Transaction signed");

        Ok(SignedTx {
            raw: envelope.encoded_2718().into(),
            hash,
            nonce: intent.nonce,
        })
    }
}
