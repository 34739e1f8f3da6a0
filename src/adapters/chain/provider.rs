//! JSON-RPC Chain Client - alloy-rs 0.9 Connection Management
//!
//! Implements the `ChainClient` port over HTTP JSON-RPC. One
//! `RpcChainClient` is bound to one endpoint; `RpcConnector` builds a
//! new one whenever the endpoint pool rotates. All RPC failures are
//! classified here into `ChainError` so nothing upstream has to look
//! at error text.
//!
//! In alloy 0.9, `ProviderBuilder::on_client()` returns a concrete
//! root provider. We store it as a type-erased `dyn Provider` to keep
//! the API clean across the adapter layer.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::Http;
use alloy::transports::{RpcError, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::contracts::{balance_of_calldata, decode_balance_of};
use crate::domain::{Endpoint, Receipt, ReceiptStatus, TxHash};
use crate::ports::{ChainClient, ChainConnector, ChainError, SignedTx};

type DynProvider = Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>;

/// Builds `RpcChainClient`s sharing one pooled HTTP client.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    http: reqwest::Client,
}

impl RpcConnector {
    /// Connector whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

impl ChainConnector for RpcConnector {
    type Client = RpcChainClient;

    fn connect(&self, endpoint: &Endpoint) -> Result<RpcChainClient, ChainError> {
        let url: reqwest::Url = endpoint
            .as_str()
            .parse()
            .map_err(|e| ChainError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;

        let transport = Http::with_client(self.http.clone(), url);
        let provider = ProviderBuilder::new().on_client(RpcClient::new(transport, false));

        Ok(RpcChainClient {
            provider: Arc::new(provider),
            endpoint: endpoint.clone(),
        })
    }
}

/// `ChainClient` bound to a single JSON-RPC endpoint.
pub struct RpcChainClient {
    /// The alloy HTTP provider (type-erased).
    provider: DynProvider,
    /// Endpoint this client talks to (for diagnostics).
    endpoint: Endpoint,
}

impl RpcChainClient {
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Chain id reported by the endpoint.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider.get_chain_id().await.map_err(classify)
    }

    /// Deployed bytecode at `address` (empty for EOAs).
    pub async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        self.provider.get_code_at(address).await.map_err(classify)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(address).await.map_err(classify)
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(classify)
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint, tx_hash = %tx.hash))]
    async fn submit(&self, tx: &SignedTx) -> Result<TxHash, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(&tx.raw)
            .await
            .map_err(classify)?;

        let hash = TxHash(*pending.tx_hash());
        if hash != tx.hash {
            debug!(local = %tx.hash, remote = %hash, "Node reported a different hash");
        }
        Ok(hash)
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash.0)
            .await
            .map_err(classify)?;

        Ok(receipt.map(|r| Receipt {
            hash: TxHash(r.transaction_hash),
            status: if r.status() {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Failure
            },
            block_number: r.block_number,
        }))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn token_balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let request = TransactionRequest::default()
            .with_to(token)
            .with_input(balance_of_calldata(owner));

        let data = self.provider.call(&request).await.map_err(classify)?;
        decode_balance_of(&data)
    }
}

/// Map an alloy transport error onto the typed taxonomy.
///
/// Connectivity problems, HTTP errors, empty and undecodable responses
/// are all endpoint faults and become `Transport`. JSON-RPC error
/// objects are the node's verdict and are sorted by code and message.
pub fn classify(err: TransportError) -> ChainError {
    match err {
        RpcError::ErrorResp(payload) => classify_payload(payload.code, &payload.message),
        RpcError::Transport(kind) => ChainError::Transport(kind.to_string()),
        RpcError::NullResp => ChainError::Transport("null response".to_string()),
        RpcError::DeserError { err, .. } => {
            ChainError::Transport(format!("invalid JSON-RPC response: {err}"))
        }
        RpcError::SerError(e) => ChainError::Decode(format!("request serialization: {e}")),
        other => ChainError::Rejected(other.to_string()),
    }
}

/// Sort a JSON-RPC error object.
///
/// Execution clients disagree on codes (geth answers almost everything
/// with -32000), so the message is the only reliable discriminator.
pub fn classify_payload(code: i64, message: &str) -> ChainError {
    let lower = message.to_ascii_lowercase();
    let detail = format!("{code}: {message}");

    if lower.contains("already known") || lower.contains("known transaction") {
        ChainError::AlreadyKnown(detail)
    } else if lower.contains("nonce too low")
        || lower.contains("nonce is too low")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("invalid nonce")
    {
        ChainError::NonceConflict(detail)
    } else if lower.contains("insufficient funds") {
        ChainError::InsufficientFunds(detail)
    } else if code == -32005
        || code == 429
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("header not found")
    {
        // Provider-side capacity problems; another endpoint may serve us.
        ChainError::Transport(detail)
    } else {
        ChainError::Rejected(detail)
    }
}
