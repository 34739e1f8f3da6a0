//! Network Validator - On-chain Verification at Startup
//!
//! Before the first iteration, checks against the active endpoint:
//! 1. The reported chain id matches the configured one (a mismatch
//!    would make every signed transaction invalid)
//! 2. The wrapped-native contract has deployed code (not an EOA)

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::provider::RpcChainClient;

/// What startup validation observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Endpoint that answered.
    pub endpoint: String,
    /// Chain id it reported.
    pub chain_id: u64,
    /// Size of the contract's deployed bytecode.
    pub code_size: usize,
}

/// Validate the network and contract behind `client`.
///
/// Fails if the chain id differs from `expected_chain_id` or the
/// contract has no code.
#[instrument(skip(client), fields(endpoint = %client.endpoint()))]
pub async fn validate_network(
    client: &RpcChainClient,
    expected_chain_id: u64,
    wrapped_native: Address,
) -> Result<ValidationReport> {
    let chain_id = client
        .chain_id()
        .await
        .context("Failed to query chain id")?;

    anyhow::ensure!(
        chain_id == expected_chain_id,
        "Endpoint {} reports chain id {chain_id}, expected {expected_chain_id}",
        client.endpoint()
    );

    let code = client
        .code_at(wrapped_native)
        .await
        .with_context(|| format!("Failed to query code for {wrapped_native}"))?;

    anyhow::ensure!(
        !code.is_empty(),
        "Wrapped-native contract at {wrapped_native} has no deployed code, check config.toml"
    );

    info!(
        chain_id,
        contract = %wrapped_native,
        code_size = code.len(),
        "Network validated"
    );

    Ok(ValidationReport {
        endpoint: client.endpoint().to_string(),
        chain_id,
        code_size: code.len(),
    })
}
