//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::GasBand;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)
    .with_context(|| format!("Invalid configuration in {}", path.display()))?;

  info!(
    endpoints = config.network.endpoints.len(),
    chain_id = config.network.chain_id,
    iterations = config.schedule.iterations,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - At least one well-formed http(s) endpoint
/// - A parseable wrapped-native contract address
/// - A non-empty, positive gas price band
/// - Positive limits, intervals and timeouts
fn validate_config(config: &AppConfig) -> Result<()> {
  // Network validation
  anyhow::ensure!(
    !config.network.endpoints.is_empty(),
    "At least one RPC endpoint must be configured"
  );

  for (i, endpoint) in config.network.endpoints.iter().enumerate() {
    let url = reqwest::Url::parse(endpoint)
      .with_context(|| format!("Endpoint {i} is not a valid URL: {endpoint}"))?;
    anyhow::ensure!(
      matches!(url.scheme(), "http" | "https"),
      "Endpoint {} must use http or https, got {}",
      i,
      url.scheme()
    );
  }

  anyhow::ensure!(config.network.chain_id > 0, "chain_id must be positive");
  anyhow::ensure!(
    config.network.request_timeout_secs > 0,
    "request_timeout_secs must be positive"
  );

  // Contract validation
  config
    .contracts
    .wrapped_native
    .parse::<Address>()
    .with_context(|| {
      format!(
        "Invalid wrapped_native address: {}",
        config.contracts.wrapped_native
      )
    })?;

  // Gas validation
  GasBand::from_gwei(config.gas.min_price_gwei, config.gas.max_price_gwei)
    .context("Invalid gas price band")?;
  anyhow::ensure!(config.gas.gas_limit > 0, "gas_limit must be positive");
  anyhow::ensure!(
    config.gas.precheck_gas_limit > 0,
    "precheck_gas_limit must be positive"
  );

  // Retry validation
  anyhow::ensure!(
    config.retry.deadline_secs != Some(0),
    "retry deadline_secs must be positive when set"
  );

  // Polling validation
  let polling = &config.polling;
  anyhow::ensure!(
    polling.confirmation_interval_secs > 0 && polling.balance_interval_secs > 0,
    "Polling intervals must be positive"
  );
  anyhow::ensure!(
    polling.confirmation_timeout_secs > 0 && polling.balance_timeout_secs > 0,
    "Polling timeouts must be positive"
  );

  // Schedule validation
  anyhow::ensure!(
    config.schedule.iterations > 0,
    "schedule.iterations must be positive"
  );
  anyhow::ensure!(
    config.schedule.duration_hours.is_finite() && config.schedule.duration_hours >= 0.0,
    "schedule.duration_hours must be a non-negative number, got {}",
    config.schedule.duration_hours
  );
  anyhow::ensure!(
    config.schedule.wrap_fraction > 0.0 && config.schedule.wrap_fraction <= 1.0,
    "wrap_fraction must be in (0, 1], got {}",
    config.schedule.wrap_fraction
  );

  anyhow::ensure!(
    !config.wallet.private_key_env.is_empty(),
    "wallet.private_key_env must name an environment variable"
  );

  Ok(())
}
