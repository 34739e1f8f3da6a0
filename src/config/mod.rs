//! Configuration Module - TOML-based Bot Configuration
//!
//! Loads and validates configuration from `config.toml`. The private
//! key is read from the environment variable named in `[wallet]`,
//! never from the file itself. Contract addresses, endpoints and all
//! timing knobs are externalized here.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

/// Top-level bot configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the bot begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Bot identity and logging.
  pub bot: BotConfig,
  /// Signing account source.
  #[serde(default)]
  pub wallet: WalletConfig,
  /// Chain and RPC endpoints.
  pub network: NetworkConfig,
  /// Target contracts.
  pub contracts: ContractConfig,
  /// Gas price band and limits.
  #[serde(default)]
  pub gas: GasConfig,
  /// Executor retry policy.
  #[serde(default)]
  pub retry: RetryConfig,
  /// Confirmation and balance polling.
  #[serde(default)]
  pub polling: PollingConfig,
  /// Iteration schedule.
  #[serde(default)]
  pub schedule: ScheduleConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Transaction journal.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable bot name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Emit JSON-formatted logs.
  #[serde(default)]
  pub json_logs: bool,
}

/// Where the signing key comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
  /// Environment variable holding the hex-encoded private key.
  #[serde(default = "default_private_key_env")]
  pub private_key_env: String,
}

impl Default for WalletConfig {
  fn default() -> Self {
    Self {
      private_key_env: default_private_key_env(),
    }
  }
}

/// Chain and endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// EIP-155 chain id signed into every transaction.
  #[serde(default = "default_chain_id")]
  pub chain_id: u64,
  /// Equivalent JSON-RPC endpoints, tried in order.
  pub endpoints: Vec<String>,
  /// Per-request HTTP timeout in seconds.
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
  /// Explorer prefix used to build transaction links.
  #[serde(default = "default_explorer_tx_url")]
  pub explorer_tx_url: String,
  /// Check chain id and contract code before the first iteration.
  #[serde(default = "default_true")]
  pub validate_on_startup: bool,
}

impl NetworkConfig {
  pub const fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

/// Contract addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
  /// Wrapped-native token contract (deposit/withdraw/balanceOf).
  pub wrapped_native: String,
}

/// Gas configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
  /// Lower bound of the random gas price band (gwei, inclusive).
  #[serde(default = "default_min_price_gwei")]
  pub min_price_gwei: f64,
  /// Upper bound of the random gas price band (gwei, exclusive).
  #[serde(default = "default_max_price_gwei")]
  pub max_price_gwei: f64,
  /// Gas limit signed into each transaction and used for the cost check.
  #[serde(default = "default_gas_limit")]
  pub gas_limit: u64,
  /// Gas limit used for the pre-iteration affordability check.
  #[serde(default = "default_precheck_gas_limit")]
  pub precheck_gas_limit: u64,
}

impl Default for GasConfig {
  fn default() -> Self {
    Self {
      min_price_gwei: default_min_price_gwei(),
      max_price_gwei: default_max_price_gwei(),
      gas_limit: default_gas_limit(),
      precheck_gas_limit: default_precheck_gas_limit(),
    }
  }
}

/// Executor retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Attempts per action. 0 = retry until success or cancellation.
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// Sleep before retrying an unclassified failure (seconds).
  #[serde(default = "default_backoff")]
  pub backoff_secs: u64,
  /// Optional wall-clock budget for a single action (seconds).
  #[serde(default)]
  pub deadline_secs: Option<u64>,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      backoff_secs: default_backoff(),
      deadline_secs: None,
    }
  }
}

/// Polling intervals and timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
  #[serde(default = "default_poll_timeout")]
  pub confirmation_timeout_secs: u64,
  #[serde(default = "default_poll_interval")]
  pub confirmation_interval_secs: u64,
  #[serde(default = "default_poll_timeout")]
  pub balance_timeout_secs: u64,
  #[serde(default = "default_poll_interval")]
  pub balance_interval_secs: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      confirmation_timeout_secs: default_poll_timeout(),
      confirmation_interval_secs: default_poll_interval(),
      balance_timeout_secs: default_poll_timeout(),
      balance_interval_secs: default_poll_interval(),
    }
  }
}

/// Iteration schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
  /// Number of wrap/unwrap round trips.
  #[serde(default = "default_iterations")]
  pub iterations: u32,
  /// Total time the iterations are spread over.
  #[serde(default = "default_duration_hours")]
  pub duration_hours: f64,
  /// Share of the native balance wrapped per iteration.
  #[serde(default = "default_wrap_fraction")]
  pub wrap_fraction: f64,
  /// Stop the whole schedule when an action cannot be afforded.
  /// When false, the iteration is skipped and the schedule continues.
  #[serde(default = "default_true")]
  pub halt_on_insufficient_funds: bool,
}

impl ScheduleConfig {
  /// Total schedule duration.
  pub fn duration(&self) -> Duration {
    Duration::from_secs_f64(self.duration_hours.max(0.0) * 3600.0)
  }
}

impl Default for ScheduleConfig {
  fn default() -> Self {
    Self {
      iterations: default_iterations(),
      duration_hours: default_duration_hours(),
      wrap_fraction: default_wrap_fraction(),
      halt_on_insufficient_funds: true,
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Write the JSONL transaction journal.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory for JSONL journals.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      data_dir: default_data_dir(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_private_key_env() -> String {
  "PRIVATE_KEY".to_string()
}

fn default_chain_id() -> u64 {
  167_000
}

fn default_request_timeout() -> u64 {
  15
}

fn default_explorer_tx_url() -> String {
  "https://taikoscan.io/tx/".to_string()
}

fn default_min_price_gwei() -> f64 {
  0.11
}

fn default_max_price_gwei() -> f64 {
  0.15
}

fn default_gas_limit() -> u64 {
  100_000
}

fn default_precheck_gas_limit() -> u64 {
  500_000
}

fn default_max_attempts() -> u32 {
  20
}

fn default_backoff() -> u64 {
  5
}

fn default_poll_timeout() -> u64 {
  60
}

fn default_poll_interval() -> u64 {
  5
}

fn default_iterations() -> u32 {
  50
}

fn default_duration_hours() -> f64 {
  5.0
}

fn default_wrap_fraction() -> f64 {
  0.9
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}
