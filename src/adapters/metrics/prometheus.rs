//! Prometheus Metrics Registry - Execution Observability
//!
//! Registers the counters and gauges the engine updates while it runs:
//! submissions, endpoint rotations, retries, confirmations and
//! schedule progress. Exposed on `/metrics` by the server module.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::gas::wei_to_gwei;
use crate::domain::{ActionKind, ReceiptStatus};
use crate::ports::Telemetry;

/// Centralized Prometheus metrics for the bot.
///
/// All metrics follow the naming convention `wrap_cycle_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Transactions accepted by an endpoint, by action.
    pub tx_submitted: IntCounterVec,
    /// Endpoint pool rotations.
    pub endpoint_rotations: IntCounter,
    /// Executor retries, by failure kind.
    pub retries: IntCounterVec,
    /// Actions skipped because the balance could not cover gas.
    pub insufficient_funds: IntCounter,
    /// Receipts observed, by status.
    pub confirmations: IntCounterVec,
    /// Completed wrap/unwrap round trips.
    pub iterations_completed: IntCounter,
    /// Index of the active endpoint.
    pub active_endpoint: IntGauge,
    /// Last selected gas price (gwei).
    pub gas_price_gwei: Gauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tx_submitted = IntCounterVec::new(
            Opts::new("wrap_cycle_tx_submitted_total", "Transactions accepted by an endpoint"),
            &["action"],
        )?;

        let endpoint_rotations = IntCounter::new(
            "wrap_cycle_endpoint_rotations_total",
            "Switches to the next RPC endpoint",
        )?;

        let retries = IntCounterVec::new(
            Opts::new("wrap_cycle_retries_total", "Executor retries by failure kind"),
            &["kind"],
        )?;

        let insufficient_funds = IntCounter::new(
            "wrap_cycle_insufficient_funds_total",
            "Actions aborted because the balance could not cover gas",
        )?;

        let confirmations = IntCounterVec::new(
            Opts::new("wrap_cycle_confirmations_total", "Receipts observed by status"),
            &["status"],
        )?;

        let iterations_completed = IntCounter::new(
            "wrap_cycle_iterations_completed_total",
            "Completed wrap/unwrap round trips",
        )?;

        let active_endpoint = IntGauge::new(
            "wrap_cycle_active_endpoint",
            "Index of the active RPC endpoint",
        )?;

        let gas_price_gwei = Gauge::new(
            "wrap_cycle_gas_price_gwei",
            "Last selected gas price in gwei",
        )?;

        // Register all metrics
        registry.register(Box::new(tx_submitted.clone()))?;
        registry.register(Box::new(endpoint_rotations.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(insufficient_funds.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(iterations_completed.clone()))?;
        registry.register(Box::new(active_endpoint.clone()))?;
        registry.register(Box::new(gas_price_gwei.clone()))?;

        Ok(Self {
            registry,
            tx_submitted,
            endpoint_rotations,
            retries,
            insufficient_funds,
            confirmations,
            iterations_completed,
            active_endpoint,
            gas_price_gwei,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Telemetry for MetricsRegistry {
    #[allow(clippy::cast_possible_wrap)]
    fn endpoint_rotated(&self, index: usize) {
        self.endpoint_rotations.inc();
        self.active_endpoint.set(index as i64);
    }

    fn retry(&self, kind: &'static str) {
        self.retries.with_label_values(&[kind]).inc();
    }

    fn submitted(&self, action: ActionKind) {
        self.tx_submitted.with_label_values(&[action.as_str()]).inc();
    }

    fn insufficient_funds(&self) {
        self.insufficient_funds.inc();
    }

    fn confirmed(&self, status: ReceiptStatus) {
        let label = match status {
            ReceiptStatus::Success => "success",
            ReceiptStatus::Failure => "failure",
        };
        self.confirmations.with_label_values(&[label]).inc();
    }

    fn iteration_completed(&self) {
        self.iterations_completed.inc();
    }

    fn gas_price_selected(&self, wei: u128) {
        self.gas_price_gwei.set(wei_to_gwei(wei));
    }
}
