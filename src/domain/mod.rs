//! Domain layer - Core round-trip types and logic.
//!
//! Pure logic for the wrap/unwrap bot: endpoint rotation, gas price
//! selection, transaction shapes and scheduling. Only value types from
//! `alloy::primitives` cross this boundary; no I/O happens here.

pub mod endpoint;
pub mod gas;
pub mod schedule;
pub mod transaction;

// Re-export core types for convenience
pub use endpoint::{Endpoint, EndpointPool, PoolError};
pub use gas::{GasBand, GasBandError, GasPriceSelector};
pub use schedule::{IterationDelay, WrapFraction};
pub use transaction::{
    ActionCall, ActionKind, Receipt, ReceiptStatus, TxHash, TxIntent, estimated_cost,
    explorer_link,
};
