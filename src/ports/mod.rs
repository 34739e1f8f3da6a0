//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ChainClient` / `ChainConnector`: JSON-RPC access bound to one endpoint
//! - `TxSigner`: Injected signing capability for the single account
//! - `Journal`: Append-only record of broadcast transactions
//! - `Telemetry`: Execution events for metrics

pub mod chain_client;
pub mod journal;
pub mod signer;
pub mod telemetry;

pub use chain_client::{ChainClient, ChainConnector, ChainError};
pub use journal::{Journal, JournalEntry};
pub use signer::{SignError, SignedTx, TxSigner};
pub use telemetry::{NoopTelemetry, Telemetry};
