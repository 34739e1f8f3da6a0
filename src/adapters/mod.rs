//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (JSON-RPC over HTTP, local signing, file I/O).
//!
//! Adapter categories:
//! - `chain`: EVM interaction via alloy-rs
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL transaction journal

pub mod chain;
pub mod metrics;
pub mod persistence;
