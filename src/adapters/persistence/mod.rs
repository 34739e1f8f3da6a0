//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the Journal port using append-only JSONL files, one per
//! day. No database dependency.

pub mod journal;

pub use journal::{JsonlJournal, NullJournal};
