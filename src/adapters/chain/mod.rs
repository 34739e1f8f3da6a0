//! Chain Adapters - EVM Interaction Layer
//!
//! Provides on-chain access via alloy-rs 0.9 for:
//! - JSON-RPC clients bound to one endpoint, with error classification
//! - Wrapped-native contract call encoding (deposit / withdraw / balanceOf)
//! - Local private-key signing of legacy EIP-155 transactions
//! - Startup validation of chain id and contract code

pub mod contracts;
pub mod provider;
pub mod signer;
pub mod validator;

pub use contracts::WrappedNative;
pub use provider::{RpcChainClient, RpcConnector};
pub use signer::LocalSigner;
pub use validator::validate_network;
