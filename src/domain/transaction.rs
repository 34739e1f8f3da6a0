//! Transaction domain types.
//!
//! An [`ActionCall`] is the opaque "what" of one action (destination,
//! value, calldata). The executor turns it into a [`TxIntent`] by adding
//! gas, nonce and chain id, which is then signed and broadcast.

use std::fmt;

use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// The two round-trip operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Native currency into the wrapped token.
    Wrap,
    /// Wrapped token back into native currency.
    Unwrap,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wrap => "wrap",
            Self::Unwrap => "unwrap",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action's destination and payload, independent of gas and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub kind: ActionKind,
    /// Contract receiving the call.
    pub to: Address,
    /// Native value attached (wei).
    pub value: U256,
    /// ABI-encoded calldata.
    pub input: Bytes,
    /// Amount the action moves, for logging and journaling (wei).
    pub amount: U256,
}

/// Fully specified transaction, immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIntent {
    pub kind: ActionKind,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    /// Legacy gas price (wei per gas).
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

impl TxIntent {
    /// Attach gas, nonce and chain parameters to an action.
    pub fn from_call(
        call: &ActionCall,
        from: Address,
        gas_limit: u64,
        gas_price: u128,
        nonce: u64,
        chain_id: u64,
    ) -> Self {
        Self {
            kind: call.kind,
            from,
            to: call.to,
            value: call.value,
            input: call.input.clone(),
            gas_limit,
            gas_price,
            nonce,
            chain_id,
        }
    }
}

/// Estimated worst-case gas cost: `gas_limit × gas_price`.
pub fn estimated_cost(gas_limit: u64, gas_price: u128) -> U256 {
    U256::from(gas_limit).saturating_mul(U256::from(gas_price))
}

/// Hash returned by a successful broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub B256);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<B256> for TxHash {
    fn from(hash: B256) -> Self {
        Self(hash)
    }
}

/// Mined outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// The node's record of a mined transaction. Only `status` is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Explorer URL for a transaction, e.g. `https://taikoscan.io/tx/0x..`.
pub fn explorer_link(base: &str, hash: &TxHash) -> String {
    if base.ends_with('/') {
        format!("{base}{hash}")
    } else {
        format!("{base}/{hash}")
    }
}
