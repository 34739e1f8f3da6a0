//! Wrapped-native Contract Calls - deposit / withdraw / balanceOf
//!
//! Encodes the two round-trip actions against a WETH-style contract.
//! Wrap sends `deposit()` with the amount as value; unwrap sends
//! `withdraw(uint256)` with zero value. The same contract answers
//! `balanceOf(address)` for the token side of the round trip.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::domain::{ActionCall, ActionKind};
use crate::ports::ChainError;

sol! {
    /// Minimal WETH9-style interface.
    interface IWrappedNative {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Builds calls against one wrapped-native contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrappedNative {
    address: Address,
}

impl WrappedNative {
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    /// `deposit()` carrying `amount` wei.
    pub fn wrap(&self, amount: U256) -> ActionCall {
        ActionCall {
            kind: ActionKind::Wrap,
            to: self.address,
            value: amount,
            input: IWrappedNative::depositCall {}.abi_encode().into(),
            amount,
        }
    }

    /// `withdraw(amount)` with no value attached.
    pub fn unwrap(&self, amount: U256) -> ActionCall {
        ActionCall {
            kind: ActionKind::Unwrap,
            to: self.address,
            value: U256::ZERO,
            input: IWrappedNative::withdrawCall { wad: amount }.abi_encode().into(),
            amount,
        }
    }
}

/// Calldata for `balanceOf(owner)`.
pub fn balance_of_calldata(owner: Address) -> Bytes {
    IWrappedNative::balanceOfCall { owner }.abi_encode().into()
}

/// Decode the `uint256` returned by `balanceOf`.
pub fn decode_balance_of(data: &[u8]) -> Result<U256, ChainError> {
    IWrappedNative::balanceOfCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| ChainError::Decode(format!("balanceOf returned malformed data: {e}")))
}
