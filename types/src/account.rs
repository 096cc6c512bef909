use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Externally visible state of an address.
///
/// `sequence` is the store-assigned locator used to address the account's
/// storage slots; it carries no meaning outside the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub sequence: u64,
}

impl Account {
    pub fn new(address: Address, nonce: u64, balance: U256, sequence: u64) -> Self {
        Self {
            address,
            nonce,
            balance,
            sequence,
        }
    }
}

/// Contract bytecode together with its hash.
///
/// The empty value (no bytecode, zero hash) is what lookups return for
/// addresses without code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub bytecode: Bytes,
    pub code_hash: B256,
}

impl Code {
    pub fn new(bytecode: Bytes) -> Self {
        let code_hash = keccak256(&bytecode);
        Self {
            bytecode,
            code_hash,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }
}
