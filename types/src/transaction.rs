use crate::log::Log;
use alloy_primitives::{Address, Bloom, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Which side of a transaction an address query should match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressRole {
    Source,
    Destination,
    Either,
}

/// A committed transaction with its execution outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: B256,
    pub transaction_index: u32,
    pub block_hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: U256,
    pub gas: u64,
    pub input: Bytes,
    pub nonce: u64,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    /// Address of the contract created, for deployments.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
    pub logs_bloom: Bloom,
    pub status: u64,
    pub status_str: String,
    pub output: Bytes,
}

impl TransactionRecord {
    /// Recipient for calls, created contract for deployments.
    pub fn destination(&self) -> Option<Address> {
        self.to.or(self.contract_address)
    }

    pub fn involves(&self, address: &Address, role: AddressRole) -> bool {
        let is_source = self.from == *address;
        let is_destination = self.destination().as_ref() == Some(address);
        match role {
            AddressRole::Source => is_source,
            AddressRole::Destination => is_destination,
            AddressRole::Either => is_source || is_destination,
        }
    }
}

/// Parameters of a simulated call. Unset gas and price are left to the
/// executor's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub to: Option<Address>,
    pub value: U256,
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
    pub input: Bytes,
    pub nonce: Option<u64>,
}

/// A transaction admitted to the pending pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub hash: B256,
    pub raw: Bytes,
}
