//! Catalogue of the operations a transport layer can register.

use serde::Serialize;

pub const API_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    ChainQueries,
    TransactionSubmission,
    Simulation,
    Subscriptions,
}

impl Group {
    pub const ALL: [Group; 4] = [
        Group::ChainQueries,
        Group::TransactionSubmission,
        Group::Simulation,
        Group::Subscriptions,
    ];

    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            Group::ChainQueries => &[
                "chain_id",
                "protocol_version",
                "bloom_status",
                "latest_height",
                "current_block",
                "block_by_number",
                "block_by_hash",
                "header_by_number",
                "header_by_hash",
                "get_balance",
                "get_nonce",
                "get_code",
                "get_storage_at",
                "get_transaction",
                "get_tx_list_by_height",
                "get_logs",
                "get_receipts",
                "query_logs",
                "basic_query_logs",
                "query_tx_by_src",
                "query_tx_by_dst",
                "query_tx_by_addr",
            ],
            Group::TransactionSubmission => &["send_raw_tx"],
            Group::Simulation => &["call", "estimate_gas"],
            Group::Subscriptions => &[
                "subscribe_chain_event",
                "subscribe_logs_event",
                "subscribe_removed_logs_event",
                "subscribe_new_txs_event",
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Namespace {
    pub name: &'static str,
    pub version: &'static str,
    pub public: bool,
    /// Groups served under this namespace. `net` and `web3` carry only
    /// transport-local methods and list none.
    pub groups: &'static [Group],
}

fn namespace(name: &'static str, groups: &'static [Group]) -> Namespace {
    Namespace {
        name,
        version: API_VERSION,
        public: true,
        groups,
    }
}

pub fn namespaces() -> Vec<Namespace> {
    vec![
        namespace("eth", &Group::ALL),
        namespace("net", &[]),
        namespace("web3", &[]),
        namespace("sbch", &[Group::ChainQueries]),
        namespace("evm", &[Group::Simulation]),
    ]
}
