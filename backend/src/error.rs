use crate::engine::{CheckTxResponse, EngineError};
use meridian_types::{Address, BlockNumber, B256};
use thiserror::Error;

/// What a lookup failed to find.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Missing {
    #[error("account {0}")]
    Account(Address),
    #[error("block with hash {0}")]
    BlockHash(B256),
    #[error("block at height {0}")]
    BlockHeight(u64),
    #[error("transaction {0}")]
    Transaction(B256),
}

/// Failure reported by the underlying state store.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("read context already closed")]
    Closed,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(Missing),
    #[error("only the latest height is supported (got {0})")]
    Unsupported(BlockNumber),
    #[error("transaction rejected: {0}")]
    EngineRejected(CheckTxResponse),
    #[error("consensus engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),
    #[error("store read failed: {0}")]
    InternalStore(#[from] StoreError),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<Missing> for BackendError {
    fn from(missing: Missing) -> Self {
        Self::NotFound(missing)
    }
}
