//! Records shared between the meridian backend and its callers.
//!
//! Everything here is a plain value: accounts, blocks, committed transactions,
//! logs and the events pushed to subscribers. The EVM primitive layer
//! (`Address`, `B256`, `U256`, `Bytes`, `Bloom`) is re-exported from
//! `alloy-primitives` so dependants do not need to pin it themselves.

pub mod account;
pub mod block;
pub mod event;
pub mod log;
pub mod transaction;

pub use account::{Account, Code};
pub use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, U256};
pub use block::{Block, BlockNumber, BlockNumberError, Header};
pub use event::{ChainEvent, NewTxsEvent, RemovedLogsEvent};
pub use log::{logs_bloom, Log, LogFilter};
pub use transaction::{AddressRole, CallRequest, PendingTransaction, TransactionRecord};
