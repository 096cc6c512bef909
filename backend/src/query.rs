//! Read-only chain queries.
//!
//! Every operation opens exactly one [ReadContext] in the mode it needs and
//! releases it before returning, including on error paths.

use crate::context::{ReadContext, StateStore};
use crate::error::{BackendError, Missing};
use meridian_types::{
    Address, AddressRole, Block, BlockNumber, Bytes, Code, Header, Log, LogFilter,
    TransactionRecord, B256, U256,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// A committed transaction together with where it landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLookup {
    pub record: TransactionRecord,
    pub block_hash: B256,
    pub block_number: u64,
    pub index: u32,
}

/// Account state reads only serve the latest height.
fn ensure_latest(height: BlockNumber) -> Result<(), BackendError> {
    if height.is_latest() {
        Ok(())
    } else {
        Err(BackendError::Unsupported(height))
    }
}

pub struct QueryService<S> {
    store: Arc<S>,
}

impl<S: StateStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn latest(&self) -> Result<ReadContext<S::Latest>, BackendError> {
        Ok(ReadContext::latest(self.store.as_ref())?)
    }

    fn history(&self) -> Result<ReadContext<S::History>, BackendError> {
        Ok(ReadContext::history(self.store.as_ref())?)
    }

    pub fn get_balance(&self, address: &Address, height: BlockNumber) -> Result<U256, BackendError> {
        debug!(%address, %height, "get_balance");
        let ctx = self.latest()?;
        ensure_latest(height)?;
        let account = ctx
            .account(address)?
            .ok_or(Missing::Account(*address))?;
        Ok(account.balance)
    }

    pub fn get_nonce(&self, address: &Address) -> Result<u64, BackendError> {
        debug!(%address, "get_nonce");
        let ctx = self.latest()?;
        let account = ctx
            .account(address)?
            .ok_or(Missing::Account(*address))?;
        Ok(account.nonce)
    }

    /// Empty code (no bytecode, zero hash) when the address has none.
    pub fn get_code(&self, address: &Address) -> Result<Code, BackendError> {
        debug!(%address, "get_code");
        let ctx = self.latest()?;
        Ok(ctx.code(address)?.unwrap_or_default())
    }

    /// Empty bytes when the account or the slot does not exist.
    pub fn get_storage_at(
        &self,
        address: &Address,
        key: &B256,
        height: BlockNumber,
    ) -> Result<Bytes, BackendError> {
        debug!(%address, %key, %height, "get_storage_at");
        let ctx = self.latest()?;
        ensure_latest(height)?;
        let Some(account) = ctx.account(address)? else {
            return Ok(Bytes::new());
        };
        Ok(ctx.storage_at(account.sequence, key)?.unwrap_or_default())
    }

    pub fn latest_height(&self) -> Result<u64, BackendError> {
        Ok(self.history()?.latest_height()?)
    }

    pub fn block_by_hash(&self, hash: &B256) -> Result<Block, BackendError> {
        let ctx = self.history()?;
        Ok(ctx.block_by_hash(hash)?.ok_or(Missing::BlockHash(*hash))?)
    }

    pub fn block_by_number(&self, height: u64) -> Result<Block, BackendError> {
        let ctx = self.history()?;
        Ok(ctx
            .block_by_height(height)?
            .ok_or(Missing::BlockHeight(height))?)
    }

    pub fn current_block(&self) -> Result<Block, BackendError> {
        let ctx = self.history()?;
        let height = ctx.latest_height()?;
        Ok(ctx
            .block_by_height(height)?
            .ok_or(Missing::BlockHeight(height))?)
    }

    /// `latest` and `pending` resolve to the latest committed height.
    pub fn header_by_number(&self, number: BlockNumber) -> Result<Header, BackendError> {
        let ctx = self.history()?;
        let height = match number {
            BlockNumber::Latest | BlockNumber::Pending => ctx.latest_height()?,
            BlockNumber::Earliest => 0,
            BlockNumber::Number(height) => height,
        };
        let block = ctx
            .block_by_height(height)?
            .ok_or(Missing::BlockHeight(height))?;
        Ok(block.header())
    }

    pub fn header_by_hash(&self, hash: &B256) -> Result<Header, BackendError> {
        Ok(self.block_by_hash(hash)?.header())
    }

    pub fn get_transaction(&self, hash: &B256) -> Result<TransactionLookup, BackendError> {
        let ctx = self.history()?;
        let record = ctx
            .tx_by_hash(hash)?
            .ok_or(Missing::Transaction(*hash))?;
        Ok(TransactionLookup {
            block_hash: record.block_hash,
            block_number: record.block_number,
            index: record.transaction_index,
            record,
        })
    }

    /// Logs in `[start, end]` matching the address set and topic matrix.
    pub fn query_logs(
        &self,
        addresses: Vec<Address>,
        topics: Vec<Vec<B256>>,
        start: u64,
        end: u64,
    ) -> Result<Vec<Log>, BackendError> {
        self.filter_logs(LogFilter::new(addresses, topics, start, end))
    }

    /// Logs of one emitter whose leading topics equal `topics` exactly.
    pub fn basic_query_logs(
        &self,
        address: Address,
        topics: &[B256],
        start: u64,
        end: u64,
    ) -> Result<Vec<Log>, BackendError> {
        self.filter_logs(LogFilter::basic(address, topics, start, end))
    }

    fn filter_logs(&self, mut filter: LogFilter) -> Result<Vec<Log>, BackendError> {
        debug!(
            addresses = filter.addresses.len(),
            topics = filter.topics.len(),
            from = filter.from_block,
            to = filter.to_block,
            "query_logs"
        );
        let ctx = self.history()?;
        filter.to_block = filter.to_block.min(ctx.latest_height()?);
        if filter.is_empty_range() {
            return Ok(Vec::new());
        }
        Ok(ctx.logs(&filter)?)
    }

    pub fn query_tx_by_src(
        &self,
        address: &Address,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, BackendError> {
        self.query_tx_by_role(address, AddressRole::Source, start, end)
    }

    pub fn query_tx_by_dst(
        &self,
        address: &Address,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, BackendError> {
        self.query_tx_by_role(address, AddressRole::Destination, start, end)
    }

    pub fn query_tx_by_addr(
        &self,
        address: &Address,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, BackendError> {
        self.query_tx_by_role(address, AddressRole::Either, start, end)
    }

    fn query_tx_by_role(
        &self,
        address: &Address,
        role: AddressRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, BackendError> {
        debug!(%address, ?role, start, end, "query_tx_by_address");
        let ctx = self.history()?;
        let end = end.min(ctx.latest_height()?);
        if start > end {
            return Ok(Vec::new());
        }
        Ok(ctx.txs_by_address(address, role, start, end)?)
    }

    pub fn get_tx_list_by_height(&self, height: u64) -> Result<Vec<TransactionRecord>, BackendError> {
        Ok(self.history()?.txs_by_height(height)?)
    }

    /// Logs of every transaction in the block, grouped per transaction in
    /// block order. Each log's transaction hash is set to its owner's.
    pub fn get_logs(&self, block_hash: &B256) -> Result<Vec<Vec<Log>>, BackendError> {
        let ctx = self.history()?;
        let block = ctx
            .block_by_hash(block_hash)?
            .ok_or(Missing::BlockHash(*block_hash))?;

        let mut groups = Vec::with_capacity(block.transactions.len());
        for tx_hash in &block.transactions {
            let Some(record) = ctx.tx_by_hash(tx_hash)? else {
                warn!(block = %block_hash, tx = %tx_hash, "block lists a transaction the store lacks");
                continue;
            };
            let logs = record
                .logs
                .into_iter()
                .map(|mut log| {
                    log.transaction_hash = *tx_hash;
                    log
                })
                .collect();
            groups.push(logs);
        }
        Ok(groups)
    }

    /// Receipt retrieval is not served; always empty.
    pub fn get_receipts(&self, block_hash: &B256) -> Result<Vec<TransactionRecord>, BackendError> {
        debug!(block = %block_hash, "get_receipts");
        let _ctx = self.history()?;
        Ok(Vec::new())
    }
}
