//! In-memory [StateStore] used by tests and local tooling.
//!
//! Committed history and the staged overlay are each held behind an `Arc`
//! and replaced copy-on-write, so an open view keeps the snapshot it was
//! opened with while writers continue.

use crate::context::{HistoryView, LatestView, Mode, StateStore, StoreView};
use crate::error::StoreError;
use meridian_types::{
    keccak256, logs_bloom, Account, Address, AddressRole, Block, Bytes, ChainEvent, Code, Log,
    LogFilter, TransactionRecord, B256,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Default)]
struct Committed {
    accounts: HashMap<Address, Account>,
    code: HashMap<Address, Code>,
    storage: HashMap<(u64, B256), Bytes>,
    blocks: BTreeMap<u64, Block>,
    heights: HashMap<B256, u64>,
    txs: HashMap<B256, TransactionRecord>,
}

impl Committed {
    fn latest(&self) -> Option<&Block> {
        self.blocks.values().next_back()
    }
}

#[derive(Clone, Default)]
struct Overlay {
    accounts: HashMap<Address, Account>,
    code: HashMap<Address, Code>,
    storage: HashMap<(u64, B256), Bytes>,
}

#[derive(Default)]
struct Inner {
    committed: Arc<Committed>,
    overlay: Arc<Overlay>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    open_readers: Arc<AtomicUsize>,
    opened: AtomicUsize,
    fail_opens: AtomicBool,
    fail_reads: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store holding only a genesis block at height 0.
    pub fn new() -> Self {
        Self::with_genesis_height(0)
    }

    pub fn with_genesis_height(height: u64) -> Self {
        let store = Self {
            inner: RwLock::new(Inner::default()),
            open_readers: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
            fail_opens: AtomicBool::new(false),
            fail_reads: Arc::new(AtomicBool::new(false)),
        };
        {
            let mut inner = store.write_inner();
            let committed = Arc::make_mut(&mut inner.committed);
            let genesis = Block {
                number: height,
                hash: block_hash(height, &B256::ZERO, &[]),
                timestamp: height,
                ..Default::default()
            };
            committed.heights.insert(genesis.hash, height);
            committed.blocks.insert(height, genesis);
        }
        store
    }

    /// Views opened and not yet closed.
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Views successfully opened over the store's lifetime.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make every read on any view (including already open ones) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn put_account(&self, account: Account) {
        let mut inner = self.write_inner();
        Arc::make_mut(&mut inner.overlay)
            .accounts
            .insert(account.address, account);
    }

    pub fn put_code(&self, address: Address, bytecode: Bytes) {
        let mut inner = self.write_inner();
        Arc::make_mut(&mut inner.overlay)
            .code
            .insert(address, Code::new(bytecode));
    }

    pub fn put_storage(&self, sequence: u64, key: B256, value: Bytes) {
        let mut inner = self.write_inner();
        Arc::make_mut(&mut inner.overlay)
            .storage
            .insert((sequence, key), value);
    }

    /// Commit `txs` as the next block and fold the staged overlay into
    /// committed state.
    ///
    /// Block number, block hash and indices are assigned here. A log's
    /// transaction hash is only filled in when left zero, so callers can
    /// store logs whose recorded owner disagrees with the transaction.
    pub fn commit_block(&self, txs: Vec<TransactionRecord>) -> ChainEvent {
        let mut inner = self.write_inner();
        let overlay = std::mem::take(Arc::make_mut(&mut inner.overlay));
        let committed = Arc::make_mut(&mut inner.committed);

        let (height, parent_hash) = match committed.latest() {
            Some(parent) => (parent.number + 1, parent.hash),
            None => (0, B256::ZERO),
        };
        let hashes: Vec<B256> = txs.iter().map(|tx| tx.hash).collect();
        let hash = block_hash(height, &parent_hash, &hashes);

        let mut cumulative_gas_used = 0u64;
        let mut log_index = 0u32;
        let mut size = 0u64;
        let mut block_logs = Vec::new();
        let mut records = Vec::with_capacity(txs.len());
        for (index, mut tx) in txs.into_iter().enumerate() {
            tx.block_number = height;
            tx.block_hash = hash;
            tx.transaction_index = index as u32;
            cumulative_gas_used = cumulative_gas_used.saturating_add(tx.gas_used);
            tx.cumulative_gas_used = cumulative_gas_used;
            size = size.saturating_add(tx.input.len() as u64);
            for log in &mut tx.logs {
                log.block_number = height;
                log.block_hash = hash;
                log.transaction_index = index as u32;
                log.log_index = log_index;
                if log.transaction_hash == B256::ZERO {
                    log.transaction_hash = tx.hash;
                }
                log_index += 1;
            }
            tx.logs_bloom = logs_bloom(&tx.logs);
            block_logs.extend(tx.logs.iter().cloned());
            records.push(tx);
        }

        let block = Block {
            number: height,
            hash,
            parent_hash,
            timestamp: height,
            size,
            gas_used: cumulative_gas_used,
            logs_bloom: logs_bloom(&block_logs),
            transactions: hashes,
            ..Default::default()
        };

        committed.accounts.extend(overlay.accounts);
        committed.code.extend(overlay.code);
        committed.storage.extend(overlay.storage);
        for tx in records {
            committed.txs.insert(tx.hash, tx);
        }
        committed.heights.insert(hash, height);
        committed.blocks.insert(height, block.clone());
        tracing::debug!(height, txs = block.transactions.len(), "committed block");

        ChainEvent::new(block, block_logs)
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(inner) => inner,
            Err(poisoned) => {
                tracing::warn!("memory store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => {
                tracing::warn!("memory store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lease(&self) -> Result<Lease, StoreError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("open failed".into()));
        }
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Lease {
            open_readers: Arc::clone(&self.open_readers),
            fail_reads: Arc::clone(&self.fail_reads),
            closed: false,
        })
    }
}

fn block_hash(height: u64, parent: &B256, txs: &[B256]) -> B256 {
    let mut preimage = Vec::with_capacity(8 + 32 * (txs.len() + 1));
    preimage.extend_from_slice(&height.to_be_bytes());
    preimage.extend_from_slice(parent.as_slice());
    for tx in txs {
        preimage.extend_from_slice(tx.as_slice());
    }
    keccak256(preimage)
}

struct Lease {
    open_readers: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    closed: bool,
}

impl Lease {
    fn check(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read failed".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_readers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MemoryLatestView {
    committed: Arc<Committed>,
    overlay: Arc<Overlay>,
    lease: Lease,
}

impl StoreView for MemoryLatestView {
    fn mode(&self) -> Mode {
        Mode::Rpc
    }

    fn close(&mut self) {
        self.lease.release();
    }
}

impl LatestView for MemoryLatestView {
    fn account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        self.lease.check()?;
        Ok(self
            .overlay
            .accounts
            .get(address)
            .or_else(|| self.committed.accounts.get(address))
            .cloned())
    }

    fn code(&self, address: &Address) -> Result<Option<Code>, StoreError> {
        self.lease.check()?;
        Ok(self
            .overlay
            .code
            .get(address)
            .or_else(|| self.committed.code.get(address))
            .cloned())
    }

    fn storage_at(&self, sequence: u64, key: &B256) -> Result<Option<Bytes>, StoreError> {
        self.lease.check()?;
        let slot = (sequence, *key);
        Ok(self
            .overlay
            .storage
            .get(&slot)
            .or_else(|| self.committed.storage.get(&slot))
            .cloned())
    }
}

pub struct MemoryHistoryView {
    committed: Arc<Committed>,
    lease: Lease,
}

impl MemoryHistoryView {
    fn block_txs<'a>(&'a self, block: &'a Block) -> impl Iterator<Item = &'a TransactionRecord> {
        block
            .transactions
            .iter()
            .filter_map(|hash| self.committed.txs.get(hash))
    }
}

impl StoreView for MemoryHistoryView {
    fn mode(&self) -> Mode {
        Mode::HistoryOnly
    }

    fn close(&mut self) {
        self.lease.release();
    }
}

impl HistoryView for MemoryHistoryView {
    fn latest_height(&self) -> Result<u64, StoreError> {
        self.lease.check()?;
        self.committed
            .latest()
            .map(|block| block.number)
            .ok_or_else(|| StoreError::Corrupted("no genesis block".into()))
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        self.lease.check()?;
        Ok(self.committed.blocks.get(&height).cloned())
    }

    fn block_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError> {
        self.lease.check()?;
        Ok(self
            .committed
            .heights
            .get(hash)
            .and_then(|height| self.committed.blocks.get(height))
            .cloned())
    }

    fn tx_by_hash(&self, hash: &B256) -> Result<Option<TransactionRecord>, StoreError> {
        self.lease.check()?;
        Ok(self.committed.txs.get(hash).cloned())
    }

    fn txs_by_height(&self, height: u64) -> Result<Vec<TransactionRecord>, StoreError> {
        self.lease.check()?;
        Ok(match self.committed.blocks.get(&height) {
            Some(block) => self.block_txs(block).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn txs_by_address(
        &self,
        address: &Address,
        role: AddressRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.lease.check()?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .committed
            .blocks
            .range(start..=end)
            .flat_map(|(_, block)| self.block_txs(block))
            .filter(|tx| tx.involves(address, role))
            .cloned()
            .collect())
    }

    fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StoreError> {
        self.lease.check()?;
        if filter.is_empty_range() {
            return Ok(Vec::new());
        }
        Ok(self
            .committed
            .blocks
            .range(filter.from_block..=filter.to_block)
            .filter(|(_, block)| filter.matches_bloom(&block.logs_bloom))
            .flat_map(|(_, block)| self.block_txs(block))
            .flat_map(|tx| tx.logs.iter())
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }
}

impl StateStore for MemoryStore {
    type Latest = MemoryLatestView;
    type History = MemoryHistoryView;

    fn open_latest(&self) -> Result<Self::Latest, StoreError> {
        let lease = self.lease()?;
        let inner = self.read_inner();
        Ok(MemoryLatestView {
            committed: Arc::clone(&inner.committed),
            overlay: Arc::clone(&inner.overlay),
            lease,
        })
    }

    fn open_history(&self) -> Result<Self::History, StoreError> {
        let lease = self.lease()?;
        let inner = self.read_inner();
        Ok(MemoryHistoryView {
            committed: Arc::clone(&inner.committed),
            lease,
        })
    }
}
