//! Scoped, mode-specific handles over the state store.
//!
//! A [ReadContext] wraps exactly one view. Latest views expose account state
//! (committed state plus the node's staged overlay); history views expose
//! committed blocks, transactions and logs. The two capability sets live on
//! different traits, so asking a history context for a balance does not
//! compile. The view is released exactly once: on [ReadContext::close] or,
//! failing that, when the context is dropped (early return or unwind).

use crate::error::StoreError;
use meridian_types::{
    Account, Address, AddressRole, Block, Bytes, Code, Log, LogFilter, TransactionRecord, B256,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Latest committed state plus uncommitted local writes.
    Rpc,
    /// Committed history only.
    HistoryOnly,
}

/// Handle shared by both view kinds.
pub trait StoreView: Send {
    fn mode(&self) -> Mode;

    /// Release the underlying store handle. Called at most once.
    fn close(&mut self);
}

pub trait LatestView: StoreView {
    fn account(&self, address: &Address) -> Result<Option<Account>, StoreError>;

    fn code(&self, address: &Address) -> Result<Option<Code>, StoreError>;

    /// Storage is keyed by the account's sequence, not its address.
    fn storage_at(&self, sequence: u64, key: &B256) -> Result<Option<Bytes>, StoreError>;
}

pub trait HistoryView: StoreView {
    fn latest_height(&self) -> Result<u64, StoreError>;

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError>;

    fn block_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError>;

    fn tx_by_hash(&self, hash: &B256) -> Result<Option<TransactionRecord>, StoreError>;

    /// Transactions committed at `height`, in commit order.
    fn txs_by_height(&self, height: u64) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Transactions in `[start, end]` where `address` plays `role`.
    fn txs_by_address(
        &self,
        address: &Address,
        role: AddressRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StoreError>;
}

/// Source of read views. Implementations must give every view a stable
/// snapshot: a commit that lands while a view is open is not visible to it.
pub trait StateStore: Send + Sync + 'static {
    type Latest: LatestView;
    type History: HistoryView;

    fn open_latest(&self) -> Result<Self::Latest, StoreError>;

    fn open_history(&self) -> Result<Self::History, StoreError>;
}

pub struct ReadContext<V: StoreView> {
    view: V,
    closed: bool,
}

impl<V: StoreView> ReadContext<V> {
    fn new(view: V) -> Self {
        tracing::trace!(mode = ?view.mode(), "opened read context");
        Self {
            view,
            closed: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.view.mode()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.view.close();
        tracing::trace!(mode = ?self.view.mode(), "closed read context");
    }
}

impl<V: StoreView> Drop for ReadContext<V> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<L: LatestView> ReadContext<L> {
    pub fn latest<S>(store: &S) -> Result<Self, StoreError>
    where
        S: StateStore<Latest = L>,
    {
        Ok(Self::new(store.open_latest()?))
    }

    pub fn account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        self.view.account(address)
    }

    pub fn code(&self, address: &Address) -> Result<Option<Code>, StoreError> {
        self.view.code(address)
    }

    pub fn storage_at(&self, sequence: u64, key: &B256) -> Result<Option<Bytes>, StoreError> {
        self.view.storage_at(sequence, key)
    }
}

impl<H: HistoryView> ReadContext<H> {
    pub fn history<S>(store: &S) -> Result<Self, StoreError>
    where
        S: StateStore<History = H>,
    {
        Ok(Self::new(store.open_history()?))
    }

    pub fn latest_height(&self) -> Result<u64, StoreError> {
        self.view.latest_height()
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        self.view.block_by_height(height)
    }

    pub fn block_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError> {
        self.view.block_by_hash(hash)
    }

    pub fn tx_by_hash(&self, hash: &B256) -> Result<Option<TransactionRecord>, StoreError> {
        self.view.tx_by_hash(hash)
    }

    pub fn txs_by_height(&self, height: u64) -> Result<Vec<TransactionRecord>, StoreError> {
        self.view.txs_by_height(height)
    }

    pub fn txs_by_address(
        &self,
        address: &Address,
        role: AddressRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.view.txs_by_address(address, role, start, end)
    }

    pub fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StoreError> {
        self.view.logs(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use meridian_types::U256;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn close_releases_once() {
        let store = MemoryStore::new();
        let ctx = ReadContext::latest(&store).unwrap();
        assert_eq!(ctx.mode(), Mode::Rpc);
        assert_eq!(store.open_readers(), 1);
        ctx.close();
        assert_eq!(store.open_readers(), 0);
    }

    #[test]
    fn drop_releases_on_early_return() {
        let store = MemoryStore::new();
        fn read(store: &MemoryStore) -> Result<u64, StoreError> {
            let ctx = ReadContext::history(store)?;
            assert_eq!(ctx.mode(), Mode::HistoryOnly);
            Err::<(), _>(StoreError::Unavailable("boom".into()))?;
            ctx.latest_height()
        }
        assert!(read(&store).is_err());
        assert_eq!(store.open_readers(), 0);
    }

    #[test]
    fn drop_releases_on_unwind() {
        let store = MemoryStore::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ctx = ReadContext::latest(&store).unwrap();
            panic!("reader failed");
        }));
        assert!(result.is_err());
        assert_eq!(store.open_readers(), 0);
    }

    #[test]
    fn views_keep_their_snapshot() {
        let store = MemoryStore::new();
        let address = Address::repeat_byte(1);

        let before = ReadContext::latest(&store).unwrap();
        store.put_account(Account::new(address, 1, U256::from(5), 1));
        assert!(before.account(&address).unwrap().is_none());
        before.close();

        let after = ReadContext::latest(&store).unwrap();
        assert!(after.account(&address).unwrap().is_some());
        after.close();

        let history = ReadContext::history(&store).unwrap();
        let height = history.latest_height().unwrap();
        store.commit_block(vec![]);
        assert_eq!(history.latest_height().unwrap(), height);
        assert!(history.block_by_height(height + 1).unwrap().is_none());
    }

    #[test]
    fn open_failure_leaves_nothing_open() {
        let store = MemoryStore::new();
        store.fail_opens(true);
        assert!(ReadContext::history(&store).is_err());
        assert_eq!(store.open_readers(), 0);
    }
}
