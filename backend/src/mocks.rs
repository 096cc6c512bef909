//! Stand-in consensus and execution engines for tests and local tooling.

use crate::context::LatestView;
use crate::engine::{
    CheckTxCallback, CheckTxResponse, ConsensusEngine, EngineError, ExecutionResult, Executor,
    RunMode,
};
use crate::feeds::EventFeeds;
use meridian_types::{
    keccak256, Address, Bytes, CallRequest, NewTxsEvent, PendingTransaction, B256, U256,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Code returned for a transaction the pool has already seen.
pub const CODE_TX_IN_CACHE: u32 = 19;

pub const DEFAULT_MAX_POOL_SIZE: usize = 5_000;
pub const DEFAULT_MAX_TX_BYTES: usize = 128 * 1024;

#[derive(Default)]
struct Pool {
    seen: HashSet<B256>,
    pending: Vec<PendingTransaction>,
    forced: Option<CheckTxResponse>,
}

/// Mempool that admits each distinct payload once.
///
/// Verdicts are delivered from a spawned task when a tokio runtime is
/// available, inline otherwise.
pub struct MockEngine {
    pool: Mutex<Pool>,
    max_pool_size: usize,
    max_tx_bytes: usize,
    feeds: Option<Arc<EventFeeds>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOL_SIZE)
    }
}

impl MockEngine {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            pool: Mutex::new(Pool::default()),
            max_pool_size,
            max_tx_bytes: DEFAULT_MAX_TX_BYTES,
            feeds: None,
        }
    }

    /// Publish admitted transactions on the new-txs feed.
    pub fn with_feeds(mut self, feeds: Arc<EventFeeds>) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn with_max_tx_bytes(mut self, max_tx_bytes: usize) -> Self {
        self.max_tx_bytes = max_tx_bytes;
        self
    }

    /// Answer the next admission check with `response` instead of admitting.
    pub fn reject_next(&self, response: CheckTxResponse) {
        self.lock().forced = Some(response);
    }

    pub fn pool_size(&self) -> usize {
        self.lock().pending.len()
    }

    /// Take every pending transaction in admission order.
    pub fn drain(&self) -> Vec<PendingTransaction> {
        std::mem::take(&mut self.lock().pending)
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        match self.pool.lock() {
            Ok(pool) => pool,
            Err(poisoned) => {
                tracing::warn!("mock engine pool lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl ConsensusEngine for MockEngine {
    fn check_tx(&self, tx: Bytes, callback: CheckTxCallback) -> Result<(), EngineError> {
        if tx.len() > self.max_tx_bytes {
            return Err(EngineError::TxTooLarge {
                size: tx.len(),
                max: self.max_tx_bytes,
            });
        }

        let hash = keccak256(&tx);
        let (response, admitted) = {
            let mut pool = self.lock();
            if pool.pending.len() >= self.max_pool_size {
                return Err(EngineError::MempoolFull {
                    size: pool.pending.len(),
                    max: self.max_pool_size,
                });
            }
            if let Some(forced) = pool.forced.take() {
                (forced, None)
            } else if !pool.seen.insert(hash) {
                (
                    CheckTxResponse::rejected(CODE_TX_IN_CACHE, "tx already exists in cache"),
                    None,
                )
            } else {
                let pending = PendingTransaction { hash, raw: tx };
                pool.pending.push(pending.clone());
                (CheckTxResponse::ok(), Some(pending))
            }
        };

        if let (Some(pending), Some(feeds)) = (admitted, &self.feeds) {
            feeds.publish_new_txs(NewTxsEvent { txs: vec![pending] });
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { callback(response) });
            }
            Err(_) => callback(response),
        }
        Ok(())
    }
}

pub const STATUS_SUCCESS: i32 = 0;
pub const STATUS_FAILED: i32 = 1;
pub const STATUS_REVERTED: i32 = 2;
pub const STATUS_OUT_OF_GAS: i32 = 3;
pub const STATUS_INSUFFICIENT_BALANCE: i32 = 4;

pub const TX_GAS: u64 = 21_000;
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const DEFAULT_GAS_CAP: u64 = 50_000_000;

const REVERT_OPCODE: u8 = 0xfd;

/// Deterministic executor with a flat gas model.
///
/// A call costs its intrinsic gas plus, when the target has code, a fixed
/// access charge and three gas per code byte. Code starting with `REVERT`
/// always reverts.
pub struct MockExecutor {
    gas_cap: u64,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_CAP)
    }
}

fn failure(status: i32, message: &str) -> ExecutionResult {
    ExecutionResult {
        status,
        output: Bytes::copy_from_slice(message.as_bytes()),
        gas_used: 0,
    }
}

pub fn intrinsic_gas(tx: &CallRequest) -> u64 {
    let base = if tx.to.is_some() {
        TX_GAS
    } else {
        TX_GAS_CONTRACT_CREATION
    };
    tx.input.iter().fold(base, |gas, byte| {
        gas.saturating_add(if *byte == 0 {
            TX_DATA_ZERO_GAS
        } else {
            TX_DATA_NON_ZERO_GAS
        })
    })
}

impl MockExecutor {
    pub fn new(gas_cap: u64) -> Self {
        Self { gas_cap }
    }

    fn execute(
        &self,
        state: &dyn LatestView,
        tx: &CallRequest,
        sender: Address,
        gas_limit: u64,
    ) -> ExecutionResult {
        let balance = match state.account(&sender) {
            Ok(account) => account.map(|account| account.balance).unwrap_or_default(),
            Err(err) => return failure(STATUS_FAILED, &err.to_string()),
        };
        let fee = U256::from(gas_limit).saturating_mul(tx.gas_price.unwrap_or_default());
        if balance < tx.value.saturating_add(fee) {
            return failure(STATUS_INSUFFICIENT_BALANCE, "insufficient balance for transfer");
        }

        let mut required = intrinsic_gas(tx);
        let mut output = Bytes::new();
        if let Some(to) = tx.to {
            let code = match state.code(&to) {
                Ok(code) => code.unwrap_or_default(),
                Err(err) => return failure(STATUS_FAILED, &err.to_string()),
            };
            if !code.is_empty() {
                required = required
                    .saturating_add(2_600)
                    .saturating_add(3 * code.bytecode.len() as u64);
                if gas_limit >= required && code.bytecode.first() == Some(&REVERT_OPCODE) {
                    return ExecutionResult {
                        status: STATUS_REVERTED,
                        output: Bytes::from_static(b"execution reverted"),
                        gas_used: required,
                    };
                }
                output = Bytes::from(keccak256(&tx.input).to_vec());
            }
        }
        if gas_limit < required {
            return ExecutionResult {
                status: STATUS_OUT_OF_GAS,
                output: Bytes::from_static(b"out of gas"),
                gas_used: gas_limit,
            };
        }
        ExecutionResult {
            status: STATUS_SUCCESS,
            output,
            gas_used: required,
        }
    }

    fn estimate(&self, state: &dyn LatestView, tx: &CallRequest, sender: Address) -> ExecutionResult {
        let mut hi = tx.gas.unwrap_or(self.gas_cap).min(self.gas_cap);
        if let Some(price) = tx.gas_price.filter(|price| !price.is_zero()) {
            let balance = match state.account(&sender) {
                Ok(account) => account.map(|account| account.balance).unwrap_or_default(),
                Err(err) => return failure(STATUS_FAILED, &err.to_string()),
            };
            let Some(available) = balance.checked_sub(tx.value) else {
                return failure(STATUS_INSUFFICIENT_BALANCE, "insufficient balance for transfer");
            };
            let allowance = available / price;
            if allowance < U256::from(hi) {
                hi = allowance.to::<u64>();
            }
        }

        let capped = self.execute(state, tx, sender, hi);
        if capped.status != STATUS_SUCCESS {
            return capped;
        }

        let mut lo = intrinsic_gas(tx).saturating_sub(1);
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if self.execute(state, tx, sender, mid).status == STATUS_SUCCESS {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        ExecutionResult {
            status: STATUS_SUCCESS,
            output: capped.output,
            gas_used: hi,
        }
    }
}

impl Executor for MockExecutor {
    fn run_tx_for_rpc(
        &self,
        state: &dyn LatestView,
        tx: &CallRequest,
        sender: Address,
        mode: RunMode,
    ) -> ExecutionResult {
        match mode {
            RunMode::Call => {
                let gas_limit = tx.gas.unwrap_or(self.gas_cap).min(self.gas_cap);
                self.execute(state, tx, sender, gas_limit)
            }
            RunMode::EstimateGas => self.estimate(state, tx, sender),
        }
    }
}
