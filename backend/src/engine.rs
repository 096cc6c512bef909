//! Interfaces consumed from the consensus and execution engines.

use crate::context::LatestView;
use meridian_types::{Address, Bytes, CallRequest};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Response code meaning the transaction was admitted.
pub const CODE_TYPE_OK: u32 = 0;

/// Outcome of a mempool admission check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckTxResponse {
    pub code: u32,
    pub data: Bytes,
    pub log: String,
    pub info: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub codespace: String,
}

impl CheckTxResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn rejected(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_TYPE_OK
    }
}

impl fmt::Display for CheckTxResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={} log={:?}", self.code, self.log)?;
        if !self.info.is_empty() {
            write!(f, " info={:?}", self.info)?;
        }
        if !self.codespace.is_empty() {
            write!(f, " codespace={}", self.codespace)?;
        }
        Ok(())
    }
}

/// Completion handed to [ConsensusEngine::check_tx]. Being `FnOnce`, it can
/// deliver at most one response.
pub type CheckTxCallback = Box<dyn FnOnce(CheckTxResponse) + Send + 'static>;

/// Intake failures raised before a transaction reaches the admission check.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("mempool is full ({size}/{max})")]
    MempoolFull { size: usize, max: usize },
    #[error("transaction too large ({size} > {max} bytes)")]
    TxTooLarge { size: usize, max: usize },
    #[error("consensus engine closed")]
    Closed,
    #[error("admission callback dropped without a response")]
    CallbackDropped,
    #[error("intake failed: {0}")]
    Intake(String),
}

pub trait ConsensusEngine: Send + Sync + 'static {
    /// Queue `tx` for admission. An `Err` means the callback will never run;
    /// `Ok` means it runs exactly once, possibly on another task.
    fn check_tx(&self, tx: Bytes, callback: CheckTxCallback) -> Result<(), EngineError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Single speculative execution.
    Call,
    /// Search for the smallest gas limit that succeeds.
    EstimateGas,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: i32,
    pub output: Bytes,
    pub gas_used: u64,
}

pub trait Executor: Send + Sync + 'static {
    /// Run `tx` against `state` without committing anything. Failures are
    /// reported through `status`, not as errors.
    fn run_tx_for_rpc(
        &self,
        state: &dyn LatestView,
        tx: &CallRequest,
        sender: Address,
        mode: RunMode,
    ) -> ExecutionResult;
}
