use crate::context::{LatestView, ReadContext, StateStore};
use crate::engine::{ExecutionResult, Executor, RunMode};
use crate::error::BackendError;
use meridian_types::{Address, Bytes, CallRequest};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: i32,
    pub output: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasEstimate {
    pub status: i32,
    pub output: Bytes,
    pub gas: u64,
}

/// Runs non-committing executions against latest state.
pub struct ExecutionProxy<S, X> {
    store: Arc<S>,
    executor: Arc<X>,
}

impl<S: StateStore, X: Executor> ExecutionProxy<S, X> {
    pub fn new(store: Arc<S>, executor: Arc<X>) -> Self {
        Self { store, executor }
    }

    pub fn call(&self, tx: &CallRequest, sender: Address) -> Result<CallOutcome, BackendError> {
        let result = self.run(tx, sender, RunMode::Call)?;
        Ok(CallOutcome {
            status: result.status,
            output: result.output,
        })
    }

    pub fn estimate_gas(
        &self,
        tx: &CallRequest,
        sender: Address,
    ) -> Result<GasEstimate, BackendError> {
        let result = self.run(tx, sender, RunMode::EstimateGas)?;
        Ok(GasEstimate {
            status: result.status,
            output: result.output,
            gas: result.gas_used,
        })
    }

    fn run(
        &self,
        tx: &CallRequest,
        sender: Address,
        mode: RunMode,
    ) -> Result<ExecutionResult, BackendError> {
        let ctx = ReadContext::latest(self.store.as_ref())?;
        let state: &dyn LatestView = ctx.view();
        let result = self.executor.run_tx_for_rpc(state, tx, sender, mode);
        tracing::debug!(
            %sender,
            ?mode,
            status = result.status,
            gas_used = result.gas_used,
            "executed rpc transaction"
        );
        ctx.close();
        Ok(result)
    }
}
