use crate::engine::{CheckTxCallback, ConsensusEngine, EngineError};
use crate::error::BackendError;
use crate::metrics::BackendMetrics;
use futures::channel::oneshot;
use meridian_types::{keccak256, Bytes, B256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns the engine's callback-based admission into one awaited call.
pub struct SubmissionBridge<C> {
    engine: Arc<C>,
    metrics: Arc<BackendMetrics>,
}

impl<C: ConsensusEngine> SubmissionBridge<C> {
    pub fn new(engine: Arc<C>, metrics: Arc<BackendMetrics>) -> Self {
        Self { engine, metrics }
    }

    pub fn engine(&self) -> &Arc<C> {
        &self.engine
    }

    /// Submit a signed transaction and wait for the admission verdict.
    ///
    /// Resolves to the keccak-256 hash of `tx` once the engine admits it.
    /// There is no timeout: an engine that holds the callback without ever
    /// firing it keeps this future pending. Dropping the future abandons the
    /// wait but not the submission.
    pub async fn send_raw_tx(&self, tx: Bytes) -> Result<B256, BackendError> {
        let hash = keccak256(&tx);
        let (sender, receiver) = oneshot::channel();
        let callback: CheckTxCallback = Box::new(move |response| {
            if sender.send(response).is_err() {
                debug!(%hash, "submitter went away before admission result");
            }
        });

        if let Err(err) = self.engine.check_tx(tx, callback) {
            self.metrics.inc_submission_unavailable();
            warn!(%hash, %err, "transaction intake failed");
            return Err(BackendError::EngineUnavailable(err));
        }

        let response = match receiver.await {
            Ok(response) => response,
            Err(oneshot::Canceled) => {
                self.metrics.inc_submission_unavailable();
                warn!(%hash, "admission callback dropped without a response");
                return Err(BackendError::EngineUnavailable(EngineError::CallbackDropped));
            }
        };

        if !response.is_ok() {
            self.metrics.inc_submission_rejected();
            info!(%hash, code = response.code, log = %response.log, "transaction rejected");
            return Err(BackendError::EngineRejected(response));
        }
        self.metrics.inc_submission_accepted();
        debug!(%hash, "transaction admitted");
        Ok(hash)
    }
}
