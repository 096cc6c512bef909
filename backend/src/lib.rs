//! Query, submission and subscription backend.
//!
//! [Backend] bundles the pieces callers talk to: a [QueryService] for chain
//! reads, a [SubmissionBridge] that awaits the consensus engine's admission
//! verdict, an [ExecutionProxy] for non-committing calls and [EventFeeds]
//! for push notifications. The store, consensus engine and executor are
//! supplied by the embedding node through the traits in [context] and
//! [engine].

pub mod apis;
pub mod config;
pub mod context;
pub mod engine;
mod error;
pub mod execution;
pub mod feeds;
mod metrics;
pub mod query;
mod submission;

#[cfg(any(test, feature = "mocks"))]
pub mod memory;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use config::{Config, ConfigError, ValidatedConfig};
pub use context::{HistoryView, LatestView, Mode, ReadContext, StateStore, StoreView};
pub use engine::{
    CheckTxCallback, CheckTxResponse, ConsensusEngine, EngineError, ExecutionResult, Executor,
    RunMode, CODE_TYPE_OK,
};
pub use error::{BackendError, Missing, StoreError};
pub use execution::{CallOutcome, ExecutionProxy, GasEstimate};
pub use feeds::{EventFeeds, Feed, Subscription};
pub use metrics::{BackendMetrics, BackendMetricsSnapshot};
pub use query::{QueryService, TransactionLookup};
pub use submission::SubmissionBridge;

use meridian_types::U256;
use std::sync::Arc;

pub struct Backend<S, C, X> {
    config: ValidatedConfig,
    query: QueryService<S>,
    submission: SubmissionBridge<C>,
    execution: ExecutionProxy<S, X>,
    feeds: Arc<EventFeeds>,
    metrics: Arc<BackendMetrics>,
}

impl<S: StateStore, C: ConsensusEngine, X: Executor> Backend<S, C, X> {
    pub fn new(config: ValidatedConfig, store: Arc<S>, engine: Arc<C>, executor: Arc<X>) -> Self {
        let metrics = Arc::new(BackendMetrics::default());
        let feeds = Arc::new(EventFeeds::new(
            config.subscriber_buffer.get(),
            Arc::clone(&metrics),
        ));
        Self::with_feeds(config, store, engine, executor, feeds, metrics)
    }

    /// Build around existing feeds, for engines that publish to them too.
    pub fn with_feeds(
        config: ValidatedConfig,
        store: Arc<S>,
        engine: Arc<C>,
        executor: Arc<X>,
        feeds: Arc<EventFeeds>,
        metrics: Arc<BackendMetrics>,
    ) -> Self {
        tracing::info!(
            chain_id = config.chain_id.get(),
            protocol_version = config.protocol_version,
            "backend ready"
        );
        Self {
            query: QueryService::new(Arc::clone(&store)),
            submission: SubmissionBridge::new(engine, Arc::clone(&metrics)),
            execution: ExecutionProxy::new(store, executor),
            feeds,
            metrics,
            config,
        }
    }

    pub fn chain_id(&self) -> U256 {
        U256::from(self.config.chain_id.get())
    }

    pub fn protocol_version(&self) -> u64 {
        self.config.protocol_version
    }

    /// Bloom section size and the number of processed sections. Sectioned
    /// bloom indexing is not maintained, so the second value is always zero.
    pub fn bloom_status(&self) -> (u64, u64) {
        (self.config.bloom_section_size.get(), 0)
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn query(&self) -> &QueryService<S> {
        &self.query
    }

    pub fn submission(&self) -> &SubmissionBridge<C> {
        &self.submission
    }

    pub fn execution(&self) -> &ExecutionProxy<S, X> {
        &self.execution
    }

    pub fn feeds(&self) -> &Arc<EventFeeds> {
        &self.feeds
    }

    pub fn metrics(&self) -> BackendMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests;
