//! Payloads pushed to feed subscribers.

use crate::{block::Block, log::Log, transaction::PendingTransaction};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Published once per committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub block: Block,
    pub hash: B256,
    pub logs: Vec<Log>,
}

impl ChainEvent {
    pub fn new(block: Block, logs: Vec<Log>) -> Self {
        Self {
            hash: block.hash,
            block,
            logs,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTxsEvent {
    pub txs: Vec<PendingTransaction>,
}

/// Logs invalidated by a reorganisation. Each carries `removed = true`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedLogsEvent {
    pub logs: Vec<Log>,
}

impl RemovedLogsEvent {
    pub fn new(logs: Vec<Log>) -> Self {
        let logs = logs
            .into_iter()
            .map(|mut log| {
                log.removed = true;
                log
            })
            .collect();
        Self { logs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_event_hash_tracks_block() {
        let block = Block {
            number: 3,
            hash: B256::repeat_byte(7),
            ..Default::default()
        };
        let event = ChainEvent::new(block, vec![]);
        assert_eq!(event.hash, B256::repeat_byte(7));
        assert_eq!(event.block.number, 3);
    }

    #[test]
    fn removed_logs_are_flagged() {
        let event = RemovedLogsEvent::new(vec![Log::default(), Log::default()]);
        assert_eq!(event.logs.len(), 2);
        assert!(event.logs.iter().all(|log| log.removed));
    }
}
