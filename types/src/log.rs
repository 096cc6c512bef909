use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use serde::{Deserialize, Serialize};

/// A log entry emitted by a committed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub transaction_index: u32,
    pub log_index: u32,
    /// Set when the log was dropped by a chain reorganisation.
    pub removed: bool,
}

impl Log {
    pub fn accrue(&self, bloom: &mut Bloom) {
        bloom.accrue(BloomInput::Raw(self.address.as_slice()));
        for topic in &self.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
}

/// Bloom digest over the addresses and topics of `logs`.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::default();
    for log in logs {
        log.accrue(&mut bloom);
    }
    bloom
}

/// Criteria for log queries over an inclusive height range.
///
/// An empty `addresses` list matches every emitter. `topics[i]` constrains the
/// log's i-th topic: an empty list is a wildcard, otherwise any listed value
/// matches. A log with fewer topics than there are positions never matches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    pub topics: Vec<Vec<B256>>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn new(
        addresses: Vec<Address>,
        topics: Vec<Vec<B256>>,
        from_block: u64,
        to_block: u64,
    ) -> Self {
        Self {
            addresses,
            topics,
            from_block,
            to_block,
        }
    }

    /// Single emitter, every position pinned to exactly one topic.
    pub fn basic(address: Address, topics: &[B256], from_block: u64, to_block: u64) -> Self {
        Self {
            addresses: vec![address],
            topics: topics.iter().map(|topic| vec![*topic]).collect(),
            from_block,
            to_block,
        }
    }

    pub fn is_empty_range(&self) -> bool {
        self.from_block > self.to_block
    }

    pub fn contains_height(&self, height: u64) -> bool {
        self.from_block <= height && height <= self.to_block
    }

    pub fn matches(&self, log: &Log) -> bool {
        if !self.contains_height(log.block_number) {
            return false;
        }
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        if self.topics.len() > log.topics.len() {
            return false;
        }
        self.topics
            .iter()
            .zip(&log.topics)
            .all(|(wanted, topic)| wanted.is_empty() || wanted.contains(topic))
    }

    /// Cheap pre-check against a block's bloom. `false` means no log in the
    /// block can match; `true` is only a maybe.
    pub fn matches_bloom(&self, bloom: &Bloom) -> bool {
        let address_hit = self.addresses.is_empty()
            || self
                .addresses
                .iter()
                .any(|address| bloom.contains_input(BloomInput::Raw(address.as_slice())));
        address_hit
            && self.topics.iter().all(|wanted| {
                wanted.is_empty()
                    || wanted
                        .iter()
                        .any(|topic| bloom.contains_input(BloomInput::Raw(topic.as_slice())))
            })
    }
}
