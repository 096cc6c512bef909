use alloy_primitives::{Address, Bloom, B256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Height selector accepted by height-parameterised queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlockNumber {
    #[default]
    Latest,
    Pending,
    Earliest,
    Number(u64),
}

impl BlockNumber {
    pub const fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl From<u64> for BlockNumber {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Pending => f.write_str("pending"),
            Self::Earliest => f.write_str("earliest"),
            Self::Number(number) => write!(f, "{number:#x}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BlockNumberError {
    #[error("empty block number")]
    Empty,
    #[error("invalid block number: {0}")]
    Invalid(String),
}

impl FromStr for BlockNumber {
    type Err = BlockNumberError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value {
            "" => Err(BlockNumberError::Empty),
            "latest" => Ok(Self::Latest),
            "pending" => Ok(Self::Pending),
            "earliest" => Ok(Self::Earliest),
            _ => {
                let parsed = match value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => value.parse::<u64>(),
                };
                parsed
                    .map(Self::Number)
                    .map_err(|_| BlockNumberError::Invalid(value.to_string()))
            }
        }
    }
}

impl Serialize for BlockNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(number) => Ok(Self::Number(number)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A committed block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub miner: Address,
    pub timestamp: u64,
    pub size: u64,
    pub gas_used: u64,
    pub state_root: B256,
    pub logs_bloom: Bloom,
    /// Transaction hashes in commit order.
    pub transactions: Vec<B256>,
}

impl Block {
    pub fn header(&self) -> Header {
        Header {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            logs_bloom: self.logs_bloom,
        }
    }
}

/// The subset of a block that header lookups return.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub logs_bloom: Bloom,
}
