//! Ledger configuration.

use serde::Deserialize;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, MAX_DIFFICULTY, MAX_TRANSACTIONS_PER_BLOCK,
};
use crate::error::{LedgerError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStrategy {
    #[default]
    Sequential,
    Parallel,
}

impl FromStr for MiningStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown mining strategy `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LedgerConfig {
    /// Required leading zero hex digits.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
    /// Pool transactions per block, excluding the reward. 0 means no cap.
    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,
    /// When false, mining an empty pool fails with `EmptyPool`.
    #[serde(default = "default_allow_empty_blocks")]
    pub allow_empty_blocks: bool,
    #[serde(default = "default_max_nonce")]
    pub max_nonce: u64,
    #[serde(default)]
    pub mining: MiningStrategy,
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> f64 {
    DEFAULT_MINING_REWARD
}

fn default_max_block_transactions() -> usize {
    MAX_TRANSACTIONS_PER_BLOCK
}

fn default_allow_empty_blocks() -> bool {
    true
}

fn default_max_nonce() -> u64 {
    u64::MAX
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            max_block_transactions: default_max_block_transactions(),
            allow_empty_blocks: default_allow_empty_blocks(),
            max_nonce: default_max_nonce(),
            mining: MiningStrategy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        check_difficulty(self.difficulty)?;
        if !self.mining_reward.is_finite() {
            return Err(LedgerError::MalformedTransaction(format!(
                "mining reward {} is not finite",
                self.mining_reward
            )));
        }
        Ok(())
    }

    pub fn block_cap(&self) -> Option<usize> {
        (self.max_block_transactions > 0).then_some(self.max_block_transactions)
    }
}

pub(crate) fn check_difficulty(difficulty: u32) -> Result<()> {
    if (1..=MAX_DIFFICULTY).contains(&difficulty) {
        Ok(())
    } else {
        Err(LedgerError::InvalidDifficulty(difficulty))
    }
}
