use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod mine;
pub mod pool;

pub use chain::{ChainFault, ChainSnapshot, ChainStats, FaultReason, Ledger};
pub use config::{LedgerConfig, MiningStrategy};
pub use error::{LedgerError, Result};
pub use pool::TransactionPool;

use constants::REWARD_SENDER;

/// Seconds since the UNIX epoch, with sub-second precision.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    #[serde(default)]
    pub fee: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            fee: 0.0,
        }
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    /// The payout transaction appended to every pool-mined block.
    pub fn reward(miner: impl Into<String>, amount: f64) -> Self {
        Self::new(REWARD_SENDER, miner, amount)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Field-level well-formedness; balances are not consulted.
    pub fn check(&self) -> Result<()> {
        if self.sender.trim().is_empty() {
            return Err(LedgerError::MalformedTransaction("empty sender".into()));
        }
        if self.recipient.trim().is_empty() {
            return Err(LedgerError::MalformedTransaction("empty recipient".into()));
        }
        if !self.amount.is_finite() {
            return Err(LedgerError::MalformedTransaction(format!(
                "amount {} is not finite",
                self.amount
            )));
        }
        if !self.fee.is_finite() || self.fee < 0.0 {
            return Err(LedgerError::MalformedTransaction(format!(
                "fee {} must be finite and non-negative",
                self.fee
            )));
        }
        Ok(())
    }
}

/// Block contents: either pooled transactions or free-form demo data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Transactions(Vec<Transaction>),
    Data(String),
}

impl Payload {
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            Payload::Transactions(txs) => txs,
            Payload::Data(_) => &[],
        }
    }
}

impl From<&str> for Payload {
    fn from(data: &str) -> Self {
        Payload::Data(data.to_string())
    }
}

impl From<String> for Payload {
    fn from(data: String) -> Self {
        Payload::Data(data)
    }
}

impl From<Vec<Transaction>> for Payload {
    fn from(txs: Vec<Transaction>) -> Self {
        Payload::Transactions(txs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub data: Payload,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Unmined candidate: nonce 0 and a hash matching its current fields.
    pub fn new(index: u64, data: Payload, previous_hash: impl Into<String>, timestamp: f64) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn compute_hash(&self) -> String {
        calculate_hash(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.data.transactions()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

#[derive(Serialize)]
struct HeaderFields<'a> {
    index: u64,
    timestamp: f64,
    data: &'a Payload,
    previous_hash: &'a str,
}

/// Canonical hashing input with everything but the nonce pre-serialized.
///
/// The canonical form is the compact JSON object
/// `{"index":..,"timestamp":..,"data":..,"previous_hash":..,"nonce":..}`.
#[derive(Clone, Debug)]
pub struct HashTemplate {
    prefix: Vec<u8>,
}

impl HashTemplate {
    pub fn new(index: u64, timestamp: f64, data: &Payload, previous_hash: &str) -> Self {
        // String keys and no maps; serde_json writes non-finite floats as
        // `null`, so this cannot fail.
        let mut prefix = serde_json::to_vec(&HeaderFields {
            index,
            timestamp,
            data,
            previous_hash,
        })
        .expect("header fields serialize to JSON");
        prefix.pop();
        prefix.extend_from_slice(br#","nonce":"#);
        Self { prefix }
    }

    pub fn for_block(block: &Block) -> Self {
        Self::new(block.index, block.timestamp, &block.data, &block.previous_hash)
    }

    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.prefix);
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hex::encode(hasher.finalize())
    }
}

pub fn calculate_hash(
    index: u64,
    timestamp: f64,
    data: &Payload,
    previous_hash: &str,
    nonce: u64,
) -> String {
    HashTemplate::new(index, timestamp, data, previous_hash).hash(nonce)
}

pub mod pow {
    use super::{Block, HashTemplate};
    use crate::error::{LedgerError, Result};
    use tracing::info;

    pub fn count_leading_zero_digits(hash: &str) -> u32 {
        hash.bytes().take_while(|b| *b == b'0').count() as u32
    }

    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        count_leading_zero_digits(hash) >= difficulty
    }

    /// Mine the block by incrementing the nonce from 0 until the hash has at
    /// least `difficulty` leading zero hex digits.
    ///
    /// The timestamp is stamped once before the search; the candidate's own
    /// timestamp acts as a floor. Fails with `MiningExhausted` instead of
    /// wrapping once `max_nonce` has been tried.
    pub fn mine(mut candidate: Block, difficulty: u32, max_nonce: u64) -> Result<Block> {
        candidate.timestamp = crate::now_secs().max(candidate.timestamp);
        let template = HashTemplate::for_block(&candidate);

        let mut nonce = 0u64;
        loop {
            let hash = template.hash(nonce);
            if meets_difficulty(&hash, difficulty) {
                info!(
                    "Mined block {} with nonce {} and hash {}",
                    candidate.index, nonce, hash
                );
                candidate.nonce = nonce;
                candidate.hash = hash;
                return Ok(candidate);
            }
            if nonce >= max_nonce {
                return Err(LedgerError::MiningExhausted {
                    index: candidate.index,
                    difficulty,
                    attempts: nonce.saturating_add(1),
                });
            }
            nonce += 1;
        }
    }

    pub fn mine_block(candidate: Block, difficulty: u32) -> Result<Block> {
        mine(candidate, difficulty, u64::MAX)
    }
}
