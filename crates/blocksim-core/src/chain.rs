use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::{
    config::{check_difficulty, LedgerConfig},
    constants::{GENESIS_DATA, GENESIS_TIMESTAMP, HASH_HEX_SIZE, REWARD_SENDER, ZERO_HASH},
    error::{LedgerError, Result},
    pool::TransactionPool,
    pow::meets_difficulty,
    Block, Payload, Transaction,
};

/// Why a block failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultReason {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// `previous_hash` does not match the predecessor's hash.
    BrokenLink,
    /// Hash does not have enough leading zero digits.
    PowViolation,
    IndexMismatch,
    TimestampRegression,
    InvalidGenesis,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultReason::HashMismatch => "hash mismatch",
            FaultReason::BrokenLink => "broken link to previous block",
            FaultReason::PowViolation => "proof of work below difficulty",
            FaultReason::IndexMismatch => "index out of sequence",
            FaultReason::TimestampRegression => "timestamp earlier than previous block",
            FaultReason::InvalidGenesis => "invalid genesis block",
        };
        f.write_str(s)
    }
}

/// First failing block found by validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("block {index}: {reason}")]
pub struct ChainFault {
    pub index: u64,
    pub reason: FaultReason,
}

/// Persisted/exchanged chain shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub difficulty: u32,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainStats {
    pub blocks: usize,
    pub difficulty: u32,
    pub transactions: usize,
    pub latest_hash: String,
    pub latest_timestamp: f64,
    pub valid: bool,
}

/// The fixed, unmined index-0 block shared by every ledger.
pub fn genesis_block() -> Block {
    Block::new(0, Payload::from(GENESIS_DATA), ZERO_HASH, GENESIS_TIMESTAMP)
}

/// An append-only chain of blocks starting at genesis.
#[derive(Clone, Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
    difficulty: u32,
    config: LedgerConfig,
}

impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        self.difficulty == other.difficulty && self.blocks == other.blocks
    }
}

#[allow(clippy::len_without_is_empty)]
impl Ledger {
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_config(LedgerConfig::with_difficulty(difficulty))
    }

    pub fn with_config(config: LedgerConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            blocks: vec![genesis_block()],
            difficulty: config.difficulty,
            config,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Number of blocks including genesis; never zero.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Applies to future mining and to every later validation, including
    /// blocks mined under the old target.
    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<()> {
        check_difficulty(difficulty)?;
        self.difficulty = difficulty;
        self.config.difficulty = difficulty;
        Ok(())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Queues a transaction in the owning node's pool. The chain is untouched.
    pub fn add_transaction(&self, pool: &mut TransactionPool, tx: Transaction) -> Result<()> {
        if tx.is_reward() {
            return Err(LedgerError::MalformedTransaction(format!(
                "sender `{REWARD_SENDER}` is reserved for mining rewards"
            )));
        }
        pool.add(tx)
    }

    /// Drains the pool into a new block paying `mining_reward` to `miner`,
    /// mines it and appends it.
    ///
    /// An empty pool yields a reward-only block unless `allow_empty_blocks`
    /// is off. If mining fails the drained transactions go back to the pool.
    pub fn mine_pending_transactions(
        &mut self,
        pool: &mut TransactionPool,
        miner: &str,
    ) -> Result<&Block> {
        let reward = Transaction::reward(miner, self.config.mining_reward);
        reward.check()?;
        if pool.is_empty() && !self.config.allow_empty_blocks {
            return Err(LedgerError::EmptyPool);
        }

        let pooled = pool.drain_for_block(self.config.block_cap());
        let mut txs = pooled.clone();
        txs.push(reward);

        let candidate = self.next_candidate(Payload::Transactions(txs));
        match self.mine_candidate(candidate) {
            Ok(block) => Ok(self.push(block)),
            Err(err) => {
                warn!("mining failed, returning {} transactions to pool", pooled.len());
                pool.restore(pooled);
                Err(err)
            }
        }
    }

    /// Mines a free-form data block, bypassing the pool and the reward.
    pub fn add_block_direct(&mut self, data: impl Into<String>) -> Result<&Block> {
        let candidate = self.next_candidate(Payload::Data(data.into()));
        let block = self.mine_candidate(candidate)?;
        Ok(self.push(block))
    }

    fn next_candidate(&self, data: Payload) -> Block {
        let tip = self.tip();
        Block::new(tip.index + 1, data, tip.hash.clone(), tip.timestamp)
    }

    fn mine_candidate(&self, candidate: Block) -> Result<Block> {
        self.config
            .mining
            .mine(candidate, self.difficulty, self.config.max_nonce)
    }

    fn push(&mut self, block: Block) -> &Block {
        info!(
            "Appended block {} ({} transactions) hash {}",
            block.index,
            block.transactions().len(),
            block.hash
        );
        self.blocks.push(block);
        self.tip()
    }

    /// Appends a block mined elsewhere if it extends the current tip.
    pub fn try_append(&mut self, block: Block) -> std::result::Result<&Block, ChainFault> {
        let index = block.index;
        check_successor(self.tip(), &block, self.difficulty)
            .map_err(|reason| ChainFault { index, reason })?;
        Ok(self.push(block))
    }

    /// Walks the whole chain and reports the first failing block by its
    /// position in the chain.
    pub fn validate(&self) -> std::result::Result<(), ChainFault> {
        let fault = self.first_fault();
        if let Some(fault) = &fault {
            warn!("chain validation failed at {fault}");
        }
        fault.map_or(Ok(()), Err)
    }

    fn first_fault(&self) -> Option<ChainFault> {
        if let Err(reason) = check_genesis(&self.blocks[0]) {
            return Some(ChainFault { index: 0, reason });
        }
        self.blocks
            .windows(2)
            .zip(1u64..)
            .find_map(|(pair, index)| {
                check_successor(&pair[0], &pair[1], self.difficulty)
                    .err()
                    .map(|reason| ChainFault { index, reason })
            })
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Net amount received minus sent across every block. Fees are not moved.
    pub fn balance_of(&self, address: &str) -> f64 {
        self.transactions().fold(0.0, |balance, tx| {
            let mut balance = balance;
            if tx.sender == address {
                balance -= tx.amount;
            }
            if tx.recipient == address {
                balance += tx.amount;
            }
            balance
        })
    }

    /// Balance of every address that appears in the chain.
    pub fn balances(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for tx in self.transactions() {
            *out.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount;
            *out.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
        }
        out
    }

    fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions())
    }

    /// Overwrites a stored block's payload without rehashing it, so the next
    /// validation reports the damage. For demos and tests.
    pub fn tamper_with_block(&mut self, index: u64, data: Payload) -> Result<()> {
        let block = usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get_mut(i))
            .ok_or(LedgerError::BlockNotFound(index))?;
        warn!("tampering with block {index}");
        block.data = data;
        Ok(())
    }

    pub fn stats(&self) -> ChainStats {
        let tip = self.tip();
        ChainStats {
            blocks: self.len(),
            difficulty: self.difficulty,
            transactions: self.transactions().count(),
            latest_hash: tip.hash.clone(),
            latest_timestamp: tip.timestamp,
            valid: self.is_valid(),
        }
    }

    pub fn export(&self) -> ChainSnapshot {
        ChainSnapshot {
            difficulty: self.difficulty,
            blocks: self.blocks.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Rebuilds a ledger from persisted data. Only the shape is checked;
    /// run `validate` to judge integrity.
    pub fn import(snapshot: ChainSnapshot) -> Result<Self> {
        Self::import_with(snapshot, LedgerConfig::default())
    }

    /// Like `import`; the snapshot's difficulty overrides `config.difficulty`.
    pub fn import_with(snapshot: ChainSnapshot, mut config: LedgerConfig) -> Result<Self> {
        check_difficulty(snapshot.difficulty)
            .map_err(|e| LedgerError::ImportFormat(e.to_string()))?;
        if snapshot.blocks.is_empty() {
            return Err(LedgerError::ImportFormat("chain has no blocks".into()));
        }
        for block in &snapshot.blocks {
            for (field, value) in [("hash", &block.hash), ("previous_hash", &block.previous_hash)] {
                if !is_hex_hash(value) {
                    return Err(LedgerError::ImportFormat(format!(
                        "block {}: {field} is not a {HASH_HEX_SIZE}-digit hex string",
                        block.index
                    )));
                }
            }
            if !block.timestamp.is_finite() {
                return Err(LedgerError::ImportFormat(format!(
                    "block {}: timestamp is not finite",
                    block.index
                )));
            }
        }
        config.difficulty = snapshot.difficulty;
        config.check()?;
        Ok(Self {
            blocks: snapshot.blocks,
            difficulty: snapshot.difficulty,
            config,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_json_with(raw, LedgerConfig::default())
    }

    pub fn from_json_with(raw: &str, config: LedgerConfig) -> Result<Self> {
        let snapshot: ChainSnapshot =
            serde_json::from_str(raw).map_err(|e| LedgerError::ImportFormat(e.to_string()))?;
        Self::import_with(snapshot, config)
    }

    /// Replaces this ledger with the parsed one; on error `self` is untouched.
    pub fn import_json_into(&mut self, raw: &str) -> Result<()> {
        let imported = Self::from_json_with(raw, self.config.clone())?;
        *self = imported;
        Ok(())
    }
}

fn is_hex_hash(value: &str) -> bool {
    value.len() == HASH_HEX_SIZE && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn check_genesis(block: &Block) -> std::result::Result<(), FaultReason> {
    if block.index != 0 || block.previous_hash != ZERO_HASH {
        return Err(FaultReason::InvalidGenesis);
    }
    if !block.has_valid_hash() {
        return Err(FaultReason::HashMismatch);
    }
    // Every ledger starts from the same block; a rehashed substitute is not genesis.
    if *block != genesis_block() {
        return Err(FaultReason::InvalidGenesis);
    }
    Ok(())
}

fn check_successor(
    prev: &Block,
    block: &Block,
    difficulty: u32,
) -> std::result::Result<(), FaultReason> {
    if prev.index.checked_add(1) != Some(block.index) {
        return Err(FaultReason::IndexMismatch);
    }
    if !block.has_valid_hash() {
        return Err(FaultReason::HashMismatch);
    }
    if block.previous_hash != prev.hash {
        return Err(FaultReason::BrokenLink);
    }
    if block.timestamp < prev.timestamp {
        return Err(FaultReason::TimestampRegression);
    }
    if !meets_difficulty(&block.hash, difficulty) {
        return Err(FaultReason::PowViolation);
    }
    Ok(())
}
