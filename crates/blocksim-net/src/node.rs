use blocksim_core::{
    Block, ChainFault, ChainSnapshot, FaultReason, Ledger, LedgerConfig, Result, Transaction,
    TransactionPool,
};
use tracing::{debug, info, warn};

use crate::{Delivery, Message, NetworkError, NodeId, Peer, Rejection, Response};

/// One participant: a ledger, its pending pool and an identity.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    ledger: Ledger,
    pool: TransactionPool,
    online: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, config: LedgerConfig) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            ledger: Ledger::with_config(config)?,
            pool: TransactionPool::new(),
            online: true,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Direct access for demos that tamper with stored blocks.
    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.ledger.add_transaction(&mut self.pool, tx)
    }

    /// Mines the pool, paying the reward to this node's id.
    pub fn mine(&mut self) -> Result<Block> {
        let miner = self.id.clone();
        self.mine_pending_transactions(&miner)
    }

    pub fn mine_pending_transactions(&mut self, miner: &str) -> Result<Block> {
        self.ledger
            .mine_pending_transactions(&mut self.pool, miner)
            .cloned()
    }

    pub fn add_block_direct(&mut self, data: impl Into<String>) -> Result<Block> {
        self.ledger.add_block_direct(data).cloned()
    }

    /// Accepts a block announced by a peer.
    pub fn receive_block(&mut self, block: Block) -> Delivery {
        let local_len = self.ledger.len();
        if let Some(existing) = self.ledger.block(block.index) {
            if existing.hash == block.hash {
                return Delivery::Known;
            }
            // A different block at or below our tip comes from a chain no
            // longer than ours.
            debug!(
                "{} ignoring stale block {} from a competing fork",
                self.id, block.index
            );
            return Delivery::Rejected(Rejection::Stale {
                index: block.index,
                local_len,
            });
        }

        if !block.has_valid_hash() {
            return self.reject_block(block.index, FaultReason::HashMismatch);
        }
        if !blocksim_core::pow::meets_difficulty(&block.hash, self.ledger.difficulty()) {
            return self.reject_block(block.index, FaultReason::PowViolation);
        }

        if block.index as usize == local_len && block.previous_hash == self.ledger.tip().hash {
            return match self.ledger.try_append(block) {
                Ok(_) => Delivery::Appended,
                Err(fault) => self.reject_block(fault.index, fault.reason),
            };
        }

        debug!(
            "{} is behind: block {} does not extend local tip {}",
            self.id,
            block.index,
            local_len - 1
        );
        Delivery::Behind
    }

    fn reject_block(&self, index: u64, reason: FaultReason) -> Delivery {
        warn!("{} rejected block {index}: {reason}", self.id);
        Delivery::Rejected(Rejection::Block(ChainFault { index, reason }))
    }

    /// Rebuilds `snapshot` as a ledger with this node's difficulty and
    /// config, and validates it. The claimed difficulty is ignored.
    pub fn judge_chain(&self, snapshot: ChainSnapshot) -> std::result::Result<Ledger, Rejection> {
        let offered = ChainSnapshot {
            difficulty: self.ledger.difficulty(),
            blocks: snapshot.blocks,
        };
        let candidate = Ledger::import_with(offered, self.ledger.config().clone())
            .map_err(|err| Rejection::Malformed(err.to_string()))?;
        if let Err(fault) = candidate.validate() {
            warn!("{} rejected invalid chain: {fault}", self.id);
            return Err(Rejection::InvalidChain(fault));
        }
        Ok(candidate)
    }

    /// Adopts `snapshot` if it is a valid chain strictly longer than ours.
    pub fn consider_chain(&mut self, snapshot: ChainSnapshot) -> Delivery {
        let candidate = match self.judge_chain(snapshot) {
            Ok(candidate) => candidate,
            Err(rejection) => return Delivery::Rejected(rejection),
        };
        let local_len = self.ledger.len();
        if candidate.len() <= local_len {
            return Delivery::Rejected(Rejection::NotLonger {
                local_len,
                offered_len: candidate.len(),
            });
        }
        let to_len = candidate.len();
        self.replace_ledger(candidate);
        Delivery::Replaced {
            from_len: local_len,
            to_len,
        }
    }

    /// Swaps in a whole new ledger and returns the old one. The pool is kept.
    pub fn replace_ledger(&mut self, ledger: Ledger) -> Ledger {
        let old = std::mem::replace(&mut self.ledger, ledger);
        info!(
            "{} replaced chain of {} blocks with {} blocks",
            self.id,
            old.len(),
            self.ledger.len()
        );
        old
    }
}

impl Peer for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_reachable(&self) -> bool {
        self.online
    }

    fn handle(&mut self, from: &str, msg: Message) -> std::result::Result<Response, NetworkError> {
        match msg {
            Message::NewBlock(block) => {
                debug!("{} received block {} from {from}", self.id, block.index);
                Ok(Response::Delivered(self.receive_block(block)))
            }
            Message::ChainRequest => Ok(Response::Reply(Message::ChainResponse(
                self.ledger.export(),
            ))),
            Message::ChainResponse(snapshot) => {
                debug!(
                    "{} received chain of {} blocks from {from}",
                    self.id,
                    snapshot.blocks.len()
                );
                Ok(Response::Delivered(self.consider_chain(snapshot)))
            }
        }
    }
}
