use tracing::debug;

use crate::{error::Result, Transaction};

#[derive(Clone, Debug)]
struct Pending {
    seq: u64,
    tx: Transaction,
}

/// Pending transactions waiting to be mined, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    pending: Vec<Pending>,
    next_seq: u64,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects malformed transactions; nothing else is checked here.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        tx.check()?;
        debug!(
            "pooled {} -> {} amount {} fee {}",
            tx.sender, tx.recipient, tx.amount, tx.fee
        );
        self.push(tx);
        Ok(())
    }

    fn push(&mut self, tx: Transaction) {
        self.pending.push(Pending {
            seq: self.next_seq,
            tx,
        });
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending transactions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.iter().map(|p| &p.tx)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Empties the pool, highest fee first, ties in insertion order.
    pub fn drain_ordered_by_fee(&mut self) -> Vec<Transaction> {
        self.drain_for_block(None)
    }

    /// Like `drain_ordered_by_fee`, but at most `cap` transactions leave the
    /// pool. The rest stay pending in their original insertion order.
    pub fn drain_for_block(&mut self, cap: Option<usize>) -> Vec<Transaction> {
        let mut ordered = std::mem::take(&mut self.pending);
        // Stable sort keeps insertion order among equal fees.
        ordered.sort_by(|a, b| b.tx.fee.total_cmp(&a.tx.fee));

        if let Some(cap) = cap {
            if ordered.len() > cap {
                let mut leftover = ordered.split_off(cap);
                leftover.sort_by_key(|p| p.seq);
                self.pending = leftover;
            }
        }

        debug!(
            "drained {} transactions, {} left pending",
            ordered.len(),
            self.pending.len()
        );
        ordered.into_iter().map(|p| p.tx).collect()
    }

    /// Puts drained transactions back ahead of anything added since.
    pub fn restore(&mut self, txs: Vec<Transaction>) {
        let newer = std::mem::take(&mut self.pending);
        for tx in txs {
            self.push(tx);
        }
        for p in newer {
            self.push(p.tx);
        }
    }
}
