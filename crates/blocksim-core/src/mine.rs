use crate::{
    config::MiningStrategy,
    error::{LedgerError, Result},
    now_secs, pow,
    pow::meets_difficulty,
    Block, HashTemplate,
};
use rayon::prelude::*;
use tracing::info;

/// Mines a block by searching nonces in parallel until the hash has at least
/// `difficulty` leading zero hex digits.
///
/// The search returns the lowest qualifying nonce, so the result is the same
/// block the sequential miner produces for the same timestamp. The call
/// blocks until the search completes.
pub fn mine_parallel(mut candidate: Block, difficulty: u32, max_nonce: u64) -> Result<Block> {
    candidate.timestamp = now_secs().max(candidate.timestamp);

    // Only the nonce varies per attempt.
    let template = HashTemplate::for_block(&candidate);

    let found = (0u64..=max_nonce)
        .into_par_iter()
        .find_first(|nonce| meets_difficulty(&template.hash(*nonce), difficulty));

    let Some(nonce) = found else {
        return Err(LedgerError::MiningExhausted {
            index: candidate.index,
            difficulty,
            attempts: max_nonce.saturating_add(1),
        });
    };

    let hash = template.hash(nonce);
    info!(
        "Mined block {} with nonce {} and hash {} (parallel)",
        candidate.index, nonce, hash
    );

    candidate.nonce = nonce;
    candidate.hash = hash;
    Ok(candidate)
}

impl MiningStrategy {
    pub fn mine(self, candidate: Block, difficulty: u32, max_nonce: u64) -> Result<Block> {
        match self {
            MiningStrategy::Sequential => pow::mine(candidate, difficulty, max_nonce),
            MiningStrategy::Parallel => mine_parallel(candidate, difficulty, max_nonce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constants::ZERO_HASH, Transaction};

    #[test]
    fn parallel_matches_sequential() -> anyhow::Result<()> {
        // A fixed future timestamp pins both searches to the same template.
        let floor = now_secs() + 86_400.0;
        let candidate = Block::new(
            7,
            vec![Transaction::new("Alice", "Bob", 3.0)].into(),
            ZERO_HASH,
            floor,
        );
        let sequential = pow::mine(candidate.clone(), 3, u64::MAX)?;
        let parallel = mine_parallel(candidate, 3, u64::MAX)?;
        assert_eq!(sequential, parallel);
        Ok(())
    }

    #[test]
    fn parallel_result_meets_difficulty() -> anyhow::Result<()> {
        let candidate = Block::new(1, "parallel".into(), ZERO_HASH, 0.0);
        let mined = mine_parallel(candidate, 4, u64::MAX)?;
        assert!(meets_difficulty(&mined.hash, 4));
        assert!(mined.has_valid_hash());
        Ok(())
    }

    #[test]
    fn parallel_reports_exhaustion() {
        let candidate = Block::new(2, "unlucky".into(), ZERO_HASH, 0.0);
        let err = mine_parallel(candidate, 64, 1_000).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::MiningExhausted {
                index: 2,
                attempts: 1_001,
                ..
            }
        ));
    }
}
