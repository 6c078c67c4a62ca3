use blocksim_core::{
    pow, FaultReason, Ledger, LedgerConfig, LedgerError, MiningStrategy, Payload, Transaction,
    TransactionPool,
};

#[test]
fn test_ledger_lifecycle() -> anyhow::Result<()> {
    let mut ledger = Ledger::new(2)?;
    let mut pool = TransactionPool::new();
    assert!(ledger.is_valid());

    ledger.add_transaction(&mut pool, Transaction::new("A", "B", 50.0))?;
    ledger.add_transaction(&mut pool, Transaction::new("B", "C", 25.0))?;
    let block = ledger.mine_pending_transactions(&mut pool, "Miner")?.clone();
    assert!(pool.is_empty());
    assert!(pow::meets_difficulty(&block.hash, 2));
    assert_eq!(block.transactions().len(), 3);
    assert!(block.transactions()[2].is_reward());

    ledger.add_block_direct("note to self")?;
    assert_eq!(ledger.len(), 3);
    assert!(ledger.is_valid());

    assert_eq!(ledger.balance_of("A"), -50.0);
    assert_eq!(ledger.balance_of("B"), 25.0);
    assert_eq!(ledger.balance_of("C"), 25.0);
    assert_eq!(ledger.balance_of("Miner"), 100.0);

    let restored = Ledger::from_json(&ledger.to_json()?)?;
    assert_eq!(restored, ledger);
    assert_eq!(restored.stats(), ledger.stats());
    Ok(())
}

#[test]
fn test_mutation_is_caught_at_or_after_the_block() -> anyhow::Result<()> {
    let mut ledger = Ledger::new(1)?;
    for i in 0..4 {
        ledger.add_block_direct(format!("block {i}"))?;
    }

    // Rewrite block 2 and rehash it: the stored hash is self-consistent but
    // block 3 no longer links to it, and the PoW is likely lost.
    let mut snapshot = ledger.export();
    snapshot.blocks[2].data = Payload::from("rewritten");
    snapshot.blocks[2].hash = snapshot.blocks[2].compute_hash();
    let forged = Ledger::import(snapshot)?;
    let fault = forged.validate().unwrap_err();
    assert!(fault.index >= 2);
    assert!(matches!(
        fault.reason,
        FaultReason::PowViolation | FaultReason::BrokenLink
    ));
    Ok(())
}

#[test]
fn test_parallel_strategy_builds_valid_chain() -> anyhow::Result<()> {
    let config = LedgerConfig {
        mining: MiningStrategy::Parallel,
        ..LedgerConfig::with_difficulty(2)
    };
    let mut ledger = Ledger::with_config(config)?;
    let mut pool = TransactionPool::new();
    for fee in [1.0, 5.0, 3.0] {
        ledger.add_transaction(&mut pool, Transaction::new("A", "B", 1.0).with_fee(fee))?;
    }
    let block = ledger.mine_pending_transactions(&mut pool, "Miner")?;
    let fees: Vec<f64> = block.transactions()[..3].iter().map(|tx| tx.fee).collect();
    assert_eq!(fees, vec![5.0, 3.0, 1.0]);
    assert!(ledger.is_valid());
    Ok(())
}

#[test]
fn test_empty_pool_policy() -> anyhow::Result<()> {
    let mut ledger = Ledger::new(1)?;
    let mut pool = TransactionPool::new();
    let block = ledger.mine_pending_transactions(&mut pool, "Miner")?;
    assert_eq!(block.transactions().len(), 1);

    let strict = LedgerConfig {
        allow_empty_blocks: false,
        ..LedgerConfig::with_difficulty(1)
    };
    let mut ledger = Ledger::with_config(strict)?;
    assert!(matches!(
        ledger.mine_pending_transactions(&mut pool, "Miner"),
        Err(LedgerError::EmptyPool)
    ));
    assert_eq!(ledger.len(), 1);
    Ok(())
}
