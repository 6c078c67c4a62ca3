use std::path::Path;

use anyhow::Result;
use blocksim_core::{Ledger, LedgerConfig, Payload, Transaction, TransactionPool};

pub fn run(config: LedgerConfig, export: Option<&Path>) -> Result<()> {
    let mut ledger = Ledger::with_config(config)?;
    let mut pool = TransactionPool::new();
    println!("difficulty {}", ledger.difficulty());

    ledger.add_transaction(&mut pool, Transaction::new("Alice", "Bob", 50.0))?;
    ledger.add_transaction(&mut pool, Transaction::new("Bob", "Charlie", 25.0))?;
    ledger.mine_pending_transactions(&mut pool, "Miner1")?;

    ledger.add_block_direct("Charlie sends 10 coins to Diana")?;
    ledger.add_block_direct("Diana sends 5 coins to Eve")?;

    ledger.add_transaction(&mut pool, Transaction::new("Eve", "Alice", 3.0).with_fee(0.5))?;
    ledger.add_transaction(&mut pool, Transaction::new("Alice", "Frank", 20.0).with_fee(1.0))?;
    ledger.mine_pending_transactions(&mut pool, "Miner2")?;

    println!();
    for block in ledger.blocks() {
        println!(
            "block #{:<3} nonce {:>8}  {}  prev {}...",
            block.index,
            block.nonce,
            block.hash,
            &block.previous_hash[..12]
        );
        match &block.data {
            Payload::Data(text) => println!("    {text}"),
            Payload::Transactions(txs) => {
                for tx in txs {
                    println!(
                        "    {} -> {}: {:.2} (fee {:.2})",
                        tx.sender, tx.recipient, tx.amount, tx.fee
                    );
                }
            }
        }
    }

    println!();
    println!("balances:");
    for (address, balance) in ledger.balances() {
        if balance != 0.0 {
            println!("  {address:<16} {balance:>12.2}");
        }
    }
    println!("chain valid: {}", ledger.is_valid());

    ledger.tamper_with_block(2, "HACKED: All coins belong to Hacker!".into())?;
    match ledger.validate() {
        Ok(()) => println!("tampering went unnoticed"),
        Err(fault) => println!("tampering detected at {fault}"),
    }

    if let Some(path) = export {
        crate::export_ledger(&ledger, path)?;
    }
    Ok(())
}
