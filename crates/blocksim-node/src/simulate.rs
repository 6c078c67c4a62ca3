use std::path::PathBuf;

use anyhow::{bail, Result};
use blocksim_core::{LedgerConfig, Transaction};
use blocksim_net::Network;
use clap::Args;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tracing::{info, warn};

const USERS: [&str; 5] = ["Alice", "Bob", "Charlie", "Diana", "Eve"];

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of nodes in the network
    #[arg(long, default_value_t = 3)]
    nodes: usize,

    /// Mining rounds to run
    #[arg(long, default_value_t = 5)]
    rounds: usize,

    /// Random transactions submitted before each round
    #[arg(long, default_value_t = 3)]
    transactions: usize,

    /// Seed for miner selection and generated transactions
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Node kept offline during the rounds (repeatable); it rejoins before
    /// the final consensus pass
    #[arg(long = "offline")]
    offline: Vec<String>,

    /// Write the canonical chain here after consensus
    #[arg(long)]
    export: Option<PathBuf>,
}

pub fn run(config: LedgerConfig, args: &SimulateArgs) -> Result<()> {
    if args.nodes == 0 {
        bail!("a network needs at least one node");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut net = Network::new(config);
    for i in 1..=args.nodes {
        net.add_node(format!("node{i}"))?;
    }
    for id in &args.offline {
        net.set_online(id, false)?;
    }

    for round in 1..=args.rounds {
        let online: Vec<String> = net
            .nodes()
            .iter()
            .filter(|n| n.is_online())
            .map(|n| n.id().to_string())
            .collect();
        let Some(miner) = online.choose(&mut rng) else {
            warn!("round {round}: every node is offline, skipping");
            continue;
        };

        for _ in 0..args.transactions {
            net.submit_transaction(miner, random_transaction(&mut rng))?;
        }
        let (block, report) = net.mine_and_broadcast(miner, miner)?;
        info!("round {round}: {miner} mined block {}", block.index);
        println!(
            "round {round:>3}: {miner} mined block #{} ({} txs, nonce {}), accepted by {}/{} peers",
            block.index,
            block.transactions().len(),
            block.nonce,
            report.accepted(),
            report.deliveries.len()
        );
    }

    for id in &args.offline {
        net.set_online(id, true)?;
    }
    let consensus = net.resolve_consensus();
    for (id, fault) in &consensus.excluded {
        println!("excluded {id}: {fault}");
    }
    for (id, rejection) in &consensus.refused {
        println!("{id} refused the canonical chain: {rejection:?}");
    }

    println!();
    print_status(&net);
    println!(
        "consensus: {}",
        if net.is_converged() { "achieved" } else { "split" }
    );

    if let Some(path) = &args.export {
        match &consensus.canonical {
            Some(canonical) => {
                let Some(node) = net.node(&canonical.node) else {
                    bail!("canonical node {} vanished", canonical.node);
                };
                crate::export_ledger(node.ledger(), path)?;
            }
            None => bail!("no valid chain to export"),
        }
    }
    Ok(())
}

fn random_transaction(rng: &mut StdRng) -> Transaction {
    let mut pair = USERS.choose_multiple(rng, 2);
    let (sender, recipient) = match (pair.next(), pair.next()) {
        (Some(s), Some(r)) => (*s, *r),
        _ => (USERS[0], USERS[1]),
    };
    let amount = cents(rng.gen_range(1.0..100.0));
    let fee = cents(rng.gen_range(0.0..2.0));
    Transaction::new(sender, recipient, amount).with_fee(fee)
}

fn cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn print_status(net: &Network) {
    for node in net.nodes() {
        let ledger = node.ledger();
        let tip = &ledger.tip().hash;
        println!(
            "{:<10} {:<8} blocks {:>4}  tip {}...  {}",
            node.id(),
            if node.is_online() { "online" } else { "offline" },
            ledger.len(),
            &tip[..tip.len().min(12)],
            if ledger.is_valid() { "valid" } else { "INVALID" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_transactions_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let tx = random_transaction(&mut rng);
            assert!(tx.check().is_ok());
            assert_ne!(tx.sender, tx.recipient);
            assert!(tx.amount >= 1.0 && tx.fee >= 0.0);
        }
    }

    #[test]
    fn cents_rounds_to_two_places() {
        assert_eq!(cents(12.345_6), 12.35);
        assert_eq!(cents(0.004), 0.0);
    }
}
