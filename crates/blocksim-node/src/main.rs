mod demo;
mod simulate;

use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use blocksim_core::{Ledger, LedgerConfig, MiningStrategy};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "blocksim-node")]
#[command(about = "Proof-of-work blockchain simulator")]
struct Cli {
    /// Ledger settings in TOML; the flags below override single keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Required leading zero hex digits
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    /// Nonce search: sequential or parallel
    #[arg(long, global = true)]
    mining: Option<MiningStrategy>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run random mining rounds on an in-process network
    Simulate(simulate::SimulateArgs),
    /// Load a chain file, validate it and print its summary
    Inspect {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Walk through mining, balances and tamper detection on one ledger
    Demo {
        /// Write the final chain here
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match cli.cmd {
        Command::Simulate(args) => simulate::run(config, &args),
        Command::Inspect { file, json } => inspect(&file, config, json),
        Command::Demo { export } => demo::run(config, export.as_deref()),
    }
}

fn load_config(cli: &Cli) -> Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            LedgerConfig::from_toml_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => LedgerConfig::default(),
    };
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(mining) = cli.mining {
        config.mining = mining;
    }
    config.check()?;
    Ok(config)
}

/// Writes `ledger` as pretty JSON.
pub(crate) fn export_ledger(ledger: &Ledger, path: &Path) -> Result<()> {
    fs::write(path, ledger.to_json()?)
        .with_context(|| format!("writing chain to {}", path.display()))?;
    info!("exported {} blocks to {}", ledger.len(), path.display());
    Ok(())
}

fn inspect(path: &Path, config: LedgerConfig, json: bool) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading chain {}", path.display()))?;
    let ledger = Ledger::from_json_with(&raw, config)
        .with_context(|| format!("importing chain {}", path.display()))?;
    let stats = ledger.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("blocks:       {}", stats.blocks);
    println!("difficulty:   {}", stats.difficulty);
    println!("transactions: {}", stats.transactions);
    println!("latest hash:  {}", stats.latest_hash);
    match ledger.validate() {
        Ok(()) => println!("valid:        yes"),
        Err(fault) => println!("valid:        no ({fault})"),
    }
    println!("balances:");
    for (address, balance) in ledger.balances() {
        println!("  {address:<16} {balance:>12.2}");
    }
    Ok(())
}
