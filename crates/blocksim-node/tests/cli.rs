use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn blocksim() -> Command {
    Command::cargo_bin("blocksim-node").expect("binary builds")
}

#[test]
fn test_demo_detects_tampering() -> anyhow::Result<()> {
    blocksim()
        .args(["--difficulty", "1", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chain valid: true"))
        .stdout(predicate::str::contains(
            "tampering detected at block 2: hash mismatch",
        ))
        .stdout(predicate::str::contains("Miner1"));
    Ok(())
}

#[test]
fn test_inspect_reports_exported_tampered_chain() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("demo.json");
    blocksim()
        .args(["--difficulty", "1", "demo", "--export"])
        .arg(&path)
        .assert()
        .success();
    assert!(fs::read_to_string(&path)?.contains("HACKED"));

    blocksim()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("blocks:       5"))
        .stdout(predicate::str::contains("valid:        no (block 2: hash mismatch)"));
    Ok(())
}

#[test]
fn test_simulate_converges_and_exports() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    blocksim()
        .args(["--difficulty", "1", "simulate", "--nodes", "3", "--rounds", "4"])
        .args(["--offline", "node3", "--export"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("round   4:"))
        .stdout(predicate::str::contains("consensus: achieved"));

    let output = blocksim()
        .args(["inspect", "--json"])
        .arg(&path)
        .output()?;
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["blocks"], 5);
    assert_eq!(stats["difficulty"], 1);
    assert_eq!(stats["valid"], true);
    Ok(())
}

#[test]
fn test_config_file_with_flag_override() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("blocksim.toml");
    fs::write(&config, "difficulty = 3\nmining = \"parallel\"\nmining_reward = 50.0\n")?;
    let path = dir.path().join("chain.json");

    blocksim()
        .arg("--config")
        .arg(&config)
        .args(["--difficulty", "1", "simulate", "--nodes", "2", "--rounds", "2"])
        .arg("--export")
        .arg(&path)
        .assert()
        .success();

    let raw = fs::read_to_string(&path)?;
    let chain: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(chain["difficulty"], 1);
    let reward = chain["blocks"][1]["data"]
        .as_array()
        .and_then(|txs| txs.last())
        .cloned()
        .unwrap_or_default();
    assert_eq!(reward["sender"], "MINING_REWARD");
    assert_eq!(reward["amount"], 50.0);
    Ok(())
}

#[test]
fn test_rejects_bad_difficulty_and_unknown_node() -> anyhow::Result<()> {
    blocksim()
        .args(["--difficulty", "0", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("difficulty 0 is outside"));

    blocksim()
        .args(["--difficulty", "1", "simulate", "--offline", "node9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node `node9`"));
    Ok(())
}

#[test]
fn test_inspect_missing_or_garbage_file_fails() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let missing = dir.path().join("missing.json");
    blocksim()
        .arg("inspect")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading chain"));

    let garbage = dir.path().join("garbage.json");
    fs::write(&garbage, r#"{"difficulty": 2, "blocks": []}"#)?;
    blocksim()
        .arg("inspect")
        .arg(&garbage)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chain has no blocks"));
    Ok(())
}
