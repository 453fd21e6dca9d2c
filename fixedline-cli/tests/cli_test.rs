use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn create_input(path: &Path, count: usize) -> Result<String> {
    let content: String = (0..count).map(|i| format!("row {:06}\n", i)).collect();
    fs::write(path, &content)?;
    Ok(content)
}

fn fixedline() -> Result<Command> {
    let mut cmd = Command::cargo_bin("fixedline-cli")?;
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_rebuild_prints_summary() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input.txt");
    let output = dir.path().join("output.txt");
    create_input(&input, 2500)?;

    fixedline()?
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Planned 3 chunks of 1000 lines"))
        .stdout(predicate::str::contains("Wrote 2500 lines from 3 chunks"));

    assert_eq!(fs::metadata(&output)?.len(), fs::metadata(&input)?.len());
    Ok(())
}

#[test]
fn test_ordered_output_matches_input() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input.txt");
    let output = dir.path().join("output.txt");
    let content = create_input(&input, 999)?;

    fixedline()?
        .args(["--ordered", "-l", "100", "-j", "4"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&output)?, content);
    Ok(())
}

#[test]
fn test_missing_input_fails() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("missing.txt");
    let output = dir.path().join("output.txt");

    fixedline()?
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));

    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_empty_input_fails_with_empty_output() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("empty.txt");
    let output = dir.path().join("output.txt");
    fs::write(&input, "")?;

    fixedline()?
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file is empty"));

    assert_eq!(fs::metadata(&output)?.len(), 0);
    Ok(())
}

#[test]
fn test_json_report() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input.txt");
    let output = dir.path().join("output.txt");
    create_input(&input, 300)?;

    let assert = fixedline()?
        .args(["--json", "-l", "100"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(report["plan"]["task_count"], 3);
    assert_eq!(report["stats"]["lines_written"], 300);
    assert_eq!(report["outcomes"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn test_strict_fails_on_bad_chunk() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input.txt");
    let output = dir.path().join("output.txt");
    fs::write(&input, b"aaa\nb\xffb\nccc\n")?;

    // Without --strict a partial run still succeeds
    fixedline()?
        .args(["-l", "1"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 chunks failed"));

    fixedline()?
        .args(["-l", "1", "--strict"])
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 3 chunks failed"));

    fixedline()?
        .args(["-l", "1", "--strict", "--encoding", "lossy"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();
    Ok(())
}

#[test]
fn test_print_config() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("fixedline.yaml");
    fs::write(&config, "soft_lines_per_chunk: 250\nread_strategy: mmap\n")?;

    fixedline()?
        .current_dir(dir.path())
        .args(["--print-config", "-j", "4", "--launch-delay", "20ms", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("soft_lines_per_chunk: 250"))
        .stdout(predicate::str::contains("max_concurrent_chunks: 4"))
        .stdout(predicate::str::contains("launch_delay_ms: 20"))
        .stdout(predicate::str::contains("read_strategy: mmap"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let dir = tempdir()?;

    fixedline()?
        .current_dir(dir.path())
        .args(["--print-config", "-c", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
    Ok(())
}
