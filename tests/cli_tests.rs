use assert_cmd::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

const TESTING: &str = r#"
[traffic]
src_mac = "02:00:00:00:00:aa"

[testing]
fwd_pid = 100
rev_pid = 200
fwd_weight = 2
rev_weight = 1
tun_src_ip = "172.16.0.1"
tun_dst_ip = "172.16.0.2"
dummy_mac = "de:ad:be:ef:00:01"
fwd_dst_macs = ["02:00:00:00:01:01", "02:00:00:00:01:02"]
"#;

#[test]
fn show_flowgen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("flowgen.toml");
    fs::write(&file_path, "[traffic]\ntx_cores = [0, 1]\n\n[flowgen]\nnum_flows = 10\n")?;

    let output = Command::cargo_bin("trafficgraph")?
        .arg("show")
        .arg("-c")
        .arg(&file_path)
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("flowgen"));
    assert!(stdout.contains("num_flows"));
    assert!(stdout.contains("flow_rate"));
    Ok(())
}

#[test]
fn compile_testing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("testing.toml");
    fs::write(&file_path, TESTING)?;

    let output = Command::cargo_bin("trafficgraph")?
        .arg("compile")
        .arg("-c")
        .arg(&file_path)
        .arg("--port-out")
        .arg("eth1_out")
        .arg("--draws")
        .arg("3000")
        .arg("--seed")
        .arg("1")
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("flowgen_fwd_c0"));
    assert!(stdout.contains("flowgen_rev_c0"));
    assert!(stdout.contains("weighted per packet"));
    assert!(stdout.contains("tun_demux:0 -> sink"));
    assert!(stdout.contains("-> eth1_out:0"));
    assert!(stdout.contains("3000 draws"));
    Ok(())
}

#[test]
fn compile_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("testing.toml");
    fs::write(&file_path, TESTING)?;

    let output = Command::cargo_bin("trafficgraph")?
        .arg("compile")
        .arg("-c")
        .arg(&file_path)
        .arg("--json")
        .output()?;
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["tx"][0]["core"], 0);
    assert_eq!(value["rx"]["kind"], "rx");
    assert_eq!(value["tx"][0]["pipeline"]["producers"]["policy"], "weighted");
    Ok(())
}

#[test]
fn missing_tunnel_id_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("broken.toml");
    fs::write(&file_path, TESTING.replace("fwd_pid = 100\n", ""))?;

    let mut cmd = Command::cargo_bin("trafficgraph")?;
    cmd.arg("compile").arg("-c").arg(&file_path);
    let output = cmd.output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("fwd_pid"));
    Ok(())
}

#[test]
fn missing_file_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("trafficgraph")?;
    cmd.arg("show").arg("-c").arg("does-not-exist.toml");
    cmd.assert().failure();
    Ok(())
}
