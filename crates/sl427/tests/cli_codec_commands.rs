#![cfg(feature = "cli")]

use std::process::{Command, Output};

const HEARTBEAT_HEX: &str = "6807688021052504D2C01816";

fn sl427(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sl427"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("sl427 should run")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

#[test]
fn decode_heartbeat_outputs_fields() {
    let output = sl427(&["--format", "json", "decode", HEARTBEAT_HEX]);
    assert!(output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    let msg = &lines[0];
    assert_eq!(msg["direction"], "uplink");
    assert_eq!(msg["code"], "confirm");
    assert_eq!(msg["address"], "2105251234");
    assert_eq!(msg["address_kind"], "admin");
    assert_eq!(msg["afn"], "upload(0xC0)");
    assert_eq!(msg["raw"], HEARTBEAT_HEX);
}

#[test]
fn decode_accepts_spaced_hex() {
    let output = sl427(&[
        "--format", "json", "decode", "68", "07", "68", "80", "21", "05", "25", "04", "D2", "C0",
        "18", "16",
    ]);
    assert!(output.status.success());
    assert_eq!(json_lines(&output)[0]["address"], "2105251234");
}

#[test]
fn decode_bad_checksum_returns_60() {
    let output = sl427(&["decode", "6807688021052504D2C01916"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("checksum"));
}

#[test]
fn decode_invalid_hex_returns_64() {
    let output = sl427(&["decode", "68G7"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn encode_heartbeat_matches_known_bytes() {
    let output = sl427(&[
        "--format",
        "pretty",
        "encode",
        "--admin-code",
        "210525",
        "--station-id",
        "1234",
    ]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), HEARTBEAT_HEX);
}

#[test]
fn encode_then_decode_downlink() {
    let encoded = sl427(&[
        "--format",
        "pretty",
        "encode",
        "--coded",
        "80000001",
        "--downlink",
        "--data",
        "00",
        "--password",
        "0x0102",
    ]);
    assert!(encoded.status.success());
    let hex = String::from_utf8_lossy(&encoded.stdout).trim().to_string();

    let decoded = sl427(&["--format", "json", "decode", &hex]);
    assert!(decoded.status.success());
    let msg = &json_lines(&decoded)[0];
    assert_eq!(msg["direction"], "downlink");
    assert_eq!(msg["address_kind"], "coded");
    assert_eq!(msg["address"], "80000001");
    assert_eq!(msg["password"], 0x0102);
    assert_eq!(msg["data"], "00");
}

#[test]
fn encode_downlink_without_password_returns_60() {
    let output = sl427(&["encode", "--downlink"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn version_reports_name() {
    let output = sl427(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("sl427 "));

    let extended = sl427(&["version", "--extended"]);
    assert!(extended.status.success());
    assert!(String::from_utf8_lossy(&extended.stdout).contains("max_user_data=255"));
}
