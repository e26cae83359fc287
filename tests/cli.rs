use std::fmt::Write as _;
use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn monitor() -> Command {
    Command::cargo_bin("bci-monitor").unwrap()
}

fn alpha_csv(rows: usize) -> String {
    let mut text = String::from("timestamp,C3,C4\n");
    for i in 0..rows {
        let t = i as f64 / 500.0;
        let v = (2.0 * std::f64::consts::PI * 10.0 * t).sin() * 20.0;
        writeln!(text, "{t:.6},{v:.4},{:.4}", -v).unwrap();
    }
    text
}

#[test]
fn test_help_flag() {
    monitor()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--file"))
        .stdout(predicate::str::contains("--simulate"));
}

#[test]
fn test_print_config_shows_defaults() {
    monitor()
        .arg("--print-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"DATA_LENGTH\": 30000"))
        .stdout(predicate::str::contains("\"SAMPLE_RATE\": 500.0"));
}

#[test]
fn test_print_config_applies_file_and_baud() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "FFT_LENGTH": 256, "CUSTOM": 1 }"#).unwrap();
    monitor()
        .args(["--print-config", "--baud", "9600", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"FFT_LENGTH\": 256"))
        .stdout(predicate::str::contains("\"BAUD_RATE\": 9600"))
        .stdout(predicate::str::contains("\"CUSTOM\": 1"));
}

#[test]
fn test_malformed_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ broken").unwrap();
    monitor()
        .arg("--print-config")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_sources_are_mutually_exclusive() {
    monitor()
        .args(["--simulate", "--port", "/dev/ttyUSB0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_csv_replay_exports_features_and_plots() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("session.csv");
    fs::write(&input, alpha_csv(1500)).unwrap();
    let features = dir.path().join("out").join("features.csv");
    let plots = dir.path().join("plots");

    monitor()
        .arg("--file")
        .arg(&input)
        .args(["--speed", "0", "--plot-every", "1"])
        .arg("--features")
        .arg(&features)
        .arg("--plot-dir")
        .arg(&plots)
        .assert()
        .success()
        .stdout(predicate::str::contains("ingested 1500 samples"));

    let text = fs::read_to_string(&features).unwrap();
    let mut lines = text.lines();
    assert!(lines
        .next()
        .unwrap()
        .starts_with("timestamp,channel,vrms,Delta"));
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    assert_eq!(rows.len() % 3, 0);
    assert!(rows.iter().any(|r| r.contains(",combined,")));
    assert!(rows.last().unwrap().starts_with("2.998000,combined,"));
    for name in ["waveform.png", "spectrum.png", "bandpower.png"] {
        assert!(plots.join(name).exists(), "{name} missing");
    }
}

#[test]
fn test_record_round_trips_through_replay() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("session.csv");
    fs::write(&input, alpha_csv(200)).unwrap();
    let recorded = dir.path().join("raw.csv");

    monitor()
        .arg("--file")
        .arg(&input)
        .args(["--speed", "0", "--raw", "--record"])
        .arg(&recorded)
        .assert()
        .success();

    monitor()
        .arg("--file")
        .arg(&recorded)
        .args(["--speed", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ingested 200 samples"));
    let text = fs::read_to_string(&recorded).unwrap();
    assert!(text.starts_with("timestamp,C3,C4\n"));
    assert_eq!(text.lines().count(), 201);
}

#[test]
fn test_simulation_stops_after_duration() {
    monitor()
        .args(["--simulate", "--duration", "0.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped"));
}

#[test]
fn test_unsupported_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("session.wav");
    fs::write(&input, b"RIFF").unwrap();
    monitor()
        .arg("--file")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported recording format"));
}

#[test]
fn test_bad_csv_row_fails_with_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    fs::write(&input, "C3\n1.0\nnope\n").unwrap();
    monitor()
        .arg("--file")
        .arg(&input)
        .args(["--speed", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 3"));
}
