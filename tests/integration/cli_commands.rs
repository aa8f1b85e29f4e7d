#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn seeded_store(corrupt: bool) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("store.json");
    let mut cmd = cargo_bin_cmd!("refcheck");
    cmd.arg("seed-demo").arg(&path);
    if corrupt {
        cmd.arg("--corrupt");
    }
    cmd.assert().success();
    assert!(path.exists(), "seed-demo should write the store");
    (dir, path)
}

fn stdout_lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn scan_of_clean_store_succeeds() {
    let (_dir, store) = seeded_store(false);
    cargo_bin_cmd!("refcheck")
        .args(["--quiet", "scan", "app"])
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout("");
}

#[test]
fn scan_reports_each_broken_reference() {
    let (_dir, store) = seeded_store(true);
    let output = cargo_bin_cmd!("refcheck")
        .args(["--quiet", "scan", "app.zport.dmd"])
        .arg("--store")
        .arg(&store)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 5, "{lines:?}");
    assert!(lines
        .iter()
        .any(|line| line == "AttributeMissing: bogus on attribute 'bogus' of app.zport.dmd.Devices"));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("ReferenceMissing: ")
            && line.ends_with(" on relationship 'dependents' of app.zport.dmd.Devices")));
}

#[test]
fn fixrels_repairs_and_persists() {
    let (_dir, store) = seeded_store(true);
    let output = cargo_bin_cmd!("refcheck")
        .args(["--quiet", "scan", "/zport/dmd", "--fixrels"])
        .arg("--store")
        .arg(&store)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let lines = stdout_lines(&output);
    let repairs: Vec<_> = lines
        .iter()
        .filter(|line| line.starts_with("  ==-- fixing ReferenceMissing"))
        .collect();
    assert_eq!(repairs.len(), 3, "{lines:?}");
    assert_eq!(lines.len(), 8);

    let rescan = cargo_bin_cmd!("refcheck")
        .args(["--quiet", "scan", "app"])
        .env("REFCHECK_STORE", &store)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    assert_eq!(stdout_lines(&rescan).len(), 2);
}

#[test]
fn scan_json_emits_records_and_summary() {
    let (_dir, store) = seeded_store(true);
    let output = cargo_bin_cmd!("refcheck")
        .args(["--format", "json", "scan", "app", "--fixrels"])
        .arg("--strategy")
        .arg("relationship")
        .arg("--store")
        .arg(&store)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let values: Vec<Value> = String::from_utf8_lossy(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();

    let repairs: Vec<_> = values.iter().filter(|v| v["type"] == "repair").collect();
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0]["strategy"], "relationship");
    assert_eq!(repairs[0]["child_name"], "dependents");

    let summary = values.last().expect("summary line");
    assert_eq!(summary["type"], "summary");
    let report = &summary["report"];
    assert_eq!(report["records"], 5);
    assert_eq!(report["repairs_applied"], 1);
    assert_eq!(report["success"], false);
    assert_eq!(report["by_kind"]["ReferenceMissing"], 4);
    assert_eq!(report["by_kind"]["AttributeMissing"], 1);
}

#[test]
fn invalid_path_is_reported() {
    let (_dir, store) = seeded_store(false);
    cargo_bin_cmd!("refcheck")
        .args(["scan", "app.zport.nowhere"])
        .arg("--store")
        .arg(&store)
        .assert()
        .code(1)
        .stdout("Invalid path: app.zport.nowhere\n");
}

#[test]
fn missing_store_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    cargo_bin_cmd!("refcheck")
        .args(["scan", "app"])
        .arg("--config")
        .arg(&config)
        .env_remove("REFCHECK_STORE")
        .assert()
        .code(1);
}

#[test]
fn config_file_supplies_store_and_root_name() {
    let (dir, store) = seeded_store(true);
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[store]\ndefault = {:?}\n\n[scan]\nroot_name = \"dmd\"\nstrategies = [\"search-manager\"]\n",
            store.display().to_string()
        ),
    )
    .unwrap();

    let output = cargo_bin_cmd!("refcheck")
        .args(["--quiet", "scan", "dmd/zport/dmd", "--fixrels"])
        .arg("--config")
        .arg(&config)
        .env_remove("REFCHECK_STORE")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let lines = stdout_lines(&output);
    assert!(lines
        .iter()
        .any(|line| line.ends_with("on attribute 'SearchManager' of dmd.zport.dmd")));
    let repairs = lines.iter().filter(|line| line.starts_with("  ==--")).count();
    assert_eq!(repairs, 1);
}

#[test]
fn sweep_catalogs_fix_then_clean() {
    let (_dir, store) = seeded_store(true);
    let output = cargo_bin_cmd!("refcheck")
        .args(["--format", "json", "sweep-catalogs"])
        .arg("--store")
        .arg(&store)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let values: Vec<Value> = String::from_utf8_lossy(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    let dangling = values
        .iter()
        .filter(|v| v["type"] == "dangling_entry")
        .count();
    assert_eq!(dangling, 2);

    cargo_bin_cmd!("refcheck")
        .args(["--quiet", "sweep-catalogs", "--fix"])
        .arg("--store")
        .arg(&store)
        .assert()
        .success();

    cargo_bin_cmd!("refcheck")
        .args(["--quiet", "sweep-catalogs", "app.zport.dmd.global_catalog"])
        .arg("--store")
        .arg(&store)
        .assert()
        .success()
        .stdout("  * app.zport.dmd.global_catalog\n");
}
