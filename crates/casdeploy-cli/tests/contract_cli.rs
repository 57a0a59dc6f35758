#![cfg(unix)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const REGISTRY: &str = "version=19.3.0\n\
[caches]\n\
1\t/dev/nvme0n1\tWB\n\
[cores]\n";

const LIST_HEADER: &str = "type,id,disk,status,write policy,device\n";

/// Fake casadm: logs its arguments, serves listings from `caches.csv` and
/// fails `--add-core` when `fail-add-core` exists next to it.
const FAKE_CASADM: &str = r#"#!/bin/sh
here="$(dirname "$0")"
echo "$*" >> "$here/calls.log"
case "$1" in
  --version)
    printf 'Name,Version\nCAS Cache Kernel Module,20.12.0\nCAS CLI Utility,20.12.0\n'
    ;;
  --list-caches)
    cat "$here/caches.csv"
    ;;
  --add-core)
    if [ -f "$here/fail-add-core" ]; then
      echo "Error while adding core device" >&2
      exit 1
    fi
    ;;
esac
exit 0
"#;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("opencas.conf"), REGISTRY).unwrap();
        fs::write(dir.path().join("caches.csv"), LIST_HEADER).unwrap();
        fs::create_dir(dir.path().join("ioclass")).unwrap();

        let casadm = dir.path().join("casadm");
        fs::write(&casadm, FAKE_CASADM).unwrap();
        fs::set_permissions(&casadm, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        self.cmd_with_casadm(&self.path("casadm"))
    }

    fn cmd_with_casadm(&self, casadm: &Path) -> Command {
        let mut cmd = Command::cargo_bin("casdeploy").unwrap();
        cmd.env_remove("CASDEPLOY_CONFIG")
            .env("RUST_LOG", "warn")
            .arg("--registry")
            .arg(self.path("opencas.conf"))
            .arg("--casadm")
            .arg(casadm)
            .arg("--ioclass-dir")
            .arg(self.path("ioclass"))
            .arg("--strict-devices")
            .arg("false");
        cmd
    }

    fn registry(&self) -> String {
        fs::read_to_string(self.path("opencas.conf")).unwrap()
    }

    fn calls(&self) -> String {
        fs::read_to_string(self.path("calls.log")).unwrap_or_default()
    }

    fn set_live(&self, rows: &str) {
        fs::write(self.path("caches.csv"), format!("{}{}", LIST_HEADER, rows)).unwrap();
    }
}

fn json(out: &[u8]) -> Value {
    serde_json::from_slice(out).expect("stdout is JSON")
}

#[test]
fn test_configure_cache_writes_registry_and_starts() {
    let env = Env::new();
    env.cmd()
        .args(["cache", "configure", "--device", "/dev/nvme1n1", "--id", "2", "--mode", "wt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("changed"));

    assert!(env.registry().contains("2\t/dev/nvme1n1\tWT\n"));
    let calls = env.calls();
    assert!(calls.contains("--start-cache --cache-device /dev/nvme1n1 --cache-id 2 --cache-mode wt"));
    assert!(calls.contains("--set-param --name cleaning --cache-id 2 --policy alru"));
}

#[test]
fn test_configure_cache_twice_reports_unchanged() {
    let env = Env::new();
    let args = ["--format", "json", "cache", "configure", "--device", "/dev/nvme1n1", "--id", "2", "--mode", "wt"];

    let first = env.cmd().args(args).assert().success();
    assert_eq!(json(&first.get_output().stdout)["changed"], true);
    let after_first = env.registry();

    env.set_live("cache,2,/dev/nvme1n1,Running,wt,-\n");
    let second = env.cmd().args(args).assert().success();
    let report = json(&second.get_output().stdout);
    assert_eq!(report["changed"], false);
    assert_eq!(report["failed"], false);
    assert_eq!(env.registry(), after_first);
}

#[test]
fn test_failed_attach_rolls_back_with_exit_5() {
    let env = Env::new();
    env.set_live("cache,1,/dev/nvme0n1,Running,wb,-\n");
    fs::write(env.path("fail-add-core"), "").unwrap();
    let before = env.registry();

    env.cmd()
        .args(["core", "configure", "--cache-id", "1", "--id", "1", "--device", "/dev/sda"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains(
            "ControlPlaneError: Internal casadm error(Error while adding core device)",
        ));

    assert_eq!(env.registry(), before);
}

#[test]
fn test_idle_host_configures_and_stops() {
    let env = Env::new();
    fs::write(env.path("caches.csv"), "No caches running\n").unwrap();

    env.cmd()
        .args(["cache", "configure", "--device", "/dev/nvme1n1", "--id", "2", "--mode", "wt"])
        .assert()
        .success();
    assert!(env.calls().contains("--start-cache --cache-device /dev/nvme1n1"));
    assert!(env.registry().contains("2\t/dev/nvme1n1\tWT\n"));

    env.cmd().arg("stop").assert().success();
    let out = env.cmd().args(["--format", "json", "facts"]).assert().success();
    let facts = &json(&out.get_output().stdout)["facts"];
    assert_eq!(facts["opencas_installed"], true);
    assert_eq!(facts["opencas_devices_started"], false);
}

#[test]
fn test_device_path_with_space_exit_1() {
    let env = Env::new();
    let before = env.registry();
    env.cmd()
        .args(["cache", "configure", "--device", "/dev/disk/by-id/nvme My Disk", "--id", "2", "--mode", "wt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file cannot hold"));
    assert_eq!(env.registry(), before);
    assert!(env.calls().is_empty());
}

#[test]
fn test_conflict_exit_3() {
    let env = Env::new();
    let before = env.registry();
    env.cmd()
        .args(["cache", "configure", "--device", "/dev/nvme0n1", "--id", "1", "--mode", "wt"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ConflictingConfig"));
    assert_eq!(env.registry(), before);
    assert!(env.calls().is_empty());
}

#[test]
fn test_validation_exit_1() {
    let env = Env::new();
    env.cmd()
        .args(["core", "check", "--cache-id", "1", "--id", "0", "--device", "/dev/sda"])
        .assert()
        .code(1);
    env.cmd()
        .args(["cache", "check", "--device", "/dev/cas1-1", "--id", "2", "--mode", "wt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Recursive configuration"));
}

#[test]
fn test_stop_and_reset() {
    let env = Env::new();
    env.cmd().arg("stop").assert().success().stdout(predicate::str::contains("ok"));
    assert!(!env.calls().contains("--stop-cache"));

    env.cmd().arg("zap").assert().success().stdout(predicate::str::contains("changed"));
    let registry = env.registry();
    assert!(registry.starts_with("version=19.3.0\n"));
    assert!(!registry.contains("/dev/nvme0n1"));
}

#[test]
fn test_stop_that_leaves_devices_exit_5() {
    let env = Env::new();
    env.set_live("cache,1,/dev/nvme0n1,Running,wb,-\ncore,1,/dev/sda,Active,-,/dev/cas1-1\n");
    env.cmd()
        .args(["stop", "--flush"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Couldn't stop all cache devices"));
    assert!(env.calls().contains("--stop-cache --cache-id 1"));
}

#[test]
fn test_facts_json() {
    let env = Env::new();
    env.set_live("cache,1,/dev/nvme0n1,Running,wb,-\n");
    let out = env.cmd().args(["--format", "json", "facts"]).assert().success();
    let facts = &json(&out.get_output().stdout)["facts"];
    assert_eq!(facts["opencas_installed"], true);
    assert_eq!(facts["opencas_config_nonempty"], true);
    assert_eq!(facts["opencas_devices_started"], true);
    assert_eq!(facts["opencas_installed_version"]["CAS CLI Utility"], "20.12.0");
}

#[test]
fn test_facts_without_casadm() {
    let env = Env::new();
    let out = env
        .cmd_with_casadm(Path::new("/nonexistent/casadm"))
        .args(["--format", "json", "facts"])
        .assert()
        .success();
    assert_eq!(
        json(&out.get_output().stdout)["facts"],
        serde_json::json!({"opencas_installed": false})
    );
}

#[test]
fn test_ioclass_validate() {
    let env = Env::new();
    let good = env.path("ioclass/db.csv");
    fs::write(
        &good,
        "IO class id,IO class name,Eviction priority,Allocation\n0,unclassified,22,1\n1,metadata&done,0,1\n",
    )
    .unwrap();
    let out = env
        .cmd()
        .args(["--format", "json", "ioclass", "validate"])
        .arg(&good)
        .assert()
        .success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["valid"], true);
    assert_eq!(v["rules"].as_array().unwrap().len(), 2);

    let bad = env.path("ioclass/bad.csv");
    fs::write(&bad, "IO class id,IO class name,Eviction priority\n0,unclassified,22\n").unwrap();
    env.cmd()
        .args(["ioclass", "validate"])
        .arg(&bad)
        .assert()
        .code(1);
}

#[test]
fn test_apply_manifest_stops_at_failure() {
    let env = Env::new();
    let manifest = env.path("tasks.yaml");
    fs::write(
        &manifest,
        "- configure_cache_device:\n    cache_device: /dev/nvme1n1\n    id: 2\n    cache_mode: wt\n\
         - configure_cache_device:\n    cache_device: /dev/nvme1n1\n    id: 3\n    cache_mode: wt\n\
         - zap: true\n",
    )
    .unwrap();

    let out = env
        .cmd()
        .args(["--format", "json", "apply", "--file"])
        .arg(&manifest)
        .assert()
        .code(3);
    let reports = json(&out.get_output().stdout);
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["changed"], true);
    assert_eq!(reports[1]["failed"], true);
    assert!(env.registry().contains("/dev/nvme1n1"));
}

#[test]
fn test_config_errors_exit_2() {
    let env = Env::new();
    let config = env.path("casdeploy.yaml");
    fs::write(&config, "registry: /tmp/typo\n").unwrap();
    env.cmd()
        .arg("--config")
        .arg(&config)
        .arg("facts")
        .assert()
        .code(2);

    env.cmd()
        .args(["apply", "--file"])
        .arg(Path::new("/nonexistent/tasks.yaml"))
        .assert()
        .code(2);
}

#[test]
fn test_version() {
    Command::cargo_bin("casdeploy")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
