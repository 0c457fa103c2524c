//! Binary tests for `hg`; none of these reach the network

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use repostore::{BranchRef, NewRepository, RecordPatch, RepoStore};
use tempfile::TempDir;

fn hg(temp: &Path) -> Command {
    let config = temp.join("hg.yml");
    fs::write(&config, "log-level: debug\n").unwrap();

    let mut cmd = Command::cargo_bin("hg").unwrap();
    cmd.current_dir(temp)
        .env_remove("HG_ACCESS_TOKEN")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(temp.join("data"));
    cmd
}

fn seed_repository(temp: &Path) {
    let store = RepoStore::open(temp.join("data").join("repositories")).unwrap();
    let id = store.attach("acme", NewRepository::new("team", "acme", "tok")).unwrap();
    let repo = store.open_repository("acme").unwrap();
    repo.update(
        &id,
        RecordPatch::default().branches(vec![BranchRef::at("main", "abc123"), BranchRef::at("dev", "def456")]),
    )
    .unwrap();
}

#[test]
fn test_version() {
    Command::cargo_bin("hg")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("hg "));
}

#[test]
fn test_list_empty_store() {
    let temp = TempDir::new().unwrap();
    hg(temp.path())
        .args(["repo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories"));

    assert!(temp.path().join("data/logs/hallucigenia.log").is_file());
}

#[test]
fn test_add_requires_token() {
    let temp = TempDir::new().unwrap();
    hg(temp.path())
        .args(["repo", "add", "team", "acme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--token"));
}

#[test]
fn test_observe_and_list() {
    let temp = TempDir::new().unwrap();
    seed_repository(temp.path());

    hg(temp.path())
        .args(["repo", "observe", "acme", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("observes 1 branch(es)"));

    hg(temp.path())
        .args(["repo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme").and(predicate::str::contains("observed 1/2")));

    hg(temp.path())
        .args(["repo", "observe", "acme", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown branches"));
}

#[test]
fn test_script_roundtrip_via_stdin() {
    let temp = TempDir::new().unwrap();
    seed_repository(temp.path());

    hg(temp.path())
        .args(["script", "set", "acme", "--branch", "main", "-"])
        .write_stdin("echo deploying\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"));

    hg(temp.path())
        .args(["script", "show", "acme", "--branch", "main"])
        .assert()
        .success()
        .stdout("echo deploying\n");

    hg(temp.path())
        .args(["script", "list", "acme"])
        .assert()
        .success()
        .stdout("main\n");

    hg(temp.path())
        .args(["script", "set", "acme", "--branch", "main", "-"])
        .write_stdin("   \n")
        .assert()
        .success()
        .stdout(predicate::str::contains("script deleted"));

    hg(temp.path())
        .args(["script", "show", "acme", "--branch", "main"])
        .assert()
        .failure();
}

#[test]
fn test_remove_needs_confirmation() {
    let temp = TempDir::new().unwrap();
    seed_repository(temp.path());

    hg(temp.path())
        .args(["repo", "remove", "acme"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted"));
    assert!(temp.path().join("data/repositories/acme").is_dir());

    hg(temp.path()).args(["repo", "remove", "acme", "--yes"]).assert().success();
    assert!(!temp.path().join("data/repositories/acme").exists());
}

#[test]
fn test_clean_evicts_unobserved() {
    let temp = TempDir::new().unwrap();
    seed_repository(temp.path());
    let stale = temp.path().join("data/repositories/acme/branches/dev");
    fs::create_dir_all(&stale).unwrap();

    hg(temp.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evicted 1"));
    assert!(!stale.exists());
}
