//! End-to-end tests running the `tm` binary against a temporary database.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn tm_binary() -> String {
    env!("CARGO_BIN_EXE_tm").to_string()
}

/// Runs `tm` with an isolated home, config and database.
fn tm(temp: &Path, args: &[&str]) -> Output {
    Command::new(tm_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join(".config"))
        .env("XDG_DATA_HOME", temp.join(".local/share"))
        .env("TM_DATABASE_PATH", temp.join("data/tm.db"))
        .env_remove("TM_OWNER")
        .env_remove("TM_MAX_ATTEMPTS")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run tm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "tm should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_tracker_flow_persists_between_runs() {
    let temp = TempDir::new().unwrap();

    let status = tm(temp.path(), &["status"]);
    assert_success(&status);
    assert!(stdout(&status).contains("Tracker for default: idle"));
    assert!(temp.path().join("data/tm.db").exists());

    let start = tm(temp.path(), &["start"]);
    assert_success(&start);
    assert!(stdout(&start).starts_with("Tracker started\n"));

    let again = tm(temp.path(), &["action", "START"]);
    assert_success(&again);
    assert!(stdout(&again).starts_with("Tracker already running\n"));

    let pause = tm(temp.path(), &["pause"]);
    assert_success(&pause);
    assert!(stdout(&pause).contains("paused"));

    let json = tm(temp.path(), &["status", "--json"]);
    assert_success(&json);
    let value: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(value["state"], "paused");
    assert_eq!(value["is_running"], false);

    let reset = tm(temp.path(), &["reset"]);
    assert_success(&reset);
    let json = tm(temp.path(), &["status", "--json"]);
    let value: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(value["state"], "idle");
    assert_eq!(value["accumulated_seconds"], 0);
}

#[test]
fn test_manual_entries_are_scoped_per_user() {
    let temp = TempDir::new().unwrap();

    let add = tm(
        temp.path(),
        &[
            "--user",
            "alice",
            "add",
            "Sprint planning",
            "--duration",
            "1:00:00",
            "--end",
            "1 hour ago",
            "--meta",
            "project=apollo",
        ],
    );
    assert_success(&add);
    assert!(stdout(&add).starts_with("Added 01:00:00 as \"Sprint planning\""));

    let listed = tm(temp.path(), &["--user", "alice", "entries", "--json"]);
    assert_success(&listed);
    let entries: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["duration_seconds"], 3600);
    assert_eq!(entries[0]["metadata"]["project"], "apollo");
    let id = entries[0]["id"].as_str().unwrap().to_string();

    let others = tm(temp.path(), &["--user", "bob", "entries"]);
    assert_success(&others);
    assert_eq!(stdout(&others), "No time entries for bob\n");

    let edit = tm(
        temp.path(),
        &["--user", "alice", "edit", &id, "--description", "Sprint planning (Q3)"],
    );
    assert_success(&edit);
    assert!(stdout(&edit).contains("Sprint planning (Q3)"));

    let delete = tm(temp.path(), &["--user", "bob", "delete", &id]);
    assert!(!delete.status.success());

    let delete = tm(temp.path(), &["--user", "alice", "delete", &id]);
    assert_success(&delete);
    let listed = tm(temp.path(), &["--user", "alice", "entries"]);
    assert_eq!(stdout(&listed), "No time entries for alice\n");
}

#[test]
fn test_book_after_tracking() {
    let temp = TempDir::new().unwrap();

    let nothing = tm(temp.path(), &["book", "Nothing yet"]);
    assert!(!nothing.status.success());
    assert!(String::from_utf8_lossy(&nothing.stderr).contains("no active tracker session"));

    assert_success(&tm(temp.path(), &["start"]));
    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert_success(&tm(temp.path(), &["pause"]));

    let booked = tm(temp.path(), &["book", "Bug triage", "--json", "--meta", "ticket=7"]);
    assert_success(&booked);
    let entry: serde_json::Value = serde_json::from_slice(&booked.stdout).unwrap();
    assert_eq!(entry["description"], "Bug triage");
    assert_eq!(entry["booked_from_tracker"], true);
    assert_eq!(entry["metadata"]["ticket"], 7);
    assert!(entry["duration_seconds"].as_u64().unwrap() >= 1);

    let json = tm(temp.path(), &["status", "--json"]);
    let value: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(value["state"], "idle");

    let again = tm(temp.path(), &["book", "Bug triage"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("no time tracked to book"));
}

#[test]
fn test_invalid_input_fails() {
    let temp = TempDir::new().unwrap();

    let action = tm(temp.path(), &["action", "stop"]);
    assert!(!action.status.success());
    assert!(String::from_utf8_lossy(&action.stderr).contains("invalid tracker action"));

    let add = tm(temp.path(), &["add", "Zero time", "--duration", "0"]);
    assert!(!add.status.success());

    let purge = tm(temp.path(), &["purge"]);
    assert!(!purge.status.success());
    assert!(String::from_utf8_lossy(&purge.stderr).contains("--yes"));

    let purge = tm(temp.path(), &["purge", "--yes"]);
    assert_success(&purge);
}
