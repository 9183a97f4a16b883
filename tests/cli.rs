use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs the binary with an isolated config home.
fn snapflow_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("snapflow").expect("binary exists");
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("RUST_LOG");
    cmd
}

fn saved_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default()
}

#[test]
fn snapflow_help_prints_usage() {
    let home = TempDir::new().unwrap();
    snapflow_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Route captured images and text through save and clipboard pipelines",
        ))
        .stdout(predicate::str::contains("--no-clipboard"));
}

#[test]
fn input_is_required() {
    let home = TempDir::new().unwrap();
    snapflow_cmd(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn missing_input_fails() {
    let home = TempDir::new().unwrap();
    snapflow_cmd(&home)
        .arg(home.path().join("nope.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn saves_text_capture_without_clipboard() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("note.txt");
    std::fs::write(&input, "hello from snapflow").unwrap();
    let out_dir = home.path().join("out");

    snapflow_cmd(&home)
        .arg(&input)
        .arg("--no-clipboard")
        .arg("--save-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"))
        .stdout(predicate::str::contains("Done."));

    let files = saved_files(&out_dir);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().unwrap(), "txt");
    assert_eq!(
        std::fs::read_to_string(&files[0]).unwrap(),
        "hello from snapflow"
    );
}

#[test]
fn json_mode_emits_event_lines() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("shot.png");
    std::fs::write(&input, [137, 80, 78, 71]).unwrap();

    let output = snapflow_cmd(&home)
        .arg(&input)
        .args(["--no-clipboard", "--json", "--save-dir"])
        .arg(home.path().join("out"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "started");
    assert_eq!(events.last().unwrap()["event"], "completed");
    assert!(events.iter().all(|e| e["task"] == 1));
    assert!(
        events
            .iter()
            .any(|e| e["event"] == "progress" && e["value"] == 1.0)
    );
}

#[test]
fn nothing_to_do_is_rejected() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("note.txt");
    std::fs::write(&input, "x").unwrap();

    snapflow_cmd(&home)
        .arg(&input)
        .args(["--no-save", "--no-clipboard"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to do"));
}

#[test]
fn binary_data_cannot_go_to_clipboard_only() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("dump.bin");
    std::fs::write(&input, [0, 1, 2]).unwrap();

    snapflow_cmd(&home)
        .arg(&input)
        .arg("--no-save")
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no route"));
}

#[test]
fn failing_clipboard_command_cancels_the_task() {
    let home = TempDir::new().unwrap();
    let input = home.path().join("note.txt");
    std::fs::write(&input, "x").unwrap();
    let config = home.path().join("custom.toml");
    std::fs::write(
        &config,
        "[clipboard]\ncommand = \"/nonexistent/snapflow-clipboard\"\n",
    )
    .unwrap();
    let out_dir = home.path().join("out");

    snapflow_cmd(&home)
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .arg("--save-dir")
        .arg(&out_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("canceled"))
        .stderr(predicate::str::contains("Failed to spawn"));

    // Saving ran before the clipboard step failed
    assert_eq!(saved_files(&out_dir).len(), 1);
}
