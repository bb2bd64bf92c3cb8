//! Command-line behavior of the `widefill` binary.

#![cfg(all(feature = "cli", feature = "openai-image", feature = "flux-fill"))]

use std::process::Command;

fn widefill() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_widefill"));
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("REPLICATE_API_TOKEN");
    cmd
}

#[test]
fn test_missing_csv_exits_with_help() {
    let tmp = tempfile::tempdir().unwrap();
    let output = widefill()
        .current_dir(tmp.path())
        .arg("no_such_prompts.csv")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Error: CSV file 'no_such_prompts.csv' not found"));
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("--aspect-ratio"));
    assert!(!tmp.path().join("generated_images").exists());
}

#[test]
fn test_default_csv_path_is_input_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let output = widefill().current_dir(tmp.path()).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("'input.csv' not found"));
}

#[test]
fn test_rejects_unknown_aspect_ratio() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("input.csv"), "a cat\n").unwrap();
    let output = widefill()
        .current_dir(tmp.path())
        .args(["--aspect-ratio", "4:3"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("4:3"));
    assert!(!tmp.path().join("generated_images").exists());
}
