//! Tests for shell completion generation and help output.
// Test module - relaxed lint rules
#![allow(clippy::expect_used)]

use std::process::Command;

fn permprobe_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_permprobe"))
}

#[test]
fn completions_generates_bash_output() {
    let output = permprobe_bin()
        .arg("completions")
        .arg("bash")
        .output()
        .expect("failed to execute");

    assert!(
        output.status.success(),
        "completions bash should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("permprobe"), "bash completions should name the binary");
    assert!(stdout.contains("--permission"), "bash completions should list run flags");
}

#[test]
fn completions_rejects_unknown_shell() {
    let output = permprobe_bin()
        .arg("completions")
        .arg("invalid-shell")
        .output()
        .expect("failed to execute");
    assert!(!output.status.success(), "invalid shell should fail");
}

#[test]
fn run_help_lists_matrix_flags() {
    let output = permprobe_bin()
        .args(["run", "--help"])
        .output()
        .expect("failed to execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--exe", "--config", "--scenario", "--timeout-ms", "--fail-fast", "--artifacts", "--json"] {
        assert!(stdout.contains(flag), "run --help should mention {flag}");
    }
}
