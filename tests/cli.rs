// tests/cli.rs
//
// Drives the built binary through a pseudo-terminal, the way a user starts it.

use rexpect::spawn;
use std::process::{Command, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_core-view");
const TIMEOUT_MS: Option<u64> = Some(10_000);

#[test]
fn empty_image_list_prints_usage() {
    let mut session = spawn(&format!("{} /no/such/image.png", BIN), TIMEOUT_MS)
        .expect("failed to spawn core-view");
    session
        .exp_string("Skipping '/no/such/image.png'")
        .expect("missing argument was not reported");
    session
        .exp_string("no images to display")
        .expect("empty list was not reported");
    session.exp_string("Usage:").expect("usage was not printed");
    session
        .exp_string("Print the current source to stdout")
        .expect("key bindings were not printed");
    session.exp_eof().expect("core-view did not exit");
}

#[test]
fn empty_image_list_exits_with_status_one() {
    let output = Command::new(BIN)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run core-view");
    assert_eq!(output.status.code(), Some(1));
    // stdout is reserved for emitted sources.
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage:"));
}

#[test]
fn help_lists_the_key_bindings() {
    let output = Command::new(BIN)
        .arg("--help")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run core-view");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("--file-list <FILE>"));
    assert!(help.contains("Key bindings:"));
    assert!(help.contains("j / Right / PageDown / Space"));
    assert!(help.contains("q / Escape / Ctrl-C"));
}

#[test]
fn version_flag_prints_version() {
    let mut session =
        spawn(&format!("{} -v", BIN), TIMEOUT_MS).expect("failed to spawn core-view");
    session
        .exp_string(concat!("core-view ", env!("CARGO_PKG_VERSION")))
        .expect("version was not printed");
    session.exp_eof().expect("core-view did not exit");

    let status = Command::new(BIN)
        .arg("--version")
        .stdin(Stdio::null())
        .status()
        .expect("failed to run core-view");
    assert!(status.success());
}

#[test]
fn unknown_backend_is_a_usage_error() {
    let output = Command::new(BIN)
        .args(["--backend", "wayland", "/tmp"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run core-view");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown backend 'wayland'"));
}
