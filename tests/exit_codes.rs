use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

fn triagegrid_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_triagegrid"));
    cmd.env("HOME", home);
    for (key, _) in std::env::vars() {
        if key.starts_with("TRIAGEGRID_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    triagegrid_cmd(home).args(args).output().expect("run triagegrid")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "triagegrid-exit-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn fixture() -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/findings.json")
        .display()
        .to_string()
}

#[test]
fn list_without_source_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["list"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("--source"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn malformed_source_exits_10() {
    let home = make_temp_home();
    let bad = home.join("bad.json");
    std::fs::write(&bad, b"{ not json").expect("write");
    let out = run(&home, &["--source", bad.to_str().expect("utf8"), "list"]);
    assert_eq!(out.status.code(), Some(10));
    let _ = std::fs::remove_dir_all(&home);
}

#[cfg(unix)]
#[test]
fn failing_source_command_exits_10() {
    let home = make_temp_home();
    let out = run(&home, &["--command", "echo boom >&2; exit 3", "list"]);
    assert_eq!(out.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("boom"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn ui_requires_tty_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--source", &fixture(), "ui"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn completion_unknown_shell_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn show_unknown_id_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--source", &fixture(), "show", "missing"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_log_level_exits_2() {
    let home = make_temp_home();
    let out = run(
        &home,
        &["--log-level", "triagegrid=verbose", "--source", &fixture(), "list"],
    );
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn zero_page_size_exits_2() {
    let home = make_temp_home();
    let out = run(&home, &["--source", &fixture(), "list", "--page-size", "0"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}
