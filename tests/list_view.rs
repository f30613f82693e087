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
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/findings.json");
    triagegrid_cmd(home)
        .arg("--source")
        .arg(fixture)
        .args(args)
        .output()
        .expect("run triagegrid")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "triagegrid-list-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn list_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--json", "list"];
    full.extend_from_slice(args);
    let out = run(home, &full);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("parse json")
}

fn ids(v: &serde_json::Value) -> Vec<String> {
    v["records"]
        .as_array()
        .expect("records array")
        .iter()
        .map(|r| r["id"].as_str().expect("string id").to_string())
        .collect()
}

#[test]
fn default_view_sorts_by_severity_rank() {
    let home = make_temp_home();
    let v = list_json(&home, &[]);
    assert_eq!(ids(&v), ["7", "CVE-1", "dep-4", "lic-3"]);
    assert_eq!(v["filtered_count"], 4);
    assert_eq!(v["page"], 1);
    assert_eq!(v["total_pages"], 1);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn search_is_case_insensitive_across_fields() {
    let home = make_temp_home();
    assert_eq!(ids(&list_json(&home, &["--search", "  AUTHLIB "])), ["CVE-1"]);
    assert_eq!(ids(&list_json(&home, &["--search", "cve-2024"])), ["CVE-1"]);
    assert_eq!(ids(&list_json(&home, &["--search", "license"])), ["lic-3"]);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn facets_and_quick_filters_narrow_the_view() {
    let home = make_temp_home();
    assert_eq!(
        ids(&list_json(&home, &["--status", "OPEN", "--status", "in-progress"])),
        ["7", "CVE-1", "dep-4"]
    );
    assert_eq!(
        ids(&list_json(&home, &["--quick", "high-plus"])),
        ["7", "CVE-1"]
    );
    assert_eq!(
        ids(&list_json(&home, &["--quick", "unresolved", "--search", "dep"])),
        ["dep-4"]
    );
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn sort_desc_reverses_and_pages_clamp() {
    let home = make_temp_home();
    assert_eq!(
        ids(&list_json(&home, &["--sort", "id", "--desc"])),
        ["lic-3", "dep-4", "CVE-1", "7"]
    );

    let v = list_json(&home, &["--page-size", "3", "--page", "9"]);
    assert_eq!(v["page"], 2);
    assert_eq!(v["total_pages"], 2);
    assert_eq!(ids(&v), ["lic-3"]);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn empty_result_keeps_one_page() {
    let home = make_temp_home();
    let v = list_json(&home, &["--search", "no such finding"]);
    assert_eq!(v["filtered_count"], 0);
    assert_eq!(v["total_pages"], 1);
    assert_eq!(v["page"], 1);

    let out = run(&home, &["--no-color", "list", "--search", "no such finding"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("該当するレコードはありません"), "stdout={stdout}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn show_preserves_unknown_fields() {
    let home = make_temp_home();
    let out = run(&home, &["--json", "show", "lic-3"]);
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["scanner"], "osv");
    assert_eq!(v["name"], "License mismatch");
    let _ = std::fs::remove_dir_all(&home);
}
