use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::core::{Record, Status};
use crate::export::write_atomic;

/// Where records come from and where status changes go.
pub trait RecordSource: Send + Sync {
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<Record>>;

    fn update_status(&self, id: &str, status: Status) -> Result<()> {
        let _ = status;
        Err(anyhow!(
            "このソースは読み取り専用です（{}）: {id}",
            self.describe()
        ))
    }
}

pub fn from_config(cfg: &SourceConfig) -> Result<Arc<dyn RecordSource>> {
    if let Some(command) = &cfg.command {
        return Ok(Arc::new(CommandSource::new(
            command.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )));
    }
    if let Some(path) = &cfg.path {
        return Ok(Arc::new(FileSource::new(path, &cfg.include)?));
    }
    Err(anyhow!(
        "レコードの取得元が指定されていません（--source か --command を指定してください）"
    ))
}

/// Accepts either a bare array of records or `{"findings": [...]}`.
pub fn parse_document(text: &str, origin: &str) -> Result<Vec<Record>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .with_context(|| format!("JSON の解析に失敗しました: {origin}"))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("findings") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(anyhow!(
                    "findings 配列が見つかりません: {origin}"
                ));
            }
        },
        _ => return Err(anyhow!("レコード配列ではありません: {origin}")),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| -> Result<Record> {
            let mut record = serde_json::from_value::<Record>(item.clone()).with_context(|| {
                match item.get("id").and_then(id_label) {
                    Some(id) => format!("レコードの形式が不正です: {origin} [{i}] id={id}"),
                    None => format!("レコードの形式が不正です: {origin} [{i}]"),
                }
            })?;
            record.raw = Some(item);
            Ok(record)
        })
        .collect()
}

fn id_label(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    include: GlobSet,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>, include: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            include: build_include_set(include)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files backing this source, in a stable order.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let meta = std::fs::metadata(&self.root)
            .with_context(|| format!("ソースが見つかりません: {}", self.root.display()))?;
        if meta.is_file() {
            return Ok(vec![self.root.clone()]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if self.include.is_match(rel) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn read_file(path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("ファイルの読み取りに失敗しました: {}", path.display()))
    }
}

impl RecordSource for FileSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn fetch(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for path in self.files()? {
            let text = Self::read_file(&path)?;
            records.extend(parse_document(&text, &path.display().to_string())?);
        }
        tracing::debug!(source = %self.describe(), count = records.len(), "fetched records");
        Ok(records)
    }

    /// Rewrites the file owning `id`, leaving every other field as it was.
    fn update_status(&self, id: &str, status: Status) -> Result<()> {
        for path in self.files()? {
            let text = Self::read_file(&path)?;
            let mut doc: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("JSON の解析に失敗しました: {}", path.display()))?;
            if !set_status_in_document(&mut doc, id, status) {
                continue;
            }
            let mut buf = serde_json::to_string_pretty(&doc)
                .context("JSON のシリアライズに失敗しました")?;
            buf.push('\n');
            write_atomic(&path, buf.as_bytes())?;
            tracing::debug!(id, %status, path = %path.display(), "status updated");
            return Ok(());
        }
        Err(anyhow!("レコードが見つかりません: {id}"))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn build_include_set(include: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in include {
        builder.add(Glob::new(pat).with_context(|| format!("include glob が不正です: {pat}"))?);
    }
    Ok(builder.build()?)
}

fn set_status_in_document(doc: &mut serde_json::Value, id: &str, status: Status) -> bool {
    let items = match doc {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(obj) => match obj.get_mut("findings") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return false,
        },
        _ => return false,
    };
    for item in items.iter_mut() {
        let matches = match item.get("id") {
            Some(serde_json::Value::String(s)) => s == id,
            Some(serde_json::Value::Number(n)) => n.to_string() == id,
            _ => false,
        };
        if matches {
            if let Some(obj) = item.as_object_mut() {
                obj.insert(
                    "status".to_string(),
                    serde_json::Value::String(status.as_str().to_string()),
                );
                return true;
            }
        }
    }
    false
}

/// Read-only source backed by an external command printing JSON.
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: String,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl RecordSource for CommandSource {
    fn describe(&self) -> String {
        format!("`{}`", self.command)
    }

    fn fetch(&self) -> Result<Vec<Record>> {
        let out = crate::platform::run_shell(&self.command, self.timeout)?;
        if !out.success() {
            return Err(anyhow!(
                "コマンドが失敗しました（exit={}）: {}\n{}",
                out.exit_code,
                self.command,
                out.stderr.trim()
            ));
        }
        parse_document(&out.stdout, &self.describe())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of one logical bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Issues every update even after failures and reports them together.
pub fn update_statuses<F>(
    source: &dyn RecordSource,
    ids: &[String],
    status: Status,
    mut on_item: F,
) -> BatchResult
where
    F: FnMut(&str, &Result<()>),
{
    let mut result = BatchResult::default();
    for id in ids {
        let outcome = source.update_status(id, status);
        on_item(id, &outcome);
        match outcome {
            Ok(()) => result.succeeded.push(id.clone()),
            Err(err) => {
                tracing::warn!(id = %id, error = %format!("{err:#}"), "status update failed");
                result.failed.push(BatchFailure {
                    id: id.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }
    result
}

/// Orders overlapping fetches: only a result newer than the last applied
/// one may replace the store.
#[derive(Debug, Clone, Default)]
pub struct FetchGate {
    issued: u64,
    applied: u64,
}

impl FetchGate {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn accept(&mut self, generation: u64) -> bool {
        if generation <= self.applied {
            tracing::debug!(generation, applied = self.applied, "stale fetch dropped");
            return false;
        }
        self.applied = generation;
        true
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued
    }
}

pub struct FetchResult {
    pub generation: u64,
    pub result: Result<Vec<Record>>,
}

pub fn spawn_fetch(source: Arc<dyn RecordSource>, generation: u64) -> Receiver<FetchResult> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        tracing::debug!(generation, source = %source.describe(), "fetch started");
        let result = source.fetch();
        let _ = tx.send(FetchResult { generation, result });
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use std::sync::Mutex;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "triagegrid-src-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn parses_bare_and_wrapped_documents() {
        let bare = parse_document(r#"[{"id":"a","severity":"HIGH"}]"#, "t").expect("bare");
        assert_eq!(bare[0].severity, Severity::High);
        let wrapped =
            parse_document(r#"{"findings":[{"id":1},{"id":2}]}"#, "t").expect("wrapped");
        assert_eq!(wrapped.len(), 2);
        assert!(parse_document(r#"{"items":[]}"#, "t").is_err());
    }

    #[test]
    fn malformed_record_error_names_its_id() {
        let err = parse_document(
            r#"[{"id":"ok","status":"OPEN"},{"id":"GHSA-9","status":"CLOSED"}]"#,
            "f.json",
        )
        .expect_err("unknown status");
        let msg = format!("{err:#}");
        assert!(msg.contains("[1] id=GHSA-9"), "{msg}");

        let err =
            parse_document(r#"[{"id":12,"severity":["HIGH"]}]"#, "f.json").expect_err("bad");
        assert!(format!("{err:#}").contains("id=12"));
    }

    #[test]
    fn directory_source_walks_matching_files() {
        let dir = temp_dir("walk");
        std::fs::create_dir_all(dir.join("nested")).expect("mkdir");
        std::fs::write(dir.join("a.json"), r#"[{"id":"a"}]"#).expect("write");
        std::fs::write(dir.join("nested/b.json"), r#"{"findings":[{"id":"b"}]}"#)
            .expect("write");
        std::fs::write(dir.join("notes.txt"), "ignore").expect("write");

        let source = FileSource::new(&dir, &["**/*.json".to_string()]).expect("source");
        let ids: Vec<String> = source
            .fetch()
            .expect("fetch")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn update_status_preserves_other_fields() {
        let dir = temp_dir("update");
        let path = dir.join("f.json");
        std::fs::write(
            &path,
            r#"{"scanner":"x","findings":[{"id":"a","status":"OPEN","cvss":9.1},{"id":7}]}"#,
        )
        .expect("write");
        let source = FileSource::new(&path, &[]).expect("source");

        source.update_status("a", Status::Resolved).expect("update a");
        source.update_status("7", Status::WontFix).expect("update 7");
        assert!(source.update_status("zzz", Status::Open).is_err());

        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(v["scanner"], "x");
        assert_eq!(v["findings"][0]["status"], "RESOLVED");
        assert_eq!(v["findings"][0]["cvss"], serde_json::json!(9.1));
        assert_eq!(v["findings"][1]["status"], "WONT_FIX");
        let _ = std::fs::remove_dir_all(&dir);
    }

    struct Flaky {
        fail: &'static [&'static str],
        calls: Mutex<Vec<String>>,
    }

    impl RecordSource for Flaky {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        fn fetch(&self) -> Result<Vec<Record>> {
            Ok(vec![])
        }

        fn update_status(&self, id: &str, _status: Status) -> Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(id.to_string());
            }
            if self.fail.contains(&id) {
                return Err(anyhow!("boom {id}"));
            }
            Ok(())
        }
    }

    #[test]
    fn batch_continues_past_failures() {
        let source = Flaky {
            fail: &["b"],
            calls: Mutex::new(vec![]),
        };
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut seen = 0;
        let result = update_statuses(&source, &ids, Status::Resolved, |_, _| seen += 1);

        assert_eq!(seen, 3);
        assert_eq!(result.succeeded, vec!["a", "c"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, "b");
        assert!(!result.is_complete());
        assert_eq!(source.calls.lock().expect("lock").len(), 3);
    }

    #[test]
    fn read_only_sources_reject_updates() {
        let source = CommandSource::new("true", Duration::from_secs(1));
        assert!(source.update_status("a", Status::Resolved).is_err());
    }

    #[test]
    fn fetch_gate_drops_stale_results() {
        let mut gate = FetchGate::default();
        let first = gate.issue();
        let second = gate.issue();
        assert!(gate.accept(second));
        assert!(!gate.accept(first));
        assert!(!gate.accept(second));
        let next = gate.issue();
        assert!(gate.accept(next));
    }
}
