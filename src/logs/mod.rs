use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::export::{ExportFormat, ExportScope};
use crate::source::{BatchFailure, BatchResult};

const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Serialize)]
struct StatusUpdateLog<'a> {
    schema_version: &'static str,
    tool_version: &'static str,
    command: &'static str,
    started_at: String,
    finished_at: String,
    source: &'a str,
    target_status: String,
    status: &'static str,
    succeeded: &'a [String],
    failed: &'a [BatchFailure],
}

#[derive(Debug, Serialize)]
struct ExportLog<'a> {
    schema_version: &'static str,
    tool_version: &'static str,
    command: &'static str,
    finished_at: String,
    source: &'a str,
    format: ExportFormat,
    scope: ExportScope,
    count: usize,
    path: String,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    crate::config::app_dir(home_dir).join("logs")
}

pub fn write_status_update_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    source: &str,
    target_status: crate::core::Status,
    result: &BatchResult,
) -> Result<PathBuf> {
    let status = match (result.succeeded.is_empty(), result.failed.is_empty()) {
        (_, true) => "ok",
        (false, false) => "partial_error",
        (true, false) => "error",
    };
    let log = StatusUpdateLog {
        schema_version: SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION"),
        command: "set-status",
        started_at: rfc3339(started_at),
        finished_at: rfc3339(finished_at),
        source,
        target_status: target_status.to_string(),
        status,
        succeeded: &result.succeeded,
        failed: &result.failed,
    };
    write_log(home_dir, "status-update", finished_at, &log)
}

pub fn write_export_log(
    home_dir: &Path,
    finished_at: OffsetDateTime,
    source: &str,
    format: ExportFormat,
    scope: ExportScope,
    count: usize,
    path: &Path,
) -> Result<PathBuf> {
    let log = ExportLog {
        schema_version: SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION"),
        command: "export",
        finished_at: rfc3339(finished_at),
        source,
        format,
        scope,
        count,
        path: mask_home(path, home_dir),
    };
    write_log(home_dir, "export", finished_at, &log)
}

fn write_log<T: Serialize>(
    home_dir: &Path,
    prefix: &str,
    at: OffsetDateTime,
    log: &T,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = at.unix_timestamp_nanos();
    let path = dir.join(format!("{prefix}-{pid}-{ts}.json"));

    let buf = serde_json::to_vec_pretty(log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn mask_home(path: &Path, home_dir: &Path) -> String {
    let Ok(stripped) = path.strip_prefix(home_dir) else {
        return path.display().to_string();
    };
    let stripped = stripped.display().to_string();
    if stripped.is_empty() {
        "~".to_string()
    } else {
        format!("~/{stripped}")
    }
}

/// Where diagnostic events go.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    /// Used while the TUI owns the terminal.
    File(PathBuf),
}

/// `--log-level` wins over `TRIAGEGRID_LOG`; both accept `EnvFilter` syntax.
pub fn resolve_filter(cli_level: Option<&str>) -> Result<EnvFilter> {
    let directives = cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("TRIAGEGRID_LOG").ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    EnvFilter::try_new(&directives).with_context(|| format!("ログレベルが不正です: {directives}"))
}

pub fn init_tracing(filter: EnvFilter, target: &LogTarget) -> Result<()> {
    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("ログディレクトリの作成に失敗しました: {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("ログファイルを開けません: {}", path.display()))?;
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init();
        }
    }
    Ok(())
}
