use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::Record;

pub const CSV_COLUMNS: [&str; 6] = ["id", "severity", "status", "package_name", "cve_id", "title"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub const fn mime(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!("出力形式が不正です: {s}（csv|json を指定してください）")),
        }
    }
}

/// Which record set an export covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    Selected,
    Filtered,
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportScope::Selected => "selected",
            ExportScope::Filtered => "filtered",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub format: ExportFormat,
    pub scope: ExportScope,
    pub count: usize,
    pub filename: String,
    pub content: String,
}

impl ExportOutput {
    pub fn build(format: ExportFormat, scope: ExportScope, records: &[&Record]) -> Result<Self> {
        Ok(Self {
            format,
            scope,
            count: records.len(),
            filename: default_filename(format, OffsetDateTime::now_utc()),
            content: serialize(records, format)?,
        })
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

pub fn serialize(records: &[&Record], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Json => {
            let values = records
                .iter()
                .map(|r| r.to_json_value())
                .collect::<serde_json::Result<Vec<_>>>()
                .context("JSON のシリアライズに失敗しました")?;
            serde_json::to_string_pretty(&values).context("JSON のシリアライズに失敗しました")
        }
    }
}

fn to_csv(records: &[&Record]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .context("CSV ヘッダの書き込みに失敗しました")?;
    for r in records {
        writer
            .write_record([
                r.id.as_str(),
                r.severity.as_str(),
                r.status.as_str(),
                r.package_name.as_deref().unwrap_or(""),
                r.cve_id.as_deref().unwrap_or(""),
                r.display_title(),
            ])
            .with_context(|| format!("CSV 行の書き込みに失敗しました: {}", r.id))?;
    }
    let buf = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV の書き出しに失敗しました: {e}"))?;
    String::from_utf8(buf).context("CSV が UTF-8 ではありません")
}

pub fn default_filename(format: ExportFormat, at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("triagegrid-export-{stamp}.{}", format.extension())
}

/// Delivers export content somewhere the user can pick it up.
pub trait Downloader {
    fn download(&self, content: &str, filename: &str, mime: &str) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct DirDownloader {
    dir: PathBuf,
}

impl DirDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Downloader for DirDownloader {
    fn download(&self, content: &str, filename: &str, mime: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("出力ディレクトリの作成に失敗しました: {}", self.dir.display())
        })?;
        let path = self.dir.join(filename);
        write_atomic(&path, content.as_bytes())?;
        tracing::info!(path = %path.display(), mime, bytes = content.len(), "export written");
        Ok(path)
    }
}

/// Writes through a sibling temp file so readers never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("一時ファイルの書き込みに失敗しました: {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err)
            .with_context(|| format!("ファイルの置き換えに失敗しました: {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Severity, Status};
    use time::macros::datetime;

    #[test]
    fn csv_quotes_fields_with_delimiters() {
        let a = Record::new("1", Severity::High, Status::Open)
            .with_title("overflow, in \"parser\"")
            .with_package("lib,core");
        let b = Record::new("2", Severity::Low, Status::WontFix).with_title("line\nbreak");
        let csv = serialize(&[&a, &b], ExportFormat::Csv).expect("csv");
        assert_eq!(
            csv,
            "id,severity,status,package_name,cve_id,title\n\
             1,HIGH,OPEN,\"lib,core\",,\"overflow, in \"\"parser\"\"\"\n\
             2,LOW,WONT_FIX,,,\"line\nbreak\"\n"
        );
    }

    #[test]
    fn csv_of_nothing_is_header_only() {
        let csv = serialize(&[], ExportFormat::Csv).expect("csv");
        assert_eq!(csv, "id,severity,status,package_name,cve_id,title\n");
    }

    #[test]
    fn json_is_pretty_array_of_records() {
        let a = Record::new("1", Severity::Critical, Status::Open).with_cve("CVE-2024-0001");
        let json = serialize(&[&a], ExportFormat::Json).expect("json");
        assert!(json.starts_with("[\n"));
        let v: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(v[0]["id"], "1");
        assert_eq!(v[0]["severity"], "CRITICAL");
        assert_eq!(v[0]["cve_id"], "CVE-2024-0001");
    }

    #[test]
    fn json_keeps_fetched_key_spelling_and_id_type() {
        let records = crate::source::parse_document(
            r#"[{"id":7,"severity":"HIGH","packageName":"webcore","cveId":"CVE-1","cvss":9.8}]"#,
            "t",
        )
        .expect("parse");
        let refs: Vec<&Record> = records.iter().collect();
        let json = serialize(&refs, ExportFormat::Json).expect("json");
        let v: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(v[0]["id"], serde_json::json!(7));
        assert_eq!(v[0]["packageName"], "webcore");
        assert_eq!(v[0]["cveId"], "CVE-1");
        assert_eq!(v[0]["cvss"], serde_json::json!(9.8));
        assert!(v[0].get("package_name").is_none());
    }

    #[test]
    fn filename_carries_timestamp_and_extension() {
        let at = datetime!(2026-03-04 05:06:07 UTC);
        assert_eq!(
            default_filename(ExportFormat::Json, at),
            "triagegrid-export-20260304-050607.json"
        );
    }

    #[test]
    fn dir_downloader_writes_file() {
        let dir = std::env::temp_dir().join(format!("triagegrid-dl-{}", std::process::id()));
        let path = DirDownloader::new(&dir)
            .download("a,b\n", "x.csv", "text/csv")
            .expect("download");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a,b\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
