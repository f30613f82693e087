use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{Record, Severity};
use crate::grid::Grid;
use crate::source::BatchResult;

const TITLE_MAX_CHARS: usize = 60;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub quiet: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--log-level debug` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `triagegrid --help` を参照してください"
    );
}

pub fn print_page(grid: &Grid, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_page(&mut out, grid, cfg.color);
}

pub fn write_page(out: &mut dyn Write, grid: &Grid, color: bool) {
    let rows = grid.page_rows();
    let _ = writeln!(
        out,
        "{}件中 {}件表示（ページ {}/{}・並び順: {} {}）",
        grid.filtered_count(),
        rows.len(),
        grid.page(),
        grid.total_pages(),
        grid.sort().field,
        order_arrow(grid)
    );
    if let Some(quick) = grid.filter().quick {
        let _ = writeln!(out, "クイックフィルタ: {}", quick.label());
    }
    if rows.is_empty() {
        let _ = writeln!(out, "（該当するレコードはありません）");
        return;
    }
    let _ = writeln!(out);
    write_records_table(out, &rows, |id| grid.is_selected(id), color);
}

fn order_arrow(grid: &Grid) -> &'static str {
    match grid.sort().order {
        crate::grid::SortOrder::Asc => "↑",
        crate::grid::SortOrder::Desc => "↓",
    }
}

fn write_records_table(
    out: &mut dyn Write,
    rows: &[&Record],
    is_selected: impl Fn(&str) -> bool,
    color: bool,
) {
    let label_id = "ID";
    let label_sev = "深刻度";
    let label_status = "状態";
    let label_pkg = "パッケージ";
    let label_title = "タイトル";

    let id_w = column_width(rows.iter().map(|r| r.id.as_str()), label_id);
    let sev_w = column_width(rows.iter().map(|r| r.severity.as_str()), label_sev);
    let status_w = column_width(rows.iter().map(|r| r.status.as_str()), label_status);
    let pkg_w = column_width(
        rows.iter().map(|r| r.package_name.as_deref().unwrap_or("-")),
        label_pkg,
    );

    let _ = writeln!(
        out,
        "   {}  {}  {}  {}  {}",
        pad_end_display(label_id, id_w),
        pad_end_display(label_sev, sev_w),
        pad_end_display(label_status, status_w),
        pad_end_display(label_pkg, pkg_w),
        label_title
    );
    let _ = writeln!(
        out,
        "   {}  {}  {}  {}  {}",
        "-".repeat(id_w),
        "-".repeat(sev_w),
        "-".repeat(status_w),
        "-".repeat(pkg_w),
        "-".repeat(visible_width_ansi(label_title))
    );

    for r in rows {
        let mark = if is_selected(&r.id) { "*" } else { " " };
        let sev = pad_end_ansi(&format_severity(r.severity, color), sev_w);
        let _ = writeln!(
            out,
            " {mark} {}  {sev}  {}  {}  {}",
            pad_end_display(&r.id, id_w),
            pad_end_display(r.status.as_str(), status_w),
            pad_end_display(r.package_name.as_deref().unwrap_or("-"), pkg_w),
            truncate_middle(r.display_title(), TITLE_MAX_CHARS)
        );
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, label: &str) -> usize {
    values
        .map(visible_width_ansi)
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label))
}

pub fn print_record(record: &Record, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_record(&mut out, record, cfg.color);
}

pub fn write_record(out: &mut dyn Write, record: &Record, color: bool) {
    let _ = writeln!(out, "ID: {}", record.id);
    let _ = writeln!(out, "深刻度: {}", format_severity(record.severity, color));
    let _ = writeln!(out, "状態: {}", record.status);
    if !record.display_title().is_empty() {
        let _ = writeln!(out, "タイトル: {}", record.display_title());
    }
    if let Some(pkg) = &record.package_name {
        let _ = writeln!(out, "パッケージ: {pkg}");
    }
    if let Some(cve) = &record.cve_id {
        let _ = writeln!(out, "CVE: {cve}");
    }
    if !record.extra.is_empty() {
        let _ = writeln!(out, "その他:");
        for (k, v) in &record.extra {
            let _ = writeln!(out, "  {k}: {}", extra_value(v));
        }
    }
}

pub fn extra_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn print_batch_result(result: &BatchResult, cfg: &UiConfig) {
    if cfg.quiet && result.is_complete() {
        return;
    }
    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "状態変更: 成功 {}件 / 失敗 {}件",
        result.succeeded.len(),
        result.failed.len()
    );
    for failure in &result.failed {
        let _ = writeln!(out, "- {}: {}", failure.id, failure.error);
    }
}

pub fn severity_color_code(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "35",
        Severity::High => "31",
        Severity::Medium => "33",
        Severity::Low => "32",
        Severity::Unknown => "90",
    }
}

fn format_severity(severity: Severity, color: bool) -> String {
    let s = severity.as_str();
    if !color {
        return s.to_string();
    }
    format!("\x1b[{}m{s}\x1b[0m", severity_color_code(severity))
}

pub fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_ansi(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_end_display(s: &str, width: usize) -> String {
    pad_end_ansi(s, width)
}

pub fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Status;
    use crate::grid::GridAction;

    #[test]
    fn width_ignores_ansi_and_counts_wide_chars() {
        assert_eq!(visible_width_ansi("\x1b[31mHIGH\x1b[0m"), 4);
        assert_eq!(visible_width_ansi("深刻度"), 6);
    }

    #[test]
    fn truncate_keeps_both_ends() {
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("short", 7), "short");
    }

    #[test]
    fn page_table_marks_selected_rows() {
        let records = vec![
            Record::new("a", Severity::High, Status::Open).with_title("one"),
            Record::new("b", Severity::Low, Status::Resolved).with_package("zlib"),
        ];
        let mut grid = Grid::with_records(records, 25);
        grid.dispatch(GridAction::ToggleSelect("b".to_string()));

        let mut buf = Vec::new();
        write_page(&mut buf, &grid, false);
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("2件中 2件表示（ページ 1/1"), "{text}");
        assert!(text.lines().any(|l| l.starts_with(" * b ")), "{text}");
        assert!(text.lines().any(|l| l.starts_with("   a ")), "{text}");
    }

    #[test]
    fn empty_page_says_so() {
        let grid = Grid::with_records(vec![], 25);
        let mut buf = Vec::new();
        write_page(&mut buf, &grid, false);
        assert!(String::from_utf8(buf).expect("utf8").contains("該当するレコードはありません"));
    }
}
