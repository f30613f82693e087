use std::collections::HashSet;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::EffectiveConfig;
use crate::core::{Record, Severity, Status};
use crate::export::{DirDownloader, Downloader, ExportFormat, ExportOutput};
use crate::grid::{Facet, FacetValue, Grid, GridAction, QuickFilter, SortField, SortOrder, SortState};
use crate::logs::LogTarget;
use crate::source::RecordSource;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "triagegrid",
    version,
    about = "セキュリティ所見を検索・絞り込み・並べ替えし、選択した所見の状態変更やエクスポートを行うトリアージツール"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// JSON file or directory of JSON files
    #[arg(long, global = true, conflicts_with = "command")]
    pub source: Option<PathBuf>,
    /// Shell command printing records as JSON
    #[arg(long, global = true)]
    pub command: Option<String>,
    /// Source command timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub subcommand: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    List(ListArgs),
    Show(ShowArgs),
    Export(ExportArgs),
    SetStatus(SetStatusArgs),
    Ui(UiArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

/// Filter and sort flags shared by the record-reading commands.
#[derive(Debug, Args, Default)]
pub struct ViewArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub severity: Vec<Severity>,
    #[arg(long = "status")]
    pub status: Vec<Status>,
    #[arg(long)]
    pub quick: Option<QuickFilter>,
    #[arg(long)]
    pub sort: Option<SortField>,
    #[arg(long)]
    pub desc: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub view: ViewArgs,
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub view: ViewArgs,
    #[arg(long, default_value = "csv")]
    pub format: ExportFormat,
    /// Export exactly these ids (in sort order) instead of the filtered set
    #[arg(long = "select")]
    pub select: Vec<String>,
    #[arg(long, conflicts_with = "save")]
    pub out: Option<PathBuf>,
    /// Write into the configured export directory
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Args)]
pub struct SetStatusArgs {
    #[arg(long = "status")]
    pub status: Status,
    #[arg(long = "id", required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct UiArgs {}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let is_ui_mode = matches!(&cli.subcommand, Commands::Ui(_));
    let filter =
        crate::logs::resolve_filter(cli.log_level.as_deref()).map_err(crate::exit::invalid_args_err)?;
    let log_target = if is_ui_mode {
        LogTarget::File(crate::logs::logs_dir(&home_dir).join("tui.log"))
    } else {
        LogTarget::Stderr
    };
    crate::logs::init_tracing(filter, &log_target)?;

    let mut cfg = crate::config::load(cli.config.as_deref(), &home_dir)
        .map_err(crate::exit::invalid_args_err)?;
    apply_cli_overrides(&mut cfg, &cli)?;

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        stdin_is_tty,
        stdout_is_tty,
        quiet: cli.quiet,
    };
    let show_progress = stderr_is_tty && !cli.quiet && !cli.json;

    match cli.subcommand {
        Commands::List(args) => {
            let page_size = match args.page_size {
                Some(0) => return Err(crate::exit::invalid_args("--page-size は 1 以上を指定してください")),
                Some(n) => n,
                None => cfg.grid.page_size,
            };
            let source = open_source(&cfg)?;
            let records = fetch_records(source.as_ref(), show_progress)?;
            let mut grid = build_grid(records, &args.view, &cfg, page_size);
            grid.dispatch(GridAction::SetPage(args.page));
            if cli.json {
                write_json(&PageJson::from_grid(&grid))?;
            } else {
                crate::ui::print_page(&grid, &ui_cfg);
            }
        }
        Commands::Show(args) => {
            let source = open_source(&cfg)?;
            let records = fetch_records(source.as_ref(), show_progress)?;
            let grid = Grid::with_records(records, cfg.grid.page_size);
            let Some(record) = grid.record(&args.id) else {
                return Err(crate::exit::invalid_args(format!(
                    "レコードが見つかりません: {}",
                    args.id
                )));
            };
            if cli.json {
                write_json(record)?;
            } else {
                crate::ui::print_record(record, &ui_cfg);
            }
        }
        Commands::Export(args) => {
            let source = open_source(&cfg)?;
            let records = fetch_records(source.as_ref(), show_progress)?;
            let mut grid = build_grid(records, &args.view, &cfg, cfg.grid.page_size);
            select_ids(&mut grid, &args.select, &ui_cfg);
            let output = grid.export(args.format)?;

            let target = if args.save {
                Some(
                    DirDownloader::new(&cfg.export.dir)
                        .download(&output.content, &output.filename, output.mime())?,
                )
            } else if let Some(out) = &args.out {
                Some(write_export_to(out, &output)?)
            } else {
                None
            };

            match target {
                Some(path) => {
                    let log = crate::logs::write_export_log(
                        &home_dir,
                        OffsetDateTime::now_utc(),
                        &source.describe(),
                        output.format,
                        output.scope,
                        output.count,
                        &path,
                    )?;
                    tracing::debug!(log = %log.display(), "export audit log written");
                    if cli.json {
                        write_json(&ExportJson {
                            path: path.display().to_string(),
                            format: output.format,
                            scope: output.scope.to_string(),
                            count: output.count,
                        })?;
                    } else if !ui_cfg.quiet {
                        println!(
                            "エクスポートしました: {}（{}・{}件）",
                            path.display(),
                            output.scope,
                            output.count
                        );
                    }
                }
                None => write_stdout(&output.content)?,
            }
        }
        Commands::SetStatus(args) => {
            let source = open_source(&cfg)?;
            let records = fetch_records(source.as_ref(), show_progress)?;
            let mut grid = Grid::with_records(records, cfg.grid.page_size);
            select_ids(&mut grid, &args.ids, &ui_cfg);

            let total = grid.live_selected_records().len() as u64;
            let pb = if show_progress && total > 0 {
                let pb = indicatif::ProgressBar::new(total);
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_message(format!("状態を {} に変更中...", args.status));
                Some(pb)
            } else {
                None
            };

            let started_at = OffsetDateTime::now_utc();
            let result = grid.bulk_update_status_with(source.as_ref(), args.status, |_, _| {
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
            });
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let Some(result) = result else {
                return Err(crate::exit::invalid_args(
                    "指定された ID はいずれもレコードに存在しません",
                ));
            };

            crate::logs::write_status_update_log(
                &home_dir,
                started_at,
                OffsetDateTime::now_utc(),
                &source.describe(),
                args.status,
                &result,
            )?;

            if cli.json {
                write_json(&result)?;
            } else {
                crate::ui::print_batch_result(&result, &ui_cfg);
            }
            if !result.is_complete() {
                return Err(crate::exit::partial_failure(format!(
                    "{}件中 {}件の状態変更に失敗しました",
                    result.total(),
                    result.failed.len()
                )));
            }
        }
        Commands::Ui(_args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("ui は --json と併用できません"));
            }
            if !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "ui は TTY が必要です（stdin + stdout）",
                ));
            }
            let source = open_source(&cfg)?;
            crate::tui::run(crate::tui::TuiOptions {
                source,
                home_dir: home_dir.clone(),
                color: cfg.ui.color && !cli.no_color,
                page_size: cfg.grid.page_size,
                sort: cfg.grid.sort,
                refresh_interval: Duration::from_secs(cfg.refresh.interval_secs),
                auto_refresh: cfg.refresh.auto,
                export_dir: PathBuf::from(&cfg.export.dir),
            })?;
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "triagegrid", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    let s = toml::to_string_pretty(&cfg)
                        .context("設定の TOML 変換に失敗しました")?;
                    write_stdout(&s)?;
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `triagegrid config --show` を使用してください");
            }
        }
    }

    Ok(())
}

fn apply_cli_overrides(cfg: &mut EffectiveConfig, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.source {
        cfg.source.path = Some(path.display().to_string());
        cfg.source.command = None;
    }
    if let Some(command) = &cli.command {
        cfg.source.command = Some(command.clone());
    }
    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args("--timeout は 1 以上を指定してください"));
        }
        cfg.source.timeout_secs = timeout;
    }
    Ok(())
}

fn open_source(cfg: &EffectiveConfig) -> Result<Arc<dyn RecordSource>> {
    crate::source::from_config(&cfg.source).map_err(crate::exit::invalid_args_err)
}

fn fetch_records(source: &dyn RecordSource, show_progress: bool) -> Result<Vec<Record>> {
    let pb = if show_progress {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message(format!("取得中 {}", source.describe()));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };
    let res = source
        .fetch()
        .with_context(|| format!("レコードの取得に失敗しました: {}", source.describe()));
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    res.map_err(crate::exit::fetch_failed_err)
}

pub fn build_grid(
    records: Vec<Record>,
    view: &ViewArgs,
    cfg: &EffectiveConfig,
    page_size: usize,
) -> Grid {
    let mut grid = Grid::with_records(records, page_size);
    let order = if view.desc {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    };
    grid.dispatch(GridAction::SetSort(SortState::new(
        view.sort.unwrap_or(cfg.grid.sort),
        order,
    )));
    if let Some(quick) = view.quick {
        grid.dispatch(GridAction::ApplyQuickFilter(quick));
    }
    if !view.severity.is_empty() {
        let values: Vec<FacetValue> = view.severity.iter().copied().map(FacetValue::Severity).collect();
        grid.dispatch(GridAction::SetFacet(Facet::Severity, values));
    }
    if !view.status.is_empty() {
        let values: Vec<FacetValue> = view.status.iter().copied().map(FacetValue::Status).collect();
        grid.dispatch(GridAction::SetFacet(Facet::Status, values));
    }
    if let Some(search) = &view.search {
        grid.dispatch(GridAction::SetSearch(search.clone()));
    }
    grid
}

/// Selects each distinct id once; unknown ids stay inert.
fn select_ids(grid: &mut Grid, ids: &[String], ui_cfg: &UiConfig) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if grid.record(id).is_none() {
            tracing::warn!(id = %id, "selected id not present in source");
            if !ui_cfg.quiet {
                eprintln!("警告: レコードが見つかりません: {id}");
            }
        }
        grid.dispatch(GridAction::ToggleSelect(id.clone()));
    }
}

fn write_export_to(out: &Path, output: &ExportOutput) -> Result<PathBuf> {
    if out.is_dir() {
        return DirDownloader::new(out).download(&output.content, &output.filename, output.mime());
    }
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("出力ディレクトリの作成に失敗しました: {}", parent.display()))?;
    }
    crate::export::write_atomic(out, output.content.as_bytes())?;
    Ok(out.to_path_buf())
}

#[derive(Debug, Serialize)]
struct PageJson<'a> {
    page: usize,
    total_pages: usize,
    page_size: usize,
    filtered_count: usize,
    records: Vec<&'a Record>,
}

impl<'a> PageJson<'a> {
    fn from_grid(grid: &'a Grid) -> Self {
        Self {
            page: grid.page(),
            total_pages: grid.total_pages(),
            page_size: grid.page_size(),
            filtered_count: grid.filtered_count(),
            records: grid.page_rows(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportJson {
    path: String,
    format: ExportFormat,
    scope: String,
    count: usize,
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let buf = serde_json::to_string_pretty(value)?;
    write_stdout(&buf)
}

/// Prints `s` with a trailing newline, treating a closed pipe as success.
fn write_stdout(s: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(s.as_bytes()) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    if s.ends_with('\n') {
        return Ok(());
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}
