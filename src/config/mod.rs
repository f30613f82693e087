use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::grid::{DEFAULT_PAGE_SIZE, SortField};

pub const DEFAULT_INCLUDE: &str = "**/*.json";
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub grid: GridConfig,
    pub refresh: RefreshConfig,
    pub source: SourceConfig,
    pub export: ExportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridConfig {
    pub page_size: usize,
    pub sort: SortField,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub auto: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportConfig {
    pub dir: String,
}

impl EffectiveConfig {
    pub fn defaults(home_dir: &Path) -> Self {
        Self {
            ui: UiConfig { color: true },
            grid: GridConfig {
                page_size: DEFAULT_PAGE_SIZE,
                sort: SortField::Severity,
            },
            refresh: RefreshConfig {
                interval_secs: 30,
                auto: false,
            },
            source: SourceConfig {
                path: None,
                include: vec![DEFAULT_INCLUDE.to_string()],
                command: None,
                timeout_secs: 30,
            },
            export: ExportConfig {
                dir: app_dir(home_dir).join("exports").display().to_string(),
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    grid: Option<RawGridConfig>,
    refresh: Option<RawRefreshConfig>,
    source: Option<RawSourceConfig>,
    export: Option<RawExportConfig>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawGridConfig {
    page_size: Option<usize>,
    sort: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRefreshConfig {
    interval_secs: Option<u64>,
    auto: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawSourceConfig {
    path: Option<String>,
    include: Option<Vec<String>>,
    command: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawExportConfig {
    dir: Option<String>,
}

/// `~/.config/triagegrid`: config, audit logs and exports live here.
pub fn app_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/triagegrid")
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    app_dir(home_dir).join("config.toml")
}

/// Defaults, then the TOML file, then `TRIAGEGRID_*` variables.
pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::defaults(home_dir);

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| std::env::var_os("TRIAGEGRID_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw)?;
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        anyhow::bail!("設定ファイルが見つかりません: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) -> Result<()> {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
    }

    if let Some(grid) = raw.grid {
        if let Some(page_size) = grid.page_size {
            cfg.grid.page_size = page_size;
        }
        if let Some(sort) = grid.sort {
            cfg.grid.sort = sort
                .parse::<SortField>()
                .map_err(anyhow::Error::msg)
                .context("grid.sort")?;
        }
    }

    if let Some(refresh) = raw.refresh {
        if let Some(interval_secs) = refresh.interval_secs {
            cfg.refresh.interval_secs = interval_secs;
        }
        if let Some(auto) = refresh.auto {
            cfg.refresh.auto = auto;
        }
    }

    if let Some(source) = raw.source {
        if source.path.is_some() {
            cfg.source.path = source.path;
        }
        if let Some(include) = source.include {
            cfg.source.include = include;
        }
        if source.command.is_some() {
            cfg.source.command = source.command;
        }
        if let Some(timeout_secs) = source.timeout_secs {
            cfg.source.timeout_secs = timeout_secs;
        }
    }

    if let Some(export) = raw.export {
        if let Some(dir) = export.dir {
            cfg.export.dir = dir;
        }
    }

    Ok(())
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("TRIAGEGRID_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).context("TRIAGEGRID_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_GRID_PAGE_SIZE") {
        cfg.grid.page_size = v
            .trim()
            .parse::<usize>()
            .context("TRIAGEGRID_GRID_PAGE_SIZE")?;
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_GRID_SORT") {
        cfg.grid.sort = v
            .parse::<SortField>()
            .map_err(anyhow::Error::msg)
            .context("TRIAGEGRID_GRID_SORT")?;
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_REFRESH_INTERVAL_SECS") {
        cfg.refresh.interval_secs = v
            .trim()
            .parse::<u64>()
            .context("TRIAGEGRID_REFRESH_INTERVAL_SECS")?;
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_REFRESH_AUTO") {
        cfg.refresh.auto = parse_bool(&v).context("TRIAGEGRID_REFRESH_AUTO")?;
    }
    if let Some(v) = non_empty_env("TRIAGEGRID_SOURCE_PATH") {
        cfg.source.path = Some(v);
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_SOURCE_INCLUDE") {
        let parts: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            cfg.source.include = parts;
        }
    }
    if let Some(v) = non_empty_env("TRIAGEGRID_SOURCE_COMMAND") {
        cfg.source.command = Some(v);
    }
    if let Ok(v) = std::env::var("TRIAGEGRID_SOURCE_TIMEOUT_SECS") {
        cfg.source.timeout_secs = v
            .trim()
            .parse::<u64>()
            .context("TRIAGEGRID_SOURCE_TIMEOUT_SECS")?;
    }
    if let Some(v) = non_empty_env("TRIAGEGRID_EXPORT_DIR") {
        cfg.export.dir = v;
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.grid.page_size == 0 {
        anyhow::bail!("grid.page_size は 1 以上を指定してください");
    }
    if !(1..=MAX_REFRESH_INTERVAL_SECS).contains(&cfg.refresh.interval_secs) {
        anyhow::bail!(
            "refresh.interval_secs は 1〜{MAX_REFRESH_INTERVAL_SECS} の範囲で指定してください"
        );
    }
    if cfg.source.timeout_secs == 0 {
        anyhow::bail!("source.timeout_secs は 1 以上を指定してください");
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    let v = std::env::var(key).ok()?;
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

pub fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}
