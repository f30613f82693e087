use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use time::OffsetDateTime;

use crate::core::{Record, Severity, Status};
use crate::export::{DirDownloader, Downloader, ExportFormat};
use crate::grid::{
    FacetValue, Grid, GridAction, Key, KeyEffect, KeyInput, QuickFilter, SortField, SortOrder,
    SortState,
};
use crate::source::{BatchResult, FetchGate, FetchResult, RecordSource};

const PAGE_SIZE_STEP: usize = 5;
const FETCH_WAIT_LIMIT: Duration = Duration::from_secs(120);
const BULK_WAIT_LIMIT: Duration = Duration::from_secs(300);

pub struct TuiOptions {
    pub source: Arc<dyn RecordSource>,
    pub home_dir: PathBuf,
    pub color: bool,
    pub page_size: usize,
    pub sort: SortField,
    pub refresh_interval: Duration,
    pub auto_refresh: bool,
    pub export_dir: PathBuf,
}

pub fn run(opts: TuiOptions) -> Result<()> {
    enable_raw_mode().context("raw mode の有効化")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("代替画面への切り替え")?;

    let mut tui = Tui {
        terminal: Terminal::new(CrosstermBackend::new(stdout)).context("ターミナルの初期化")?,
    };
    tui.terminal.clear().ok();

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| run_app(&mut tui.terminal, opts)));

    let _ = tui.terminal.show_cursor();
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen);

    match res {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!(
            "TUI 内部で panic が発生しました（端末状態は復旧済みのはずです）"
        )),
    }
}

struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Grid,
    Detail,
    Facets,
    StatusPicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Retry {
    Fetch,
    StatusUpdate { status: Status, ids: Vec<String> },
}

#[derive(Debug, Clone)]
struct Notice {
    kind: NoticeKind,
    message: String,
    retry: Option<Retry>,
}

struct PendingFetch {
    generation: u64,
    rx: mpsc::Receiver<FetchResult>,
    started_at: Instant,
}

struct PendingStatusUpdate {
    status: Status,
    rx: mpsc::Receiver<BatchResult>,
    started_at: Instant,
    started_wall: OffsetDateTime,
}

struct App {
    grid: Grid,
    source: Arc<dyn RecordSource>,
    home_dir: PathBuf,
    export_dir: PathBuf,
    color: bool,
    refresh_interval: Duration,

    screen: Screen,
    search_input: String,
    search_mode: bool,
    grid_state: ListState,

    detail_id: Option<String>,
    detail_scroll: u16,
    facet_state: ListState,
    status_state: ListState,
    status_targets: Vec<String>,
    status_return_to: Screen,

    notice: Option<Notice>,
    gate: FetchGate,
    pending_fetches: Vec<PendingFetch>,
    pending_status: Option<PendingStatusUpdate>,
    last_fetch_at: Option<OffsetDateTime>,

    tick: u64,
}

impl App {
    fn new(opts: TuiOptions) -> Self {
        let mut grid = Grid::new(opts.page_size);
        grid.dispatch(GridAction::SetSort(SortState::new(opts.sort, SortOrder::Asc)));
        grid.attach_keyboard();
        Self {
            grid,
            source: opts.source,
            home_dir: opts.home_dir,
            export_dir: opts.export_dir,
            color: opts.color,
            refresh_interval: opts.refresh_interval,
            screen: Screen::Grid,
            search_input: String::new(),
            search_mode: false,
            grid_state: ListState::default(),
            detail_id: None,
            detail_scroll: 0,
            facet_state: ListState::default(),
            status_state: ListState::default(),
            status_targets: Vec::new(),
            status_return_to: Screen::Grid,
            notice: None,
            gate: FetchGate::default(),
            pending_fetches: Vec::new(),
            pending_status: None,
            last_fetch_at: None,
            tick: 0,
        }
    }

    fn is_fetching(&self) -> bool {
        !self.pending_fetches.is_empty()
    }

    fn move_list_selection(state: &mut ListState, len: usize, delta: i32) {
        if len == 0 {
            state.select(None);
            return;
        }
        let selected = state.selected().unwrap_or(0) as i32;
        let next = (selected + delta).clamp(0, (len as i32).saturating_sub(1));
        state.select(Some(next as usize));
    }

    fn info(&mut self, message: impl Into<String>) {
        self.notice = Some(Notice {
            kind: NoticeKind::Info,
            message: message.into(),
            retry: None,
        });
    }

    fn error(&mut self, message: impl Into<String>, retry: Option<Retry>) {
        self.notice = Some(Notice {
            kind: NoticeKind::Error,
            message: message.into(),
            retry,
        });
    }
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, opts: TuiOptions) -> Result<()> {
    let auto_refresh = opts.auto_refresh;
    let mut app = App::new(opts);

    if auto_refresh {
        toggle_auto_refresh(&mut app, Instant::now());
    }
    start_fetch(&mut app);

    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    let res = loop {
        if let Err(err) = terminal.draw(|f| draw(f, &mut app)).context("画面描画") {
            break Err(err);
        }

        poll_fetches(&mut app);
        poll_status_update(&mut app);
        if app.grid.poll_refresh(Instant::now()) {
            start_fetch(&mut app);
        }

        let mut timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if let Some(due) = app.grid.refresh().time_until_due(Instant::now()) {
            timeout = timeout.min(due);
        }
        match event::poll(timeout).context("イベント待ち") {
            Ok(true) => match event::read().context("イベント読み取り") {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    match handle_key(&mut app, key) {
                        Ok(true) => break Ok(()),
                        Ok(false) => {}
                        Err(err) => break Err(err),
                    }
                }
                Ok(_) => {}
                Err(err) => break Err(err),
            },
            Ok(false) => {}
            Err(err) => break Err(err),
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick = app.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    };

    app.grid.dispose();
    res
}

fn start_fetch(app: &mut App) {
    let generation = app.gate.issue();
    let rx = crate::source::spawn_fetch(Arc::clone(&app.source), generation);
    app.pending_fetches.push(PendingFetch {
        generation,
        rx,
        started_at: Instant::now(),
    });
}

fn poll_fetches(app: &mut App) {
    let pending = std::mem::take(&mut app.pending_fetches);
    for fetch in pending {
        match fetch.rx.try_recv() {
            Ok(FetchResult { generation, result }) => match result {
                Ok(records) => {
                    if app.gate.accept(generation) {
                        tracing::debug!(generation, count = records.len(), "fetch applied");
                        app.grid.dispatch(GridAction::ReplaceRecords(records));
                        app.last_fetch_at = Some(OffsetDateTime::now_utc());
                        if app
                            .notice
                            .as_ref()
                            .is_some_and(|n| n.retry == Some(Retry::Fetch))
                        {
                            app.notice = None;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(generation, error = %format!("{err:#}"), "fetch failed");
                    if generation >= app.gate.latest_issued() {
                        app.error(format!("取得に失敗しました: {err:#}"), Some(Retry::Fetch));
                    }
                }
            },
            Err(mpsc::TryRecvError::Empty) => {
                if fetch.started_at.elapsed() > FETCH_WAIT_LIMIT {
                    app.error(
                        "レコード取得の完了待ちがタイムアウトしました。",
                        Some(Retry::Fetch),
                    );
                } else {
                    app.pending_fetches.push(fetch);
                }
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                app.error(
                    format!("取得タスクとの接続が切れました（#{}）。", fetch.generation),
                    Some(Retry::Fetch),
                );
            }
        }
    }
}

fn start_status_update(app: &mut App, status: Status, ids: Vec<String>) {
    if app.pending_status.is_some() {
        app.info("状態変更を実行中です。完了をお待ちください。");
        return;
    }
    if ids.is_empty() {
        app.info("状態を変更する所見が選択されていません（Space で選択）。");
        return;
    }
    let (tx, rx) = mpsc::channel();
    let source = Arc::clone(&app.source);
    thread::spawn(move || {
        let result = crate::source::update_statuses(source.as_ref(), &ids, status, |_, _| {});
        let _ = tx.send(result);
    });
    app.pending_status = Some(PendingStatusUpdate {
        status,
        rx,
        started_at: Instant::now(),
        started_wall: OffsetDateTime::now_utc(),
    });
}

fn poll_status_update(app: &mut App) {
    let Some(pending) = app.pending_status.take() else {
        return;
    };
    match pending.rx.try_recv() {
        Ok(result) => {
            if let Err(err) = crate::logs::write_status_update_log(
                &app.home_dir,
                pending.started_wall,
                OffsetDateTime::now_utc(),
                &app.source.describe(),
                pending.status,
                &result,
            ) {
                tracing::warn!(error = %format!("{err:#}"), "status update log not written");
            }
            if result.is_complete() {
                app.info(format!(
                    "{}件の状態を {} に変更しました。",
                    result.succeeded.len(),
                    pending.status
                ));
            } else {
                let first = result
                    .failed
                    .first()
                    .map(|f| format!("{}: {}", f.id, f.error))
                    .unwrap_or_default();
                let ids = result.failed.iter().map(|f| f.id.clone()).collect();
                app.error(
                    format!(
                        "状態変更: 成功 {}件 / 失敗 {}件（{first}）",
                        result.succeeded.len(),
                        result.failed.len()
                    ),
                    Some(Retry::StatusUpdate {
                        status: pending.status,
                        ids,
                    }),
                );
            }
            start_fetch(app);
        }
        Err(mpsc::TryRecvError::Empty) => {
            if pending.started_at.elapsed() > BULK_WAIT_LIMIT {
                app.error(
                    "状態変更の完了待ちがタイムアウトしました。一部が適用済みの可能性があります。",
                    Some(Retry::Fetch),
                );
            } else {
                app.pending_status = Some(pending);
            }
        }
        Err(mpsc::TryRecvError::Disconnected) => {
            app.error(
                "状態変更タスクとの接続が切れました。一部が適用済みの可能性があります。",
                Some(Retry::Fetch),
            );
        }
    }
}

fn retry(app: &mut App) {
    let Some(retry) = app.notice.as_ref().and_then(|n| n.retry.clone()) else {
        return;
    };
    app.notice = None;
    match retry {
        Retry::Fetch => start_fetch(app),
        Retry::StatusUpdate { status, ids } => start_status_update(app, status, ids),
    }
}

fn toggle_auto_refresh(app: &mut App, now: Instant) {
    if app.grid.refresh().is_running() {
        app.grid.stop_auto_refresh();
        app.info("自動更新を停止しました。");
        return;
    }
    match app.grid.start_auto_refresh(app.refresh_interval, now) {
        Ok(()) => app.info(format!(
            "自動更新を開始しました（{}秒ごと）。",
            app.refresh_interval.as_secs()
        )),
        Err(err) => app.error(format!("{err:#}"), None),
    }
}

fn export(app: &mut App, format: ExportFormat) {
    let res = app.grid.export(format).and_then(|output| {
        let path = DirDownloader::new(&app.export_dir).download(
            &output.content,
            &output.filename,
            output.mime(),
        )?;
        crate::logs::write_export_log(
            &app.home_dir,
            OffsetDateTime::now_utc(),
            &app.source.describe(),
            output.format,
            output.scope,
            output.count,
            &path,
        )?;
        Ok((output, path))
    });
    match res {
        Ok((output, path)) => {
            let scope = match output.scope {
                crate::export::ExportScope::Selected => "選択中",
                crate::export::ExportScope::Filtered => "絞り込み結果",
            };
            app.info(format!(
                "{scope} {}件を書き出しました: {}",
                output.count,
                crate::logs::mask_home(&path, &app.home_dir)
            ));
        }
        Err(err) => app.error(format!("エクスポートに失敗しました: {err:#}"), None),
    }
}

fn key_input(key: &KeyEvent) -> KeyInput {
    let k = match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        _ => Key::Other,
    };
    let mut input = KeyInput::new(k);
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        input = input.with_ctrl();
    }
    if key.modifiers.contains(KeyModifiers::SUPER) {
        input = input.with_meta();
    }
    input
}

fn open_status_picker(app: &mut App, targets: Vec<String>) {
    if targets.is_empty() {
        app.info("状態を変更する所見が選択されていません（Space で選択）。");
        return;
    }
    app.status_targets = targets;
    app.status_return_to = app.screen;
    app.status_state.select(Some(0));
    app.screen = Screen::StatusPicker;
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    if app.search_mode {
        handle_search_key(app, key);
        return Ok(false);
    }

    if app.grid.help_open() {
        match key.code {
            // Reset: selection, focus and help together.
            KeyCode::Esc => {
                app.grid.handle_key(&key_input(&key));
            }
            KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Enter => {
                app.grid.dispatch(GridAction::CloseHelp);
            }
            _ => {}
        }
        return Ok(false);
    }

    match app.screen {
        Screen::Grid => handle_grid_key(app, key),
        Screen::Detail => {
            match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc | KeyCode::Char('b') | KeyCode::Backspace => {
                    app.screen = Screen::Grid;
                    app.detail_scroll = 0;
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    app.detail_scroll = app.detail_scroll.saturating_add(1);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    app.detail_scroll = app.detail_scroll.saturating_sub(1);
                }
                KeyCode::Char('S') => {
                    let targets = app
                        .detail_id
                        .iter()
                        .filter(|id| app.grid.record(id).is_some())
                        .cloned()
                        .collect();
                    open_status_picker(app, targets);
                }
                KeyCode::Char('?') => app.grid.dispatch(GridAction::OpenHelp),
                _ => {}
            }
            Ok(false)
        }
        Screen::Facets => {
            let values = FacetValue::all();
            match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc | KeyCode::Char('f') | KeyCode::Char('b') => {
                    app.screen = Screen::Grid;
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    App::move_list_selection(&mut app.facet_state, values.len(), 1);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    App::move_list_selection(&mut app.facet_state, values.len(), -1);
                }
                KeyCode::Char(' ') | KeyCode::Enter => {
                    if let Some(value) = app.facet_state.selected().and_then(|i| values.get(i)) {
                        app.grid.dispatch(GridAction::ToggleFacet(*value));
                    }
                }
                KeyCode::Char('c') => app.grid.dispatch(GridAction::ClearFilters),
                _ => {}
            }
            Ok(false)
        }
        Screen::StatusPicker => {
            match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc | KeyCode::Char('b') => app.screen = app.status_return_to,
                KeyCode::Down | KeyCode::Char('j') => {
                    App::move_list_selection(&mut app.status_state, Status::ALL.len(), 1);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    App::move_list_selection(&mut app.status_state, Status::ALL.len(), -1);
                }
                KeyCode::Enter => {
                    if let Some(status) = app
                        .status_state
                        .selected()
                        .and_then(|i| Status::ALL.get(i))
                        .copied()
                    {
                        let ids = std::mem::take(&mut app.status_targets);
                        app.screen = app.status_return_to;
                        start_status_update(app, status, ids);
                    }
                }
                _ => {}
            }
            Ok(false)
        }
    }
}

fn handle_search_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            let outcome = app.grid.handle_key(&key_input(&key).in_text_input());
            if outcome.effect == Some(KeyEffect::BlurInput) {
                app.search_mode = false;
            }
        }
        KeyCode::Enter => app.search_mode = false,
        KeyCode::Backspace => {
            app.search_input.pop();
            app.grid
                .dispatch(GridAction::SetSearch(app.search_input.clone()));
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.search_input.clear();
            app.grid.dispatch(GridAction::SetSearch(String::new()));
        }
        KeyCode::Char(c) => {
            let outcome = app.grid.handle_key(&key_input(&key).in_text_input());
            if !outcome.handled {
                app.search_input.push(c);
                app.grid
                    .dispatch(GridAction::SetSearch(app.search_input.clone()));
            }
        }
        _ => {}
    }
}

fn handle_grid_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if let KeyCode::Char(c) = key.code {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            match c {
                'q' => return Ok(true),
                'R' => {
                    retry(app);
                    return Ok(false);
                }
                'C' => {
                    app.notice = None;
                    return Ok(false);
                }
                '[' => {
                    app.grid.dispatch(GridAction::PrevPage);
                    return Ok(false);
                }
                ']' => {
                    app.grid.dispatch(GridAction::NextPage);
                    return Ok(false);
                }
                's' => {
                    let next = app.grid.sort().field.next();
                    app.grid.dispatch(GridAction::SortBy(next));
                    return Ok(false);
                }
                'o' => {
                    let field = app.grid.sort().field;
                    app.grid.dispatch(GridAction::SortBy(field));
                    return Ok(false);
                }
                '+' => {
                    let size = app.grid.page_size().saturating_add(PAGE_SIZE_STEP);
                    app.grid.dispatch(GridAction::SetPageSize(size));
                    return Ok(false);
                }
                '-' => {
                    let size = app.grid.page_size().saturating_sub(PAGE_SIZE_STEP).max(PAGE_SIZE_STEP);
                    app.grid.dispatch(GridAction::SetPageSize(size));
                    return Ok(false);
                }
                '1'..='4' => {
                    let idx = (c as usize) - ('1' as usize);
                    if let Some(quick) = QuickFilter::ALL.get(idx) {
                        app.grid.dispatch(GridAction::ApplyQuickFilter(*quick));
                    }
                    return Ok(false);
                }
                '0' => {
                    app.search_input.clear();
                    app.grid.dispatch(GridAction::ClearFilters);
                    return Ok(false);
                }
                'a' => {
                    app.grid.dispatch(GridAction::SelectAllVisible);
                    return Ok(false);
                }
                'e' => {
                    export(app, ExportFormat::Csv);
                    return Ok(false);
                }
                'E' => {
                    export(app, ExportFormat::Json);
                    return Ok(false);
                }
                't' => {
                    toggle_auto_refresh(app, Instant::now());
                    return Ok(false);
                }
                'f' => {
                    if app.facet_state.selected().is_none() {
                        app.facet_state.select(Some(0));
                    }
                    app.screen = Screen::Facets;
                    return Ok(false);
                }
                'S' => {
                    let targets = app
                        .grid
                        .live_selected_records()
                        .iter()
                        .map(|r| r.id.clone())
                        .collect();
                    open_status_picker(app, targets);
                    return Ok(false);
                }
                _ => {}
            }
        }
    }

    let outcome = app.grid.handle_key(&key_input(&key));
    match outcome.effect {
        Some(KeyEffect::NavigateToDetail(id)) => {
            app.detail_id = Some(id);
            app.detail_scroll = 0;
            app.screen = Screen::Detail;
        }
        Some(KeyEffect::Refresh) => start_fetch(app),
        Some(KeyEffect::FocusSearch) => {
            app.search_input = app.grid.filter().search.clone();
            app.search_mode = true;
        }
        Some(KeyEffect::BlurInput) | None => {}
    }
    Ok(false)
}

fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(size);

    draw_header(f, chunks[0], app);
    draw_footer(f, chunks[2], app);

    match app.screen {
        Screen::Grid => draw_grid(f, chunks[1], app),
        Screen::Detail => draw_detail(f, chunks[1], app),
        Screen::Facets => {
            draw_grid(f, chunks[1], app);
            draw_facets(f, chunks[1], app);
        }
        Screen::StatusPicker => {
            draw_grid(f, chunks[1], app);
            draw_status_picker(f, chunks[1], app);
        }
    }

    if app.grid.help_open() {
        draw_help(f, chunks[1]);
    }
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let title = match app.screen {
        Screen::Grid => "triagegrid: 一覧",
        Screen::Detail => "triagegrid: 詳細",
        Screen::Facets => "triagegrid: 絞り込み",
        Screen::StatusPicker => "triagegrid: 状態変更",
    };
    let mut spans = vec![
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(
            truncate_chars(&app.source.describe(), 40),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
    ];
    if app.is_fetching() || app.pending_status.is_some() {
        const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];
        let frame = SPINNER[(app.tick % SPINNER.len() as u64) as usize];
        spans.push(Span::styled(
            format!("{frame} 更新中 "),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(interval) = app.grid.refresh().interval() {
        spans.push(Span::styled(
            format!("自動更新 {}s ", interval.as_secs()),
            Style::default().fg(Color::Green),
        ));
    }
    if let Some(at) = app.last_fetch_at {
        spans.push(Span::styled(
            format!(
                "最終取得 {:02}:{:02}:{:02} ",
                at.hour(),
                at.minute(),
                at.second()
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let w = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(w, area);
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, app: &App) {
    if app.search_mode {
        let line1 = Line::from(vec![
            Span::styled("検索: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                if app.search_input.is_empty() {
                    "（空）".to_string()
                } else {
                    truncate_chars(&app.search_input, 60)
                },
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        ]);
        let line2 = Line::from("Backspace 削除 | Ctrl-U クリア | Enter 確定 | Esc 入力終了 | Ctrl-C 強制終了");
        let w = Paragraph::new(Text::from(vec![line1, line2]))
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        f.render_widget(w, area);
        return;
    }

    let (line1, line2) = if app.grid.help_open() {
        ("Esc/? 閉じる", "")
    } else {
        match app.screen {
            Screen::Grid => {
                if app.notice.as_ref().is_some_and(|n| n.retry.is_some()) {
                    (
                        "R 再試行 | C 通知を閉じる | j/k 移動 | Space 選択 | Enter 詳細 | / 検索 | r 更新",
                        "q 終了 | Ctrl-C 強制終了 | ? ヘルプ",
                    )
                } else {
                    (
                        "j/k 移動 | Space 選択 | x 展開 | Enter 詳細 | / 検索 | f 絞り込み | 1-4 クイック | 0 解除 | [ ] ページ | s/o 並び順",
                        "a 全選択 | S 状態変更 | e/E CSV/JSON出力 | r 更新 | t 自動更新 | q 終了 | ? ヘルプ",
                    )
                }
            }
            Screen::Detail => (
                "↑↓/j/k スクロール | S 状態変更 | b/Esc 戻る",
                "q 終了 | Ctrl-C 強制終了 | ? ヘルプ",
            ),
            Screen::Facets => (
                "↑↓/j/k 選択 | Space/Enter 切替 | c すべて解除 | f/Esc 閉じる",
                "q 終了 | Ctrl-C 強制終了",
            ),
            Screen::StatusPicker => (
                "↑↓/j/k 選択 | Enter 実行 | Esc キャンセル",
                "q 終了 | Ctrl-C 強制終了",
            ),
        }
    };
    let w = Paragraph::new(Text::from(vec![Line::from(line1), Line::from(line2)]))
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    f.render_widget(w, area);
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    let mut s = String::new();
    for (i, ch) in input.chars().enumerate() {
        if i >= max_chars {
            s.push('…');
            break;
        }
        s.push(ch);
    }
    s
}

fn filter_summary(app: &App) -> String {
    let filter = app.grid.filter();
    let mut parts = Vec::new();
    if !filter.search.trim().is_empty() {
        parts.push(format!("検索「{}」", truncate_chars(filter.search.trim(), 30)));
    }
    if let Some(quick) = filter.quick {
        parts.push(format!("クイック: {}", quick.label()));
    } else {
        if !filter.facets.severity.is_empty() {
            let v: Vec<&str> = filter.facets.severity.iter().map(|s| s.as_str()).collect();
            parts.push(format!("深刻度: {}", v.join(",")));
        }
        if !filter.facets.status.is_empty() {
            let v: Vec<&str> = filter.facets.status.iter().map(|s| s.as_str()).collect();
            parts.push(format!("状態: {}", v.join(",")));
        }
    }
    if parts.is_empty() {
        "フィルタなし".to_string()
    } else {
        parts.join(" / ")
    }
}

fn draw_grid(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let notice_h = if app.notice.is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(notice_h),
            Constraint::Min(1),
        ])
        .split(area);

    let summary = Paragraph::new(Line::from(vec![
        Span::styled(filter_summary(app), Style::default().fg(Color::Yellow)),
        Span::styled(
            format!("  選択 {}件", app.grid.live_selected_records().len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]));
    f.render_widget(summary, chunks[0]);

    if let Some(notice) = &app.notice {
        let (title, style) = match notice.kind {
            NoticeKind::Info => ("お知らせ", Style::default().fg(Color::Green)),
            NoticeKind::Error => ("エラー", Style::default().fg(Color::Red)),
        };
        let w = Paragraph::new(notice.message.clone())
            .style(style)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        f.render_widget(w, chunks[1]);
    }

    let rows = app.grid.page_rows();
    let items: Vec<ListItem> = if rows.is_empty() {
        let msg = if app.grid.records().is_empty() {
            if app.is_fetching() {
                "取得中..."
            } else {
                "所見がありません。"
            }
        } else {
            "一致する所見がありません。'0' でフィルタを解除できます。"
        };
        vec![ListItem::new(Line::from(msg))]
    } else {
        rows.iter()
            .map(|r| record_item(r, app.grid.is_selected(&r.id), app.grid.is_expanded(&r.id), app.color))
            .collect()
    };

    let sort = app.grid.sort();
    let arrow = match sort.order {
        SortOrder::Asc => "↑",
        SortOrder::Desc => "↓",
    };
    let title = format!(
        "所見（{shown}/{total}）ページ {page}/{pages}・{size}件/頁・並び順 {field}{arrow}",
        shown = app.grid.filtered_count(),
        total = app.grid.records().len(),
        page = app.grid.page(),
        pages = app.grid.total_pages(),
        size = app.grid.page_size(),
        field = sort.field,
    );
    app.grid_state.select(app.grid.focus());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, chunks[2], &mut app.grid_state);
}

fn record_item(record: &Record, selected: bool, expanded: bool, color: bool) -> ListItem<'static> {
    let mark = if selected { "[x]" } else { "[ ]" };
    let mut lines = vec![Line::from(vec![
        Span::raw(format!("{mark} ")),
        Span::styled(
            format!("{:<8}", record.severity.as_str()),
            severity_style(record.severity, color),
        ),
        Span::raw(" "),
        Span::styled(
            format!("{:<14}", record.status.as_str()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            truncate_chars(&record.id, 16),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(truncate_chars(record.display_title(), 80)),
    ])];
    if expanded {
        if let Some(pkg) = &record.package_name {
            lines.push(Line::from(format!("      パッケージ: {pkg}")));
        }
        if let Some(cve) = &record.cve_id {
            lines.push(Line::from(format!("      CVE: {cve}")));
        }
        for (k, v) in record.extra.iter().take(4) {
            lines.push(Line::from(Span::styled(
                format!("      {k}: {}", truncate_chars(&crate::ui::extra_value(v), 60)),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    ListItem::new(Text::from(lines))
}

fn severity_style(severity: Severity, enabled: bool) -> Style {
    if !enabled {
        return Style::default();
    }
    match severity {
        Severity::Critical => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
        Severity::High => Style::default().fg(Color::Red),
        Severity::Medium => Style::default().fg(Color::Yellow),
        Severity::Low => Style::default().fg(Color::Green),
        Severity::Unknown => Style::default().fg(Color::DarkGray),
    }
}

fn draw_detail(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let record = app.detail_id.as_deref().and_then(|id| app.grid.record(id));
    let text = match record {
        Some(record) => {
            let mut buf = Vec::new();
            crate::ui::write_record(&mut buf, record, false);
            Text::from(String::from_utf8_lossy(&buf).into_owned())
        }
        None => Text::from("この所見は最新の取得結果に含まれていません。"),
    };
    let title = app.detail_id.clone().unwrap_or_else(|| "詳細".to_string());
    let w = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));
    f.render_widget(w, area);
}

fn draw_facets(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let filter = app.grid.filter();
    let items: Vec<ListItem> = FacetValue::all()
        .into_iter()
        .map(|value| {
            let on = filter.facets.contains(value);
            let label = match value.facet() {
                crate::grid::Facet::Severity => "深刻度",
                crate::grid::Facet::Status => "状態",
            };
            ListItem::new(Line::from(format!(
                "{} {label}: {value}",
                if on { "[x]" } else { "[ ]" }
            )))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("絞り込み"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let popup = centered_rect(50, 70, area);
    f.render_widget(Clear, popup);
    f.render_stateful_widget(list, popup, &mut app.facet_state);
}

fn draw_status_picker(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = Status::ALL
        .iter()
        .map(|s| ListItem::new(Line::from(s.as_str())))
        .collect();
    let title = format!("状態変更（{}件）", app.status_targets.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let popup = centered_rect(40, 50, area);
    f.render_widget(Clear, popup);
    f.render_stateful_widget(list, popup, &mut app.status_state);
}

fn draw_help(f: &mut ratatui::Frame, area: Rect) {
    let text = Text::from(vec![
        Line::from(Span::styled(
            "triagegrid UI",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("一覧:"),
        Line::from("  j/k ↑↓ : フォーカス移動（ページ内）"),
        Line::from("  Enter  : 詳細を開く"),
        Line::from("  Space  : 選択の切替   x: 行の展開   a: 表示中をすべて選択/解除"),
        Line::from("  Esc    : 選択とフォーカスを解除"),
        Line::from("  /      : 検索（入力中は j/k も文字として扱います）"),
        Line::from("  f      : 深刻度/状態で絞り込み   0: フィルタ解除"),
        Line::from("  1-4    : クイックフィルタ（Critical / High以上 / OPEN / 未解決）。同じ番号で解除"),
        Line::from("  s / o  : 並び替え項目の切替 / 昇順・降順の切替"),
        Line::from("  [ / ]  : 前/次のページ   + / -: 1ページの件数"),
        Line::from("  r      : 再取得   t: 自動更新の開始/停止"),
        Line::from("  S      : 選択中の所見の状態を変更"),
        Line::from("  e / E  : CSV / JSON で書き出し（選択がなければ絞り込み結果）"),
        Line::from("  R / C  : 通知の再試行 / 通知を閉じる"),
        Line::from(""),
        Line::from("  q: 終了   Ctrl-C: 強制終了   ?: ヘルプ"),
    ]);

    let popup = centered_rect(70, 70, area);
    f.render_widget(Clear, popup);
    let w = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("ヘルプ"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
