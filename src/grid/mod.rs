//! Headless triage grid: filter → sort → paginate over an in-memory
//! record snapshot, with id-keyed selection/expansion side maps, keyboard
//! navigation, auto-refresh scheduling and export.
//!
//! All mutation goes through [`Grid::dispatch`], which is where the
//! cross-cutting rules live (filter edits reset the page, page moves drop
//! focus, new snapshots re-clamp everything).

pub mod filter;
pub mod keys;
pub mod page;
pub mod refresh;
pub mod selection;
pub mod sort;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::core::{Record, Status};
use crate::export::{ExportFormat, ExportOutput, ExportScope};
use crate::source::{BatchResult, RecordSource};

pub use filter::{Facet, FacetValue, Facets, FilterState, QuickFilter};
pub use keys::{Key, KeyCommand, KeyEffect, KeyInput, KeyOutcome, KeyTarget, KeyboardController};
pub use page::{DEFAULT_PAGE_SIZE, Pagination};
pub use refresh::{RefreshScheduler, RefreshState};
pub use selection::{Expansion, Selection};
pub use sort::{SortField, SortOrder, SortState};

#[derive(Debug, Clone, PartialEq)]
pub enum GridAction {
    ReplaceRecords(Vec<Record>),
    SetSearch(String),
    ToggleFacet(FacetValue),
    SetFacet(Facet, Vec<FacetValue>),
    ClearFilters,
    ApplyQuickFilter(QuickFilter),
    SortBy(SortField),
    SetSort(SortState),
    SetPage(usize),
    NextPage,
    PrevPage,
    SetPageSize(usize),
    ToggleSelect(String),
    SelectAllVisible,
    ClearSelection,
    ToggleExpand(String),
    SetFocus(Option<usize>),
    OpenHelp,
    CloseHelp,
}

#[derive(Debug, Clone)]
pub struct Grid {
    records: Vec<Record>,
    index: HashMap<String, usize>,
    generation: u64,
    filter: FilterState,
    sort: SortState,
    pagination: Pagination,
    selection: Selection,
    expansion: Expansion,
    focus: Option<usize>,
    help_open: bool,
    keyboard: KeyboardController,
    refresh: RefreshScheduler,
    view: Vec<usize>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Grid {
    pub fn new(page_size: usize) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            generation: 0,
            filter: FilterState::default(),
            sort: SortState::default(),
            pagination: Pagination::new(page_size),
            selection: Selection::default(),
            expansion: Expansion::default(),
            focus: None,
            help_open: false,
            keyboard: KeyboardController::default(),
            refresh: RefreshScheduler::default(),
            view: Vec::new(),
        }
    }

    pub fn with_records(records: Vec<Record>, page_size: usize) -> Self {
        let mut grid = Self::new(page_size);
        grid.dispatch(GridAction::ReplaceRecords(records));
        grid
    }

    pub fn dispatch(&mut self, action: GridAction) {
        match action {
            GridAction::ReplaceRecords(records) => self.replace_records(records),
            GridAction::SetSearch(search) => {
                self.filter.set_search(search);
                self.filter_changed();
            }
            GridAction::ToggleFacet(value) => {
                self.filter.toggle_facet_value(value);
                self.filter_changed();
            }
            GridAction::SetFacet(facet, values) => {
                self.filter.set_facet(facet, &values);
                self.filter_changed();
            }
            GridAction::ClearFilters => {
                self.filter.clear();
                self.filter_changed();
            }
            GridAction::ApplyQuickFilter(quick) => {
                self.filter.apply_quick_filter(quick);
                self.filter_changed();
            }
            GridAction::SortBy(field) => {
                self.sort.choose(field);
                self.order_changed();
            }
            GridAction::SetSort(sort) => {
                self.sort = sort;
                self.order_changed();
            }
            GridAction::SetPage(page) => self.move_to_page(page),
            GridAction::NextPage => self.move_to_page(self.pagination.page().saturating_add(1)),
            GridAction::PrevPage => self.move_to_page(self.pagination.page().saturating_sub(1)),
            GridAction::SetPageSize(size) => {
                self.pagination.set_page_size(size, self.view.len());
                self.focus = None;
            }
            GridAction::ToggleSelect(id) => self.selection.toggle(&id),
            GridAction::SelectAllVisible => {
                let visible: Vec<String> = self.page_rows().iter().map(|r| r.id.clone()).collect();
                self.selection
                    .select_all_visible(visible.iter().map(String::as_str));
            }
            GridAction::ClearSelection => self.selection.clear(),
            GridAction::ToggleExpand(id) => self.expansion.toggle(&id),
            GridAction::SetFocus(focus) => {
                let len = self.page_len();
                self.focus = focus.filter(|i| *i < len);
            }
            GridAction::OpenHelp => self.help_open = true,
            GridAction::CloseHelp => self.help_open = false,
        }
    }

    fn replace_records(&mut self, records: Vec<Record>) {
        let mut index = HashMap::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.id) {
                tracing::warn!(id = %record.id, "duplicate record id dropped");
                continue;
            }
            index.insert(record.id.clone(), kept.len());
            kept.push(record);
        }
        self.records = kept;
        self.index = index;
        self.generation = self.generation.wrapping_add(1);
        self.rebuild_view();
        self.pagination.clamp(self.view.len());
        self.clamp_focus();
    }

    fn filter_changed(&mut self) {
        self.rebuild_view();
        self.pagination.reset();
        self.focus = None;
    }

    fn order_changed(&mut self) {
        self.rebuild_view();
        self.pagination.clamp(self.view.len());
        self.clamp_focus();
    }

    fn move_to_page(&mut self, page: usize) {
        let before = self.pagination.page();
        self.pagination.set_page(page, self.view.len());
        if self.pagination.page() != before {
            self.focus = None;
        }
    }

    fn rebuild_view(&mut self) {
        let mut view = filter::filtered_indices(&self.records, &self.filter);
        sort::sort_indices(&self.records, &mut view, &self.sort);
        self.view = view;
    }

    fn clamp_focus(&mut self) {
        let len = self.page_len();
        self.focus = match self.focus {
            Some(_) if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => None,
        };
    }

    fn page_indices(&self) -> &[usize] {
        self.pagination.slice(&self.view)
    }

    fn page_len(&self) -> usize {
        self.page_indices().len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|i| &self.records[*i])
    }

    /// Bumped on every snapshot replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn filtered(&self) -> Vec<&Record> {
        self.view.iter().map(|i| &self.records[*i]).collect()
    }

    pub fn filtered_count(&self) -> usize {
        self.view.len()
    }

    pub fn page_rows(&self) -> Vec<&Record> {
        self.page_indices().iter().map(|i| &self.records[*i]).collect()
    }

    pub fn total_pages(&self) -> usize {
        self.pagination.total_pages(self.view.len())
    }

    pub fn page(&self) -> usize {
        self.pagination.page()
    }

    pub fn page_size(&self) -> usize {
        self.pagination.page_size()
    }

    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn focused_record(&self) -> Option<&Record> {
        let idx = *self.page_indices().get(self.focus?)?;
        self.records.get(idx)
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn expansion(&self) -> &Expansion {
        &self.expansion
    }

    /// Selected and present in the current snapshot.
    pub fn is_selected(&self, id: &str) -> bool {
        self.index.contains_key(id) && self.selection.is_selected(id)
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.index.contains_key(id) && self.expansion.is_expanded(id)
    }

    pub fn help_open(&self) -> bool {
        self.help_open
    }

    /// Selected records present in the snapshot, in the current sort order,
    /// regardless of whether the filter currently shows them.
    pub fn live_selected_records(&self) -> Vec<&Record> {
        let mut indices: Vec<usize> = (0..self.records.len())
            .filter(|i| self.selection.is_selected(&self.records[*i].id))
            .collect();
        sort::sort_indices(&self.records, &mut indices, &self.sort);
        indices.into_iter().map(|i| &self.records[i]).collect()
    }

    pub fn export_records(&self) -> (ExportScope, Vec<&Record>) {
        let selected = self.live_selected_records();
        if selected.is_empty() {
            (ExportScope::Filtered, self.filtered())
        } else {
            (ExportScope::Selected, selected)
        }
    }

    pub fn export(&self, format: ExportFormat) -> Result<ExportOutput> {
        let (scope, records) = self.export_records();
        ExportOutput::build(format, scope, &records)
    }

    /// `None` when nothing live is selected.
    pub fn bulk_update_status(
        &self,
        source: &dyn RecordSource,
        status: Status,
    ) -> Option<BatchResult> {
        self.bulk_update_status_with(source, status, |_, _| {})
    }

    pub fn bulk_update_status_with<F>(
        &self,
        source: &dyn RecordSource,
        status: Status,
        on_item: F,
    ) -> Option<BatchResult>
    where
        F: FnMut(&str, &Result<()>),
    {
        let ids: Vec<String> = self
            .live_selected_records()
            .into_iter()
            .map(|r| r.id.clone())
            .collect();
        if ids.is_empty() {
            return None;
        }
        Some(crate::source::update_statuses(source, &ids, status, on_item))
    }

    pub fn attach_keyboard(&mut self) {
        self.keyboard.attach();
    }

    pub fn detach_keyboard(&mut self) {
        self.keyboard.detach();
    }

    pub fn keyboard_attached(&self) -> bool {
        self.keyboard.is_attached()
    }

    pub fn handle_key(&mut self, input: &KeyInput) -> KeyOutcome {
        let Some(command) = self.keyboard.command_for(input) else {
            return KeyOutcome::ignored();
        };
        let consumed_without_action = KeyOutcome {
            handled: false,
            prevent_default: command.prevents_default(),
            effect: None,
        };

        match command {
            KeyCommand::FocusNext | KeyCommand::FocusPrev => {
                let len = self.page_len();
                if len == 0 {
                    return consumed_without_action;
                }
                self.focus = Some(match (command, self.focus) {
                    (_, None) => 0,
                    (KeyCommand::FocusNext, Some(i)) => (i + 1).min(len - 1),
                    (_, Some(i)) => i.saturating_sub(1),
                });
                KeyOutcome::handled(command)
            }
            KeyCommand::OpenDetail => match self.focused_record() {
                Some(record) => KeyOutcome::handled(command)
                    .with_effect(KeyEffect::NavigateToDetail(record.id.clone())),
                None => consumed_without_action,
            },
            KeyCommand::ToggleSelect => match self.focused_record().map(|r| r.id.clone()) {
                Some(id) => {
                    self.selection.toggle(&id);
                    KeyOutcome::handled(command)
                }
                None => consumed_without_action,
            },
            KeyCommand::ToggleExpand => match self.focused_record().map(|r| r.id.clone()) {
                Some(id) => {
                    self.expansion.toggle(&id);
                    KeyOutcome::handled(command)
                }
                None => consumed_without_action,
            },
            KeyCommand::Refresh => KeyOutcome::handled(command).with_effect(KeyEffect::Refresh),
            KeyCommand::FocusSearch => {
                KeyOutcome::handled(command).with_effect(KeyEffect::FocusSearch)
            }
            KeyCommand::Reset => {
                self.selection.clear();
                self.focus = None;
                self.help_open = false;
                KeyOutcome::handled(command)
            }
            KeyCommand::OpenHelp => {
                self.help_open = true;
                KeyOutcome::handled(command)
            }
            KeyCommand::BlurInput => {
                KeyOutcome::handled(command).with_effect(KeyEffect::BlurInput)
            }
        }
    }

    pub fn refresh(&self) -> &RefreshScheduler {
        &self.refresh
    }

    pub fn start_auto_refresh(&mut self, interval: Duration, now: Instant) -> Result<()> {
        self.refresh.start(interval, now)
    }

    pub fn set_refresh_interval(&mut self, interval: Duration, now: Instant) -> Result<()> {
        self.refresh.set_interval(interval, now)
    }

    pub fn stop_auto_refresh(&mut self) {
        self.refresh.stop();
    }

    /// True when the host should issue a fetch now.
    pub fn poll_refresh(&mut self, now: Instant) -> bool {
        self.refresh.poll(now)
    }

    /// Tear-down for a host leaving the grid: no timer or key hook survives.
    pub fn dispose(&mut self) {
        self.refresh.stop();
        self.keyboard.detach();
        self.help_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    fn numbered(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| {
                let severity = if i <= 10 { Severity::Critical } else { Severity::Low };
                Record::new(format!("r{i:03}"), severity, Status::Open)
            })
            .collect()
    }

    fn ids(records: &[&Record]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    fn attached(records: Vec<Record>, page_size: usize) -> Grid {
        let mut grid = Grid::with_records(records, page_size);
        grid.attach_keyboard();
        grid
    }

    #[test]
    fn filter_shrinking_results_clamps_page_to_one() {
        let mut grid = Grid::with_records(numbered(55), 25);
        grid.dispatch(GridAction::SetPage(3));
        assert_eq!(grid.page(), 3);
        assert_eq!(grid.page_rows().len(), 5);

        grid.dispatch(GridAction::ToggleFacet(FacetValue::Severity(Severity::Critical)));
        assert_eq!(grid.filtered_count(), 10);
        assert_eq!(grid.page(), 1);
        assert_eq!(grid.total_pages(), 1);
    }

    #[test]
    fn refetch_that_shrinks_collection_clamps_page() {
        let mut grid = Grid::with_records(numbered(55), 25);
        grid.dispatch(GridAction::SetPage(3));
        grid.dispatch(GridAction::ReplaceRecords(numbered(30)));
        assert_eq!(grid.page(), 2);
        assert_eq!(grid.page_rows().len(), 5);
    }

    #[test]
    fn page_size_change_reclamps_without_reset() {
        let mut grid = Grid::with_records(numbered(100), 10);
        grid.dispatch(GridAction::SetPage(4));
        grid.dispatch(GridAction::SetPageSize(20));
        assert_eq!(grid.page(), 4);
        grid.dispatch(GridAction::SetPageSize(50));
        assert_eq!(grid.page(), 2);
    }

    #[test]
    fn next_and_prev_page_stay_in_bounds() {
        let mut grid = Grid::with_records(numbered(30), 25);
        grid.dispatch(GridAction::PrevPage);
        assert_eq!(grid.page(), 1);
        grid.dispatch(GridAction::NextPage);
        grid.dispatch(GridAction::NextPage);
        assert_eq!(grid.page(), 2);
    }

    #[test]
    fn selection_survives_filter_sort_and_page_changes() {
        let mut grid = Grid::with_records(numbered(55), 25);
        grid.dispatch(GridAction::ToggleSelect("r020".to_string()));
        grid.dispatch(GridAction::ApplyQuickFilter(QuickFilter::Critical));
        grid.dispatch(GridAction::SortBy(SortField::Id));
        grid.dispatch(GridAction::SetPage(2));
        grid.dispatch(GridAction::SetSearch("r0".to_string()));
        assert!(grid.is_selected("r020"));
    }

    #[test]
    fn selection_of_removed_record_is_inert_until_it_returns() {
        let mut grid = Grid::with_records(numbered(5), 25);
        grid.dispatch(GridAction::ToggleSelect("r003".to_string()));

        let without: Vec<Record> = numbered(5).into_iter().filter(|r| r.id != "r003").collect();
        grid.dispatch(GridAction::ReplaceRecords(without));
        assert!(!grid.is_selected("r003"));
        assert!(grid.selection().is_selected("r003"));
        assert!(grid.live_selected_records().is_empty());

        grid.dispatch(GridAction::ReplaceRecords(numbered(5)));
        assert!(grid.is_selected("r003"));
    }

    #[test]
    fn select_all_visible_uses_current_page_only() {
        let mut grid = Grid::with_records(numbered(30), 25);
        grid.dispatch(GridAction::SetPage(2));
        grid.dispatch(GridAction::SelectAllVisible);
        assert_eq!(grid.selection().count(), 5);
        assert!(grid.is_selected("r030"));
        assert!(!grid.is_selected("r001"));

        grid.dispatch(GridAction::SelectAllVisible);
        assert!(grid.selection().is_empty());
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let records = vec![
            Record::new("a", Severity::High, Status::Open).with_title("first"),
            Record::new("a", Severity::Low, Status::Open).with_title("second"),
        ];
        let grid = Grid::with_records(records, 25);
        assert_eq!(grid.records().len(), 1);
        assert_eq!(grid.record("a").map(|r| r.title.as_str()), Some("first"));
    }

    #[test]
    fn j_k_move_focus_with_clamping() {
        let mut grid = attached(numbered(3), 25);
        assert_eq!(grid.focus(), None);
        grid.handle_key(&KeyInput::char('k'));
        assert_eq!(grid.focus(), Some(0));
        for _ in 0..5 {
            grid.handle_key(&KeyInput::char('j'));
        }
        assert_eq!(grid.focus(), Some(2));
        grid.handle_key(&KeyInput::new(Key::Up));
        assert_eq!(grid.focus(), Some(1));
    }

    #[test]
    fn j_in_text_input_does_not_move_focus() {
        let mut grid = attached(numbered(3), 25);
        let outcome = grid.handle_key(&KeyInput::char('j').in_text_input());
        assert!(!outcome.handled);
        assert_eq!(grid.focus(), None);
    }

    #[test]
    fn enter_navigates_only_with_focus() {
        let mut grid = attached(numbered(3), 25);
        let outcome = grid.handle_key(&KeyInput::new(Key::Enter));
        assert_eq!(outcome.effect, None);

        grid.handle_key(&KeyInput::char('j'));
        grid.handle_key(&KeyInput::char('j'));
        let outcome = grid.handle_key(&KeyInput::new(Key::Enter));
        assert_eq!(
            outcome.effect,
            Some(KeyEffect::NavigateToDetail("r002".to_string()))
        );
    }

    #[test]
    fn space_and_x_act_on_focused_row() {
        let mut grid = attached(numbered(3), 25);
        let outcome = grid.handle_key(&KeyInput::char(' '));
        assert!(outcome.prevent_default);
        assert!(grid.selection().is_empty());

        grid.handle_key(&KeyInput::char('j'));
        grid.handle_key(&KeyInput::char(' '));
        grid.handle_key(&KeyInput::char('x'));
        assert!(grid.is_selected("r001"));
        assert!(grid.is_expanded("r001"));
        assert_eq!(grid.page(), 1);
        assert_eq!(grid.filtered_count(), 3);
    }

    #[test]
    fn escape_clears_selection_focus_and_help() {
        let mut grid = attached(numbered(3), 25);
        grid.handle_key(&KeyInput::char('j'));
        grid.handle_key(&KeyInput::char(' '));
        grid.handle_key(&KeyInput::char('?'));
        assert!(grid.help_open());

        grid.handle_key(&KeyInput::new(Key::Escape));
        assert!(grid.selection().is_empty());
        assert_eq!(grid.focus(), None);
        assert!(!grid.help_open());
    }

    #[test]
    fn r_requests_refresh_unless_modified() {
        let mut grid = attached(numbered(1), 25);
        assert_eq!(
            grid.handle_key(&KeyInput::char('r')).effect,
            Some(KeyEffect::Refresh)
        );
        let outcome = grid.handle_key(&KeyInput::char('r').with_ctrl());
        assert!(!outcome.handled);
        assert_eq!(outcome.effect, None);
    }

    #[test]
    fn slash_focuses_search_and_escape_blurs_it() {
        let mut grid = attached(numbered(1), 25);
        let outcome = grid.handle_key(&KeyInput::char('/'));
        assert!(outcome.prevent_default);
        assert_eq!(outcome.effect, Some(KeyEffect::FocusSearch));

        grid.dispatch(GridAction::ToggleSelect("r001".to_string()));
        let outcome = grid.handle_key(&KeyInput::new(Key::Escape).in_text_input());
        assert_eq!(outcome.effect, Some(KeyEffect::BlurInput));
        assert!(grid.is_selected("r001"));
    }

    #[test]
    fn page_change_resets_focus() {
        let mut grid = attached(numbered(30), 25);
        grid.handle_key(&KeyInput::char('j'));
        assert_eq!(grid.focus(), Some(0));
        grid.dispatch(GridAction::NextPage);
        assert_eq!(grid.focus(), None);

        grid.handle_key(&KeyInput::char('j'));
        grid.dispatch(GridAction::SetPageSize(10));
        assert_eq!(grid.focus(), None);
    }

    #[test]
    fn refetch_clamps_focus_into_new_page() {
        let mut grid = attached(numbered(5), 25);
        for _ in 0..5 {
            grid.handle_key(&KeyInput::char('j'));
        }
        assert_eq!(grid.focus(), Some(4));
        grid.dispatch(GridAction::ReplaceRecords(numbered(2)));
        assert_eq!(grid.focus(), Some(1));
        grid.dispatch(GridAction::ReplaceRecords(vec![]));
        assert_eq!(grid.focus(), None);
    }

    #[test]
    fn detached_grid_ignores_keys() {
        let mut grid = Grid::with_records(numbered(3), 25);
        let outcome = grid.handle_key(&KeyInput::char('j'));
        assert_eq!(outcome, KeyOutcome::ignored());
        assert_eq!(grid.focus(), None);
    }

    #[test]
    fn dispose_stops_refresh_and_detaches() {
        let t0 = Instant::now();
        let mut grid = attached(numbered(1), 25);
        grid.start_auto_refresh(Duration::from_secs(30), t0)
            .expect("start");
        grid.dispose();
        assert_eq!(grid.refresh().armed_timers(), 0);
        assert!(!grid.keyboard_attached());
        assert!(!grid.poll_refresh(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn export_prefers_live_selection_in_sort_order() {
        let mut grid = Grid::with_records(numbered(12), 5);
        grid.dispatch(GridAction::SetSort(SortState::new(SortField::Id, SortOrder::Desc)));
        grid.dispatch(GridAction::ToggleSelect("r002".to_string()));
        grid.dispatch(GridAction::ToggleSelect("r011".to_string()));
        grid.dispatch(GridAction::ToggleSelect("gone".to_string()));

        let (scope, records) = grid.export_records();
        assert_eq!(scope, ExportScope::Selected);
        assert_eq!(ids(&records), vec!["r011", "r002"]);

        grid.dispatch(GridAction::ClearSelection);
        grid.dispatch(GridAction::ApplyQuickFilter(QuickFilter::Critical));
        let (scope, records) = grid.export_records();
        assert_eq!(scope, ExportScope::Filtered);
        assert_eq!(records.len(), 10);
    }

    struct RejectOdd;

    impl RecordSource for RejectOdd {
        fn describe(&self) -> String {
            "reject-odd".to_string()
        }

        fn fetch(&self) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        fn update_status(&self, id: &str, _status: Status) -> Result<()> {
            let n: u32 = id.trim_start_matches('r').parse()?;
            if n % 2 == 1 {
                anyhow::bail!("rejected {id}");
            }
            Ok(())
        }
    }

    #[test]
    fn bulk_update_needs_a_live_selection() {
        let mut grid = Grid::with_records(numbered(3), 25);
        assert_eq!(grid.bulk_update_status(&RejectOdd, Status::Resolved), None);
        grid.dispatch(GridAction::ToggleSelect("gone".to_string()));
        assert_eq!(grid.bulk_update_status(&RejectOdd, Status::Resolved), None);
    }

    #[test]
    fn bulk_update_reports_every_outcome_without_touching_records() {
        let mut grid = Grid::with_records(numbered(4), 25);
        for id in ["r001", "r002", "r003"] {
            grid.dispatch(GridAction::ToggleSelect(id.to_string()));
        }
        let mut seen = Vec::new();
        let result = grid
            .bulk_update_status_with(&RejectOdd, Status::Resolved, |id, _| {
                seen.push(id.to_string())
            })
            .expect("selection is live");
        assert_eq!(seen, ["r001", "r002", "r003"]);
        assert_eq!(result.succeeded, ["r002"]);
        let failed: Vec<&str> = result.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, ["r001", "r003"]);
        assert!(grid.records().iter().all(|r| r.status == Status::Open));
    }
}
