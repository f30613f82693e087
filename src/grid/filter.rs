use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::{Record, Severity, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Severity,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetValue {
    Severity(Severity),
    Status(Status),
}

impl FacetValue {
    pub const fn facet(self) -> Facet {
        match self {
            FacetValue::Severity(_) => Facet::Severity,
            FacetValue::Status(_) => Facet::Status,
        }
    }

    /// Every selectable value, severity first.
    pub fn all() -> Vec<FacetValue> {
        Severity::ALL
            .into_iter()
            .map(FacetValue::Severity)
            .chain(Status::ALL.into_iter().map(FacetValue::Status))
            .collect()
    }
}

impl fmt::Display for FacetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetValue::Severity(s) => write!(f, "severity={s}"),
            FacetValue::Status(s) => write!(f, "status={s}"),
        }
    }
}

/// Multi-value facet constraints. An empty set constrains nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub severity: BTreeSet<Severity>,
    pub status: BTreeSet<Status>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        self.severity.is_empty() && self.status.is_empty()
    }

    pub fn contains(&self, value: FacetValue) -> bool {
        match value {
            FacetValue::Severity(s) => self.severity.contains(&s),
            FacetValue::Status(s) => self.status.contains(&s),
        }
    }

    pub fn clear_facet(&mut self, facet: Facet) {
        match facet {
            Facet::Severity => self.severity.clear(),
            Facet::Status => self.status.clear(),
        }
    }

    fn insert(&mut self, value: FacetValue) {
        match value {
            FacetValue::Severity(s) => {
                self.severity.insert(s);
            }
            FacetValue::Status(s) => {
                self.status.insert(s);
            }
        }
    }

    fn toggle(&mut self, value: FacetValue) {
        match value {
            FacetValue::Severity(s) => {
                if !self.severity.remove(&s) {
                    self.severity.insert(s);
                }
            }
            FacetValue::Status(s) => {
                if !self.status.remove(&s) {
                    self.status.insert(s);
                }
            }
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        (self.severity.is_empty() || self.severity.contains(&record.severity))
            && (self.status.is_empty() || self.status.contains(&record.status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuickFilter {
    Critical,
    HighPlus,
    Open,
    Unresolved,
}

impl QuickFilter {
    pub const ALL: [QuickFilter; 4] = [
        QuickFilter::Critical,
        QuickFilter::HighPlus,
        QuickFilter::Open,
        QuickFilter::Unresolved,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            QuickFilter::Critical => "critical",
            QuickFilter::HighPlus => "high-plus",
            QuickFilter::Open => "open",
            QuickFilter::Unresolved => "unresolved",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            QuickFilter::Critical => "Critical のみ",
            QuickFilter::HighPlus => "High 以上",
            QuickFilter::Open => "未対応（OPEN）",
            QuickFilter::Unresolved => "未解決（OPEN/IN_PROGRESS）",
        }
    }

    pub fn facets(self) -> Facets {
        let mut facets = Facets::default();
        match self {
            QuickFilter::Critical => {
                facets.severity.insert(Severity::Critical);
            }
            QuickFilter::HighPlus => {
                facets.severity.extend([Severity::Critical, Severity::High]);
            }
            QuickFilter::Open => {
                facets.status.insert(Status::Open);
            }
            QuickFilter::Unresolved => {
                facets.status.extend([Status::Open, Status::InProgress]);
            }
        }
        facets
    }
}

impl fmt::Display for QuickFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for QuickFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        QuickFilter::ALL
            .into_iter()
            .find(|q| q.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "クイックフィルタが不正です: {s}（critical|high-plus|open|unresolved を指定してください）"
                )
            })
    }
}

/// Search text, facet constraints and the active quick filter.
///
/// Facet edits and quick filters are mutually exclusive: touching a facet
/// drops the quick filter, and a quick filter replaces the facets wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub search: String,
    pub facets: Facets,
    pub quick: Option<QuickFilter>,
}

impl FilterState {
    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn toggle_facet_value(&mut self, value: FacetValue) {
        self.facets.toggle(value);
        self.quick = None;
    }

    /// Replaces one facet's value set. Values for other facets are ignored.
    pub fn set_facet(&mut self, facet: Facet, values: &[FacetValue]) {
        self.facets.clear_facet(facet);
        for value in values.iter().filter(|v| v.facet() == facet) {
            self.facets.insert(*value);
        }
        self.quick = None;
    }

    /// Applying the active preset again turns it off and clears the facets.
    pub fn apply_quick_filter(&mut self, quick: QuickFilter) {
        if self.quick == Some(quick) {
            self.quick = None;
            self.facets = Facets::default();
        } else {
            self.quick = Some(quick);
            self.facets = quick.facets();
        }
    }

    pub fn clear(&mut self) {
        *self = FilterState::default();
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty() || !self.facets.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        let needle = normalize_query(&self.search);
        matches_search(record, &needle) && self.facets.matches(record)
    }
}

fn normalize_query(search: &str) -> String {
    search.trim().to_lowercase()
}

fn matches_search(record: &Record, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    record
        .search_fields()
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Indices of `records` passing `filter`, in input order.
pub fn filtered_indices(records: &[Record], filter: &FilterState) -> Vec<usize> {
    let needle = normalize_query(&filter.search);
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| matches_search(r, &needle) && filter.facets.matches(r))
        .map(|(i, _)| i)
        .collect()
}

pub fn apply<'a>(records: &'a [Record], filter: &FilterState) -> Vec<&'a Record> {
    filtered_indices(records, filter)
        .into_iter()
        .map(|i| &records[i])
        .collect()
}
