use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Severity,
    Id,
    Package,
    Status,
    Title,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Severity,
        SortField::Id,
        SortField::Package,
        SortField::Status,
        SortField::Title,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SortField::Severity => "severity",
            SortField::Id => "id",
            SortField::Package => "package",
            SortField::Status => "status",
            SortField::Title => "title",
        }
    }

    pub fn next(self) -> Self {
        let idx = SortField::ALL.iter().position(|f| *f == self).unwrap_or(0);
        SortField::ALL[(idx + 1) % SortField::ALL.len()]
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "severity" => Ok(SortField::Severity),
            "id" => Ok(SortField::Id),
            "package" | "package_name" => Ok(SortField::Package),
            "status" => Ok(SortField::Status),
            "title" => Ok(SortField::Title),
            _ => Err(format!(
                "ソート項目が不正です: {s}（severity|id|package|status|title を指定してください）"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortState {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortState {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Same field flips the order; a new field starts ascending.
    pub fn choose(&mut self, field: SortField) {
        if self.field == field {
            self.order = self.order.flipped();
        } else {
            self.field = field;
            self.order = SortOrder::Asc;
        }
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = compare_field(self.field, a, b);
        match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

fn compare_field(field: SortField, a: &Record, b: &Record) -> Ordering {
    match field {
        SortField::Severity => a.severity.rank().cmp(&b.severity.rank()),
        SortField::Id => compare_text(&a.id, &b.id),
        SortField::Package => compare_text(
            a.package_name.as_deref().unwrap_or(""),
            b.package_name.as_deref().unwrap_or(""),
        ),
        SortField::Status => compare_text(a.status.as_str(), b.status.as_str()),
        SortField::Title => compare_text(a.display_title(), b.display_title()),
    }
}

/// Case-folded comparison first, raw text only to separate case variants.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

/// Stable in-place ordering of `indices` into `records`.
pub fn sort_indices(records: &[Record], indices: &mut [usize], sort: &SortState) {
    indices.sort_by(|a, b| sort.compare(&records[*a], &records[*b]));
}

pub fn apply<'a>(records: &[&'a Record], sort: &SortState) -> Vec<&'a Record> {
    let mut out = records.to_vec();
    out.sort_by(|a, b| sort.compare(a, b));
    out
}
