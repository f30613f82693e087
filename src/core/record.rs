use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{Severity, Status};

/// A single finding as delivered by the record source.
///
/// Attributes the grid does not interpret are kept in `extra` so exports
/// re-emit the record as it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "id_from_scalar")]
    pub id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "packageName",
        skip_serializing_if = "Option::is_none"
    )]
    pub package_name: Option<String>,
    #[serde(default, alias = "cveId", skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// The document object this record was parsed from, key spelling and
    /// id type intact.
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

/// Ids arrive as strings or bare integers depending on the producer.
fn id_from_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        UInt(u64),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::UInt(n) => n.to_string(),
    })
}

impl Record {
    pub fn new(id: impl Into<String>, severity: Severity, status: Status) -> Self {
        Self {
            id: id.into(),
            severity,
            status,
            title: String::new(),
            name: None,
            package_name: None,
            cve_id: None,
            extra: BTreeMap::new(),
            raw: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    pub fn with_cve(mut self, cve_id: impl Into<String>) -> Self {
        self.cve_id = Some(cve_id.into());
        self
    }

    /// JSON form used by exports: the source object when one is known,
    /// otherwise the normalised fields.
    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => serde_json::to_value(self),
        }
    }

    /// Fields consulted by free-text search, in match order.
    pub fn search_fields(&self) -> [Option<&str>; 5] {
        [
            Some(self.id.as_str()),
            self.cve_id.as_deref(),
            self.package_name.as_deref(),
            Some(self.title.as_str()),
            self.name.as_deref(),
        ]
    }

    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            return &self.title;
        }
        self.name.as_deref().unwrap_or("")
    }
}
