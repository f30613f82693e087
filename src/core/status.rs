use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Resolved,
    WontFix,
    FalsePositive,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Open,
        Status::InProgress,
        Status::Resolved,
        Status::WontFix,
        Status::FalsePositive,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::InProgress => "IN_PROGRESS",
            Status::Resolved => "RESOLVED",
            Status::WontFix => "WONT_FIX",
            Status::FalsePositive => "FALSE_POSITIVE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let normalized = s.to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "OPEN" => Ok(Status::Open),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "RESOLVED" => Ok(Status::Resolved),
            "WONT_FIX" => Ok(Status::WontFix),
            "FALSE_POSITIVE" => Ok(Status::FalsePositive),
            _ => Err(format!(
                "ステータスが不正です: {s}（OPEN|IN_PROGRESS|RESOLVED|WONT_FIX|FALSE_POSITIVE を指定してください）"
            )),
        }
    }
}
