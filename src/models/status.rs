//! Lot occupancy status.
//!
//! The field vocabulary has shifted over time (a four-valued
//! `empty/filling/tight/full` scale was used by early builds); everything is
//! folded onto the three canonical values at the parsing boundary.

use serde::{Deserialize, Serialize};

/// Number of distinct statuses the consensus engine votes over.
pub const STATUS_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Open,
    Filling,
    Full,
}

impl Default for LotStatus {
    fn default() -> Self {
        LotStatus::Open
    }
}

impl LotStatus {
    /// Canonical ordering; ties in the vote resolve to the earlier entry.
    pub const ALL: [LotStatus; STATUS_COUNT] =
        [LotStatus::Open, LotStatus::Filling, LotStatus::Full];

    pub fn index(self) -> usize {
        match self {
            LotStatus::Open => 0,
            LotStatus::Filling => 1,
            LotStatus::Full => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Open => "OPEN",
            LotStatus::Filling => "FILLING",
            LotStatus::Full => "FULL",
        }
    }

    /// Accepts canonical names in any case plus the legacy four-valued scale.
    /// Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<LotStatus> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" | "empty" => Some(LotStatus::Open),
            "filling" | "tight" => Some(LotStatus::Filling),
            "full" => Some(LotStatus::Full),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.as_str()
    }

    pub fn color(&self) -> &'static str {
        match self {
            LotStatus::Open => "#22c55e",
            LotStatus::Filling => "#eab308",
            LotStatus::Full => "#ef4444",
        }
    }
}

/// Colour shown for lots with no status at all (server rows without a value).
pub const UNKNOWN_STATUS_COLOR: &str = "#9ca3af";
