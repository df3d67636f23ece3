//! Persistent records and the row shapes returned to callers.

use crate::error::{RunError, RunResult};
use chrono::{DateTime, NaiveDate, Utc};
use dailyrun_env::{ActorId, PlayerId};
use serde::{Deserialize, Serialize};

/// The shared seed for one UTC day. Written once, never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySeed {
    /// Calendar day (unique key)
    pub day: NaiveDate,
    
    /// Seed string every player of that day runs against
    pub seed: String,
}

/// Lifecycle state of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Visible on leaderboards (initial state)
    Active,
    /// Disqualified; kept for audit and restore
    Deleted,
}

/// A player's best run for one day.
///
/// Field ownership is split: the aggregator writes `score`, `wave` and
/// `last_updated`; the lifecycle manager writes `deleted`, `deleted_at` and
/// `deleted_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Owning player
    pub player: PlayerId,
    
    /// UTC day of the run
    pub day: NaiveDate,
    
    /// Best score submitted for the day
    pub score: i64,
    
    /// Best wave submitted for the day (tracked independently of score)
    pub wave: i64,
    
    /// Time the current best score was first reached
    pub last_updated: DateTime<Utc>,
    
    /// Soft-delete flag
    pub deleted: bool,
    
    /// Set iff `deleted`
    pub deleted_at: Option<DateTime<Utc>>,
    
    /// Set iff `deleted`
    pub deleted_by: Option<ActorId>,
    
    /// Store-assigned creation sequence; defines natural row order
    pub seq: u64,
}

impl RunRecord {
    /// Creates an active record from a first submission.
    ///
    /// `seq` is left at 0; the store assigns it on insert.
    pub fn new(player: PlayerId, day: NaiveDate, score: i64, wave: i64, now: DateTime<Utc>) -> Self {
        Self {
            player,
            day,
            score,
            wave,
            last_updated: now,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            seq: 0,
        }
    }
    
    /// Returns the lifecycle state.
    pub fn state(&self) -> RunState {
        if self.deleted {
            RunState::Deleted
        } else {
            RunState::Active
        }
    }
    
    /// True when the record may appear on leaderboards.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// Minimal player identity needed to join runs to names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Player identifier
    pub id: PlayerId,
    
    /// Display name (unique, case-insensitive)
    pub username: String,
    
    /// Banned players never appear on leaderboards
    pub banned: bool,
}

impl Account {
    /// Creates an account in good standing.
    pub fn new(id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            banned: false,
        }
    }
}

/// Leaderboard category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Today's runs, natural insertion order (category 0)
    Daily,
    /// Sum of this week's runs per player, ranked (category 1)
    Weekly,
}

impl Category {
    /// Wire code used by callers.
    pub fn code(&self) -> i64 {
        match self {
            Category::Daily => 0,
            Category::Weekly => 1,
        }
    }
}

impl TryFrom<i64> for Category {
    type Error = RunError;
    
    fn try_from(code: i64) -> RunResult<Self> {
        match code {
            0 => Ok(Category::Daily),
            1 => Ok(Category::Weekly),
            other => Err(RunError::validation(format!("Unknown ranking category: {}", other))),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Daily => f.write_str("daily"),
            Category::Weekly => f.write_str("weekly"),
        }
    }
}

/// One leaderboard row, shared by both categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    /// Computed rank (weekly only; daily order is positional)
    pub rank: Option<u32>,
    
    /// Player identifier
    pub player: PlayerId,
    
    /// Player display name
    pub username: String,
    
    /// Daily best score, or weekly sum
    pub score: i64,
    
    /// Daily best wave; always 0 for weekly
    pub wave: i64,
}

/// A run as shown in the administrative listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedRun {
    /// Player display name
    pub username: String,
    
    /// The stored record, including audit fields
    pub run: RunRecord,
}
