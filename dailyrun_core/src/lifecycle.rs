//! Lifecycle Manager - soft delete, restore and the administrative view.
//!
//! Each run record is a two-state machine:
//!
//! ```text
//!            soft_delete
//!   Active ───────────────► Deleted
//!     ▲                        │
//!     └────────────────────────┘
//!              restore
//! ```
//!
//! Repeating a transition from its target state is a no-op reported as
//! `Ok(false)`. There is no hard delete.

use crate::error::{RunError, RunResult};
use crate::model::{ListedRun, RunRecord};
use crate::ranking::{page_offset, Roster};
use crate::store::RunStore;
use chrono::{DateTime, NaiveDate, Utc};
use dailyrun_env::{format_day, parse_day, ActorId, PlayerId, RunContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest admin page size.
pub const ADMIN_MIN_LIMIT: i64 = 10;

/// Largest admin page size.
pub const ADMIN_MAX_LIMIT: i64 = 100;

impl RunRecord {
    /// `Active -> Deleted`. Returns false if already deleted.
    pub fn soft_delete(&mut self, at: DateTime<Utc>, actor: &ActorId) -> bool {
        if self.deleted {
            return false;
        }
        self.deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(actor.clone());
        true
    }
    
    /// `Deleted -> Active`. Returns false if not deleted.
    pub fn restore(&mut self) -> bool {
        if !self.deleted {
            return false;
        }
        self.deleted = false;
        self.deleted_at = None;
        self.deleted_by = None;
        true
    }
}

/// Clamps a requested admin page size into `[ADMIN_MIN_LIMIT, ADMIN_MAX_LIMIT]`.
pub fn clamp_limit(limit: i64) -> usize {
    let clamped = limit.clamp(ADMIN_MIN_LIMIT, ADMIN_MAX_LIMIT);
    if clamped != limit {
        warn!("Admin limit {} out of range, using {}", limit, clamped);
    }
    // Always within 10..=100
    clamped as usize
}

/// Case-insensitive substring match on name, score, wave or day.
fn matches_query(username: &str, run: &RunRecord, needle: &str) -> bool {
    username.to_lowercase().contains(needle)
        || run.score.to_string().contains(needle)
        || run.wave.to_string().contains(needle)
        || format_day(run.day).contains(needle)
}

/// Listed name of a run's player; runs without an account show the raw id.
fn listed_name(roster: &mut Roster<'_>, player: PlayerId) -> RunResult<String> {
    Ok(roster
        .account(player)?
        .map(|a| a.username.clone())
        .unwrap_or_else(|| player.to_string()))
}

/// Soft-deletes and restores runs; serves the administrative listing.
pub struct LifecycleManager<Ctx: RunContext> {
    store: Arc<dyn RunStore>,
    context: Arc<Ctx>,
}

impl<Ctx: RunContext> LifecycleManager<Ctx> {
    /// Creates the manager.
    pub fn new(store: Arc<dyn RunStore>, context: Arc<Ctx>) -> Self {
        Self { store, context }
    }
    
    /// Administrative listing, deleted runs included.
    ///
    /// `limit` is clamped to `[10, 100]`; a non-empty `query` keeps runs
    /// whose player name, score, wave or day contains it (case-insensitive).
    /// Rows come in natural (creation) order, offset `(page-1)*limit`.
    /// Whitespace in `query` is significant.
    pub fn list_runs(&self, page: i64, limit: i64, query: &str) -> RunResult<Vec<ListedRun>> {
        let limit = clamp_limit(limit);
        let offset = page_offset(page, limit);
        let needle = query.to_lowercase();
        debug!("Listing runs: page={} limit={} query={:?}", page, limit, needle);
        
        let mut roster = Roster::new(self.store.as_ref());
        
        if needle.is_empty() {
            return self
                .store
                .runs_page(offset, limit)?
                .into_iter()
                .map(|run| {
                    Ok(ListedRun {
                        username: listed_name(&mut roster, run.player)?,
                        run,
                    })
                })
                .collect();
        }
        
        // Stops as soon as the page is full
        let mut skipped = 0;
        let mut rows = Vec::with_capacity(limit);
        self.store.scan_runs(&mut |run| {
            let username = listed_name(&mut roster, run.player)?;
            if !matches_query(&username, run, &needle) {
                return Ok(true);
            }
            if skipped < offset {
                skipped += 1;
                return Ok(true);
            }
            rows.push(ListedRun {
                username,
                run: run.clone(),
            });
            Ok(rows.len() < limit)
        })?;
        Ok(rows)
    }
    
    /// Count of all runs, optionally including deleted ones.
    pub fn total_run_count(&self, include_deleted: bool) -> RunResult<usize> {
        self.store.count_runs(include_deleted)
    }
    
    /// Looks up one run by player name and day.
    pub fn find_run(&self, username: &str, day: NaiveDate) -> RunResult<ListedRun> {
        let account = self
            .store
            .find_account(username)?
            .ok_or_else(|| RunError::not_found(format!("Unknown player {:?}", username)))?;
        let run = self.store.get_run(account.id, day)?.ok_or_else(|| {
            RunError::not_found(format!("No run for {} on {}", account.username, format_day(day)))
        })?;
        Ok(ListedRun {
            username: account.username,
            run,
        })
    }
    
    /// Disqualifies a run. `NotFound` if it does not exist; `Ok(false)` if it
    /// was already deleted.
    pub fn soft_delete(&self, player: PlayerId, day: NaiveDate, actor: &ActorId) -> RunResult<bool> {
        let at = self.context.now();
        let changed = self
            .store
            .update_run(player, day, &|record| record.soft_delete(at, actor))?
            .ok_or_else(|| missing_run(player, day))?;
        
        if changed {
            info!("Soft deleted run {}@{} by {}", player.short(), format_day(day), actor);
        } else {
            debug!("Run {}@{} already deleted", player.short(), format_day(day));
        }
        Ok(changed)
    }
    
    /// Reinstates a run. `NotFound` if it does not exist; `Ok(false)` if it
    /// was not deleted.
    pub fn restore(&self, player: PlayerId, day: NaiveDate) -> RunResult<bool> {
        let changed = self
            .store
            .update_run(player, day, &|record| record.restore())?
            .ok_or_else(|| missing_run(player, day))?;
        
        if changed {
            info!("Restored run {}@{}", player.short(), format_day(day));
        } else {
            debug!("Run {}@{} was not deleted", player.short(), format_day(day));
        }
        Ok(changed)
    }
    
    /// `soft_delete` addressed the way moderators do: name and `YYYY-MM-DD`.
    pub fn soft_delete_by_name(&self, username: &str, day: &str, actor: &ActorId) -> RunResult<bool> {
        let day = parse_day(day)?;
        let listed = self.find_run(username, day)?;
        self.soft_delete(listed.run.player, day, actor)
    }
    
    /// `restore` addressed by name and `YYYY-MM-DD`.
    pub fn restore_by_name(&self, username: &str, day: &str) -> RunResult<bool> {
        let day = parse_day(day)?;
        let listed = self.find_run(username, day)?;
        self.restore(listed.run.player, day)
    }
}

fn missing_run(player: PlayerId, day: NaiveDate) -> RunError {
    RunError::not_found(format!("No run for {} on {}", player, format_day(day)))
}
