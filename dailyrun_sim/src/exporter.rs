//! JSON exporter for leaderboard snapshots.
//!
//! Writes the final boards of a scenario run so they can be diffed across
//! seeds or inspected by hand.

use chrono::NaiveDate;
use dailyrun_core::{Category, DailyRunService, RankingRow, RunResult};
use dailyrun_env::RunContext;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Both leaderboards, every page, as of one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    /// Day the boards were read on
    pub day: NaiveDate,
    
    pub daily_pages: usize,
    pub daily: Vec<RankingRow>,
    
    pub weekly_pages: usize,
    pub weekly: Vec<RankingRow>,
    
    /// Runs on record, deleted included
    pub total_runs: usize,
    
    /// Runs on record, deleted excluded
    pub active_runs: usize,
}

impl LeaderboardSnapshot {
    /// Reads every page of both boards from `service`.
    pub fn capture<Ctx: RunContext>(service: &DailyRunService<Ctx>) -> RunResult<Self> {
        let (daily_pages, daily) = read_board(service, Category::Daily)?;
        let (weekly_pages, weekly) = read_board(service, Category::Weekly)?;
        
        Ok(Self {
            day: service.context().today(),
            daily_pages,
            daily,
            weekly_pages,
            weekly,
            total_runs: service.total_run_count(true)?,
            active_runs: service.total_run_count(false)?,
        })
    }
}

/// Page count and the concatenation of pages `1..=count`.
pub fn read_board<Ctx: RunContext>(
    service: &DailyRunService<Ctx>,
    category: Category,
) -> RunResult<(usize, Vec<RankingRow>)> {
    let pages = service.get_page_count(category)?;
    let mut rows = Vec::new();
    for page in 1..=pages {
        rows.extend(service.get_rankings(category, page as i64)?);
    }
    Ok((pages, rows))
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,
    
    /// Seed used
    pub seed: u64,
    
    /// Store backend name
    pub store: String,
    
    /// Final results
    pub passed: bool,
    
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    
    /// Final boards, if the run got far enough to read them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<LeaderboardSnapshot>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, store: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            store: store.to_string(),
            passed: false,
            failure_reason: None,
            snapshot: None,
        }
    }
    
    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, snapshot: Option<LeaderboardSnapshot>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.snapshot = snapshot;
    }
    
    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_export_skips_empty_fields() {
        let mut export = SimExport::new("score_storm", 42, "memory");
        export.finalize(true, None, None);
        
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "score_storm");
        assert_eq!(json["passed"], true);
        assert!(json.get("failure_reason").is_none());
        assert!(json.get("snapshot").is_none());
    }
}
