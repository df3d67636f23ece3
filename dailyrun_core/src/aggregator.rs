//! Submission Aggregator - folds submissions into a best-of-day record.
//!
//! The merge runs inside the store's atomic read-modify-write, so two
//! concurrent submissions for the same `(player, day)` can never lose each
//! other's maximum.

use crate::error::{RunError, RunResult};
use crate::model::RunRecord;
use crate::seeds::SeedRegistry;
use crate::store::RunStore;
use chrono::{DateTime, NaiveDate, Utc};
use dailyrun_env::{format_day, PlayerId, RunContext};
use std::sync::Arc;
use tracing::{debug, warn};

impl RunRecord {
    /// Folds one submission into this record.
    ///
    /// `score` and `wave` each take the maximum independently. `last_updated`
    /// moves only when the score strictly improves: it is the time the best
    /// score was reached and serves as the weekly tie-break.
    pub fn merge_submission(&mut self, score: i64, wave: i64, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if score > self.score {
            self.score = score;
            self.last_updated = now;
            changed = true;
        }
        if wave > self.wave {
            self.wave = wave;
            changed = true;
        }
        changed
    }
}

/// Accepts submissions and merges them into the store.
pub struct SubmissionAggregator<Ctx: RunContext> {
    store: Arc<dyn RunStore>,
    context: Arc<Ctx>,
    seeds: SeedRegistry<Ctx>,
    allow_future_days: bool,
}

impl<Ctx: RunContext> SubmissionAggregator<Ctx> {
    /// Creates an aggregator. `seeds` guarantees the day's seed exists
    /// before any run is recorded against it.
    pub fn new(
        store: Arc<dyn RunStore>,
        context: Arc<Ctx>,
        seeds: SeedRegistry<Ctx>,
        allow_future_days: bool,
    ) -> Self {
        Self {
            store,
            context,
            seeds,
            allow_future_days,
        }
    }
    
    /// Records `(score, wave)` for `player` on `day`.
    ///
    /// Returns the record as stored after the merge.
    ///
    /// # Errors
    /// * `ValidationError` - negative score/wave, or a future day
    /// * `NotFound` - unknown player
    /// * `StorageError` - store failure (not retried)
    pub fn submit(&self, player: PlayerId, day: NaiveDate, score: i64, wave: i64) -> RunResult<RunRecord> {
        if score < 0 || wave < 0 {
            warn!("Rejected submission from {}: score={} wave={}", player.short(), score, wave);
            return Err(RunError::validation(format!(
                "score and wave must be non-negative (got score={}, wave={})",
                score, wave
            )));
        }
        
        let today = self.context.today();
        if day > today && !self.allow_future_days {
            warn!("Rejected submission from {} for future day {}", player.short(), format_day(day));
            return Err(RunError::validation(format!(
                "cannot submit for {} (today is {})",
                format_day(day),
                format_day(today)
            )));
        }
        
        if self.store.get_account(player)?.is_none() {
            return Err(RunError::not_found(format!("Unknown player {}", player)));
        }
        
        self.seeds.issue_or_get_seed(day)?;
        
        let now = self.context.now();
        let stored = self.store.upsert_run(
            RunRecord::new(player, day, score, wave, now),
            &|record| {
                record.merge_submission(score, wave, now);
            },
        )?;
        
        debug!(
            "Merged submission {}@{}: ({}, {}) -> best ({}, {})",
            player.short(),
            format_day(day),
            score,
            wave,
            stored.score,
            stored.wave
        );
        Ok(stored)
    }
    
    /// `submit` for the context's current day.
    pub fn submit_today(&self, player: PlayerId, score: i64, wave: i64) -> RunResult<RunRecord> {
        self.submit(player, self.context.today(), score, wave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{day, memory_service};
    use chrono::Duration;
    use dailyrun_env::ActorId;
    use proptest::prelude::*;
    
    #[test]
    fn test_merge_keeps_fieldwise_maximum() {
        let t0 = Utc::now();
        let mut record = RunRecord::new(PlayerId::new(), day(2024, 1, 10), 100, 5, t0);
        
        assert!(record.merge_submission(90, 8, t0 + Duration::seconds(5)));
        assert_eq!((record.score, record.wave), (100, 8));
        // Wave-only improvement keeps the best-score timestamp
        assert_eq!(record.last_updated, t0);
        
        assert!(!record.merge_submission(100, 8, t0 + Duration::seconds(9)));
        assert_eq!(record.last_updated, t0);
        
        assert!(record.merge_submission(101, 1, t0 + Duration::seconds(10)));
        assert_eq!((record.score, record.wave), (101, 8));
        assert_eq!(record.last_updated, t0 + Duration::seconds(10));
    }
    
    #[test]
    fn test_submit_creates_seed_and_record() {
        let (service, _ctx, _) = memory_service();
        let p1 = service.register_player("p1").unwrap();
        let today = day(2024, 1, 10);
        
        service.submit(p1, today, 100, 5).unwrap();
        let stored = service.submit(p1, today, 90, 8).unwrap();
        
        assert_eq!((stored.score, stored.wave), (100, 8));
        assert!(service.get_seed(today).is_ok());
    }
    
    #[test]
    fn test_timestamp_tracks_best_score_only() {
        let (service, ctx, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        let first = service.submit_today(p, 50, 3).unwrap();
        ctx.advance(Duration::minutes(5));
        let wave_only = service.submit_today(p, 50, 9).unwrap();
        assert_eq!(wave_only.last_updated, first.last_updated);
        assert_eq!(wave_only.wave, 9);
        
        ctx.advance(Duration::minutes(5));
        let better = service.submit_today(p, 51, 1).unwrap();
        assert_eq!(better.last_updated, first.last_updated + Duration::minutes(10));
    }
    
    #[test]
    fn test_negative_values_rejected() {
        let (service, _, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        assert!(matches!(service.submit_today(p, -1, 0), Err(RunError::ValidationError(_))));
        assert!(matches!(service.submit_today(p, 0, -1), Err(RunError::ValidationError(_))));
        // Nothing was written, not even the seed
        assert!(matches!(service.today_seed(), Err(RunError::NotFound(_))));
    }
    
    #[test]
    fn test_future_day_rejected() {
        let (service, _, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        let err = service.submit(p, day(2024, 1, 11), 10, 1).unwrap_err();
        assert!(matches!(err, RunError::ValidationError(_)));
        
        // Past days are fine
        assert!(service.submit(p, day(2024, 1, 9), 10, 1).is_ok());
    }
    
    #[test]
    fn test_unknown_player_not_found() {
        let (service, _, _) = memory_service();
        let err = service.submit_today(PlayerId::new(), 10, 1).unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
    }
    
    #[test]
    fn test_submit_never_touches_deleted_flag() {
        let (service, _, _) = memory_service();
        let p = service.register_player("p").unwrap();
        let today = day(2024, 1, 10);
        
        service.submit(p, today, 10, 1).unwrap();
        service.soft_delete(p, today, &ActorId::new("mod")).unwrap();
        let stored = service.submit(p, today, 20, 2).unwrap();
        
        assert!(stored.deleted);
        assert_eq!(stored.deleted_by, Some(ActorId::new("mod")));
        assert_eq!(stored.score, 20);
    }
    
    #[test]
    fn test_concurrent_submissions_lose_nothing() {
        let (service, _, _) = memory_service();
        let p = service.register_player("p").unwrap();
        let today = day(2024, 1, 10);
        
        std::thread::scope(|s| {
            for i in 0..64i64 {
                let service = &service;
                s.spawn(move || {
                    service.submit(p, today, i * 3, 200 - i).unwrap();
                });
            }
        });
        
        let stored = service.find_run("p", today).unwrap().run;
        assert_eq!(stored.score, 63 * 3);
        assert_eq!(stored.wave, 200);
        assert_eq!(service.total_run_count(true).unwrap(), 1);
    }
    
    proptest! {
        #[test]
        fn prop_final_best_is_order_independent(
            submissions in prop::collection::vec((0i64..10_000, 0i64..500), 1..40)
        ) {
            let (forward, _, _) = memory_service();
            let (backward, _, _) = memory_service();
            let pf = forward.register_player("p").unwrap();
            let pb = backward.register_player("p").unwrap();
            
            for &(score, wave) in &submissions {
                forward.submit_today(pf, score, wave).unwrap();
            }
            for &(score, wave) in submissions.iter().rev() {
                backward.submit_today(pb, score, wave).unwrap();
            }
            
            let max_score = submissions.iter().map(|s| s.0).max().unwrap();
            let max_wave = submissions.iter().map(|s| s.1).max().unwrap();
            let today = day(2024, 1, 10);
            let f = forward.find_run("p", today).unwrap().run;
            let b = backward.find_run("p", today).unwrap().run;
            
            prop_assert_eq!((f.score, f.wave), (max_score, max_wave));
            prop_assert_eq!((b.score, b.wave), (max_score, max_wave));
        }
    }
}
