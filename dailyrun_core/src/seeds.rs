//! Seed Registry - one shared seed per UTC day.
//!
//! Uniqueness lives entirely at the storage boundary: a fresh candidate is
//! offered to `insert_seed_if_absent` and whatever the store kept is the
//! day's seed. Concurrent first callers therefore all observe the same value.

use crate::error::{RunError, RunResult};
use crate::model::DailySeed;
use crate::store::RunStore;
use chrono::NaiveDate;
use dailyrun_env::{format_day, RunContext};
use std::sync::Arc;
use tracing::{debug, info};

/// Issues and looks up day seeds.
pub struct SeedRegistry<Ctx: RunContext> {
    store: Arc<dyn RunStore>,
    context: Arc<Ctx>,
    seed_length: usize,
}

impl<Ctx: RunContext> Clone for SeedRegistry<Ctx> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            context: Arc::clone(&self.context),
            seed_length: self.seed_length,
        }
    }
}

impl<Ctx: RunContext> SeedRegistry<Ctx> {
    /// Creates a registry generating seeds of `seed_length` characters.
    pub fn new(store: Arc<dyn RunStore>, context: Arc<Ctx>, seed_length: usize) -> Self {
        Self {
            store,
            context,
            seed_length,
        }
    }
    
    /// Returns the seed for `day`, creating it if none exists yet.
    ///
    /// One store round trip; safe under concurrent first callers.
    pub fn issue_or_get_seed(&self, day: NaiveDate) -> RunResult<String> {
        let candidate = self.context.fresh_seed(self.seed_length);
        let stored = self.store.insert_seed_if_absent(DailySeed {
            day,
            seed: candidate.clone(),
        })?;
        
        if stored.seed == candidate {
            info!("Issued seed for {}", format_day(day));
        } else {
            debug!("Seed for {} already issued", format_day(day));
        }
        Ok(stored.seed)
    }
    
    /// Returns the seed for `day`, or `NotFound`.
    pub fn get_seed(&self, day: NaiveDate) -> RunResult<String> {
        self.store
            .get_seed(day)?
            .map(|s| s.seed)
            .ok_or_else(|| RunError::not_found(format!("No seed issued for {}", format_day(day))))
    }
    
    /// `issue_or_get_seed` for the context's current day.
    pub fn issue_today(&self) -> RunResult<String> {
        self.issue_or_get_seed(self.context.today())
    }
    
    /// `get_seed` for the context's current day.
    pub fn today_seed(&self) -> RunResult<String> {
        self.get_seed(self.context.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRunStore;
    use crate::sled_store::SledRunStore;
    use crate::testing::{day, ManualContext};
    use chrono::Duration;
    
    fn registry(store: Arc<dyn RunStore>) -> (SeedRegistry<ManualContext>, Arc<ManualContext>) {
        let ctx = Arc::new(ManualContext::new());
        (SeedRegistry::new(store, ctx.clone(), 24), ctx)
    }
    
    #[test]
    fn test_issue_is_idempotent() {
        let (seeds, _) = registry(Arc::new(MemoryRunStore::new()));
        let d = day(2024, 1, 10);
        
        let first = seeds.issue_or_get_seed(d).unwrap();
        let second = seeds.issue_or_get_seed(d).unwrap();
        
        assert_eq!(first, "seed-1");
        assert_eq!(second, first);
        assert_eq!(seeds.get_seed(d).unwrap(), first);
    }
    
    #[test]
    fn test_get_seed_missing_is_not_found() {
        let (seeds, _) = registry(Arc::new(MemoryRunStore::new()));
        assert!(matches!(seeds.get_seed(day(2024, 1, 10)), Err(RunError::NotFound(_))));
    }
    
    #[test]
    fn test_each_day_gets_its_own_seed() {
        let (seeds, ctx) = registry(Arc::new(MemoryRunStore::new()));
        
        let monday = seeds.issue_today().unwrap();
        ctx.advance(Duration::days(1));
        assert!(matches!(seeds.today_seed(), Err(RunError::NotFound(_))));
        let tuesday = seeds.issue_today().unwrap();
        
        assert_ne!(monday, tuesday);
        assert_eq!(seeds.get_seed(day(2024, 1, 10)).unwrap(), monday);
        assert_eq!(seeds.today_seed().unwrap(), tuesday);
    }
    
    #[test]
    fn test_concurrent_first_callers_converge() {
        let store: Arc<dyn RunStore> = Arc::new(SledRunStore::temporary().unwrap());
        let (seeds, _) = registry(store);
        let d = day(2024, 1, 10);
        
        let observed: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    let seeds = seeds.clone();
                    s.spawn(move || seeds.issue_or_get_seed(d).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        
        let stored = seeds.get_seed(d).unwrap();
        assert!(observed.iter().all(|seed| *seed == stored));
    }
    
    #[test]
    fn test_storage_failure_surfaces() {
        let store = Arc::new(MemoryRunStore::new());
        let (seeds, _) = registry(store.clone());
        store.set_unavailable(true);
        
        assert!(matches!(seeds.issue_today(), Err(RunError::StorageError(_))));
    }
}
