//! Test fixtures: a hand-driven clock and a service on an in-memory store.

use crate::config::ServiceConfig;
use crate::service::DailyRunService;
use crate::store::MemoryRunStore;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use dailyrun_env::RunContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Clock that only moves when told to; seeds are `seed-1`, `seed-2`, ...
pub struct ManualContext {
    now: Mutex<DateTime<Utc>>,
    issued: AtomicU64,
}

impl ManualContext {
    /// Starts at noon UTC on 2024-01-10 (a Wednesday).
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap())
    }
    
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            issued: AtomicU64::new(0),
        }
    }
    
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
    
    /// Jumps the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl RunContext for ManualContext {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
    
    fn fresh_seed(&self, _len: usize) -> String {
        format!("seed-{}", self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }
    
    fn seed(&self) -> u64 {
        0
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Service over a fresh memory store; the store handle is returned for
/// fault injection.
pub fn memory_service() -> (DailyRunService<ManualContext>, Arc<ManualContext>, Arc<MemoryRunStore>) {
    let context = Arc::new(ManualContext::new());
    let store = Arc::new(MemoryRunStore::new());
    let service = DailyRunService::with_store(ServiceConfig::default(), store.clone(), context.clone());
    (service, context, store)
}
