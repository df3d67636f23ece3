//! Simulation context implementing RunContext for deterministic testing.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use dailyrun_env::RunContext;
use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Simulation context backed by a virtual clock and a seeded RNG.
///
/// This implements `RunContext` using:
/// - A virtual clock that only moves when the harness advances it
/// - A seeded ChaCha8 RNG for day seeds
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,
    
    /// Current virtual time (nanoseconds since the epoch below)
    virtual_time_ns: Arc<Mutex<u64>>,
    
    /// Deterministic RNG for seed strings
    rng: Arc<Mutex<ChaCha8Rng>>,
    
    /// Virtual time 0 maps to this instant (2024-01-01 00:00:00 UTC, a Monday)
    epoch: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default(),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = lock(&self.virtual_time_ns);
        *time = time.saturating_add(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX));
    }
    
    /// Advances virtual time by whole days.
    pub fn advance_days(&self, days: u64) {
        self.advance_time(Duration::from_secs(86_400 * days));
    }
    
    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *lock(&self.virtual_time_ns) = time_ns;
    }
    
    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *lock(&self.virtual_time_ns)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
            epoch: self.epoch,
        }
    }
}

impl RunContext for SimContext {
    fn now(&self) -> DateTime<Utc> {
        let nanos = i64::try_from(self.time_ns()).unwrap_or(i64::MAX);
        self.epoch + ChronoDuration::nanoseconds(nanos)
    }
    
    fn fresh_seed(&self, len: usize) -> String {
        let mut rng = lock(&self.rng);
        (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
    }
    
    fn seed(&self) -> u64 {
        self.seed
    }
}
