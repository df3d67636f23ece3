//! Core environment context trait for the daily run engine.

use crate::clock::utc_day;
use chrono::{DateTime, NaiveDate, Utc};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the engines can run
/// in both production and simulation environments.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `Utc::now()`, `OsRng`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// For DST, all methods that would normally introduce non-determinism
/// (time, randomness) are controlled by the implementation.
pub trait RunContext: Send + Sync + 'static {
    /// Returns the current wall-clock time in UTC.
    ///
    /// Stamped onto run records as `last_updated` and `deleted_at`.
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn now(&self) -> DateTime<Utc>;
    
    /// Returns the current UTC calendar day.
    ///
    /// All day-scoped grouping (seeds, daily and weekly boards) goes
    /// through this boundary.
    fn today(&self) -> NaiveDate {
        utc_day(self.now())
    }
    
    /// Generates a fresh alphanumeric seed string of `len` characters.
    ///
    /// Only a candidate: the store decides which seed survives for a day.
    fn fresh_seed(&self, len: usize) -> String;
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
