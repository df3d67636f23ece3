//! Production implementation of RunContext using the system clock.

use crate::RunContext;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;

/// Production context backed by the system clock and OS entropy.
///
/// This is the "real" implementation used in production deployments.
/// Time comes from the system clock, randomness from OsRng.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext;

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self
    }
    
    /// Creates an Arc-wrapped context for sharing across callers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl RunContext for SystemContext {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
    
    fn fresh_seed(&self, len: usize) -> String {
        OsRng
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
    
    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
