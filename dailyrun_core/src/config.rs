//! Service configuration.

use crate::error::RunResult;
use crate::sled_store::SledRunStore;
use crate::store::{MemoryRunStore, RunStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Where run data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// In-process tables, lost on drop
    Memory,
    
    /// Sled database in a temporary directory, removed on drop
    Temporary,
    
    /// Persistent sled database
    Sled {
        /// Database directory
        path: PathBuf,
        /// Flush to disk after every write (trades throughput for durability)
        flush_every_write: bool,
    },
}

impl StoreConfig {
    /// Opens the configured store.
    pub fn open(&self) -> RunResult<Arc<dyn RunStore>> {
        let store: Arc<dyn RunStore> = match self {
            StoreConfig::Memory => Arc::new(MemoryRunStore::new()),
            StoreConfig::Temporary => Arc::new(SledRunStore::temporary()?),
            StoreConfig::Sled { path, flush_every_write } => {
                Arc::new(SledRunStore::open(path, *flush_every_write)?)
            }
        };
        Ok(store)
    }
}

/// Configuration for a daily run service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Length of generated day seeds (default: 24)
    pub seed_length: usize,
    
    /// Accept submissions for days after today (default: false)
    pub allow_future_days: bool,
    
    /// Backing store (default: in-memory)
    pub store: StoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            seed_length: 24,
            allow_future_days: false,
            store: StoreConfig::Memory,
        }
    }
}

impl ServiceConfig {
    /// Sets the generated seed length.
    pub fn with_seed_length(mut self, len: usize) -> Self {
        self.seed_length = len;
        self
    }
    
    /// Allows or forbids submissions for future days.
    pub fn with_future_days(mut self, allow: bool) -> Self {
        self.allow_future_days = allow;
        self
    }
    
    /// Sets the backing store.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}
