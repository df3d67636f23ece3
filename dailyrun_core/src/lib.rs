//! Daily Run Core - the competition engine behind a daily challenge mode.
//!
//! Every UTC day has exactly one shared seed. Players submit `(score, wave)`
//! results against it, and the engine keeps one best-of-day record per
//! player. Those records feed two leaderboards and an admin surface:
//! 1. **Seed Registry**: insert-if-absent issuance, one seed per day forever
//! 2. **Submission Aggregator**: atomic field-wise max merge
//! 3. **Ranking Engine**: daily board in insertion order, weekly board by RANK()
//! 4. **Lifecycle Manager**: reversible soft delete plus the admin listing
//!
//! Storage sits behind [`RunStore`]; [`MemoryRunStore`] and [`SledRunStore`]
//! are interchangeable.

pub mod error;
pub mod model;
pub mod store;
pub mod sled_store;
pub mod config;
pub mod seeds;
pub mod aggregator;
pub mod ranking;
pub mod lifecycle;
pub mod service;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use error::{RunError, RunResult};
pub use model::{Account, Category, DailySeed, ListedRun, RankingRow, RunRecord, RunState};
pub use store::{MemoryRunStore, RunStore};
pub use sled_store::SledRunStore;
pub use config::{ServiceConfig, StoreConfig};
pub use seeds::SeedRegistry;
pub use aggregator::SubmissionAggregator;
pub use ranking::{page_count, page_offset, RankingEngine, RankingStrategy, RANKING_PAGE_SIZE};
pub use lifecycle::{LifecycleManager, ADMIN_MAX_LIMIT, ADMIN_MIN_LIMIT};
pub use service::DailyRunService;
