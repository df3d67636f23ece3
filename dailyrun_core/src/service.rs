//! Daily Run Service - wires the components to one store and one context.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      DailyRunService                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 Context: RunContext                     │  │
//! │  │  • now() / today() → UTC day boundaries                 │  │
//! │  │  • fresh_seed() → seed entropy                          │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                              │                                │
//! │  ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌──────────────┐  │
//! │  │   SEED   │ │ SUBMISSION │ │ RANKING  │ │  LIFECYCLE   │  │
//! │  │ Registry │ │ Aggregator │ │  Engine  │ │   Manager    │  │
//! │  └──────────┘ └────────────┘ └──────────┘ └──────────────┘  │
//! │                              │                                │
//! │                    Arc<dyn RunStore>                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dailyrun_core::{DailyRunService, ServiceConfig, Category};
//! use dailyrun_env::SystemContext;
//!
//! let service = DailyRunService::open(ServiceConfig::default(), SystemContext::shared())?;
//! let player = service.register_player("alice")?;
//! let seed = service.issue_today_seed()?;
//! service.submit_today(player, 1_200, 14)?;
//! let board = service.get_rankings(Category::Daily, 1)?;
//! ```

use crate::aggregator::SubmissionAggregator;
use crate::config::ServiceConfig;
use crate::error::{RunError, RunResult};
use crate::lifecycle::LifecycleManager;
use crate::model::{Account, Category, ListedRun, RankingRow, RunRecord};
use crate::ranking::RankingEngine;
use crate::seeds::SeedRegistry;
use crate::store::RunStore;
use chrono::NaiveDate;
use dailyrun_env::{ActorId, PlayerId, RunContext};
use std::sync::Arc;
use tracing::info;

/// Front door to the competition engine.
///
/// Generic over the context so the same service runs against the wall
/// clock in production and a virtual clock in simulation.
pub struct DailyRunService<Ctx: RunContext> {
    /// Configuration the service was built with
    pub config: ServiceConfig,
    
    store: Arc<dyn RunStore>,
    context: Arc<Ctx>,
    seeds: SeedRegistry<Ctx>,
    aggregator: SubmissionAggregator<Ctx>,
    rankings: RankingEngine<Ctx>,
    lifecycle: LifecycleManager<Ctx>,
}

impl<Ctx: RunContext> DailyRunService<Ctx> {
    /// Opens the store named by `config.store` and builds the service on it.
    pub fn open(config: ServiceConfig, context: Arc<Ctx>) -> RunResult<Self> {
        let store = config.store.open()?;
        Ok(Self::with_store(config, store, context))
    }
    
    /// Builds the service on an existing store. `config.store` is ignored.
    pub fn with_store(config: ServiceConfig, store: Arc<dyn RunStore>, context: Arc<Ctx>) -> Self {
        let seeds = SeedRegistry::new(store.clone(), context.clone(), config.seed_length);
        let aggregator = SubmissionAggregator::new(
            store.clone(),
            context.clone(),
            seeds.clone(),
            config.allow_future_days,
        );
        let rankings = RankingEngine::new(store.clone(), context.clone());
        let lifecycle = LifecycleManager::new(store.clone(), context.clone());
        
        Self {
            config,
            store,
            context,
            seeds,
            aggregator,
            rankings,
            lifecycle,
        }
    }
    
    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }
    
    /// The environment context.
    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }
    
    // ========================================================================
    // ACCOUNTS
    // ========================================================================
    
    /// Registers a player under a unique, case-insensitive name.
    pub fn register_player(&self, username: &str) -> RunResult<PlayerId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RunError::validation("username must not be empty"));
        }
        
        let account = Account::new(PlayerId::new(), username);
        if !self.store.insert_account(&account)? {
            return Err(RunError::validation(format!("username {:?} is taken", username)));
        }
        info!("Registered player {} as {:?}", account.id.short(), username);
        Ok(account.id)
    }
    
    /// Bans or unbans a player. Returns whether the flag changed.
    pub fn set_banned(&self, player: PlayerId, banned: bool) -> RunResult<bool> {
        let changed = self
            .store
            .update_account(player, &|account| {
                if account.banned == banned {
                    return false;
                }
                account.banned = banned;
                true
            })?
            .ok_or_else(|| RunError::not_found(format!("Unknown player {}", player)))?;
        
        if changed {
            info!("Player {} banned={}", player.short(), banned);
        }
        Ok(changed)
    }
    
    // ========================================================================
    // SEEDS
    // ========================================================================
    
    /// The seed for `day`, issuing one if none exists yet. Concurrent
    /// callers for the same day all get the same seed.
    pub fn issue_or_get_seed(&self, day: NaiveDate) -> RunResult<String> {
        self.seeds.issue_or_get_seed(day)
    }
    
    /// The already-issued seed for `day`; `NotFound` if there is none.
    pub fn get_seed(&self, day: NaiveDate) -> RunResult<String> {
        self.seeds.get_seed(day)
    }
    
    /// `issue_or_get_seed` for today.
    pub fn issue_today_seed(&self) -> RunResult<String> {
        self.seeds.issue_today()
    }
    
    /// `get_seed` for today.
    pub fn today_seed(&self) -> RunResult<String> {
        self.seeds.today_seed()
    }
    
    // ========================================================================
    // SUBMISSIONS
    // ========================================================================
    
    /// Records a finished run for `day`.
    ///
    /// The first submission creates the record; later ones keep the best
    /// score and the best wave independently. Negative values are rejected.
    pub fn submit(&self, player: PlayerId, day: NaiveDate, score: i64, wave: i64) -> RunResult<RunRecord> {
        self.aggregator.submit(player, day, score, wave)
    }
    
    /// `submit` for today.
    pub fn submit_today(&self, player: PlayerId, score: i64, wave: i64) -> RunResult<RunRecord> {
        self.aggregator.submit_today(player, score, wave)
    }
    
    // ========================================================================
    // RANKINGS
    // ========================================================================
    
    /// One leaderboard page (10 rows, pages <= 0 read as page 1).
    pub fn get_rankings(&self, category: Category, page: i64) -> RunResult<Vec<RankingRow>> {
        self.rankings.get_rankings(category, page)
    }
    
    /// Number of leaderboard pages for `category`.
    pub fn get_page_count(&self, category: Category) -> RunResult<usize> {
        self.rankings.get_page_count(category)
    }
    
    // ========================================================================
    // LIFECYCLE
    // ========================================================================
    
    /// Administrative listing of every run, deleted ones included.
    /// See [`LifecycleManager::list_runs`].
    pub fn list_runs(&self, page: i64, limit: i64, query: &str) -> RunResult<Vec<ListedRun>> {
        self.lifecycle.list_runs(page, limit, query)
    }
    
    /// Number of stored runs.
    pub fn total_run_count(&self, include_deleted: bool) -> RunResult<usize> {
        self.lifecycle.total_run_count(include_deleted)
    }
    
    /// One run by player name (case-insensitive) and day.
    pub fn find_run(&self, username: &str, day: NaiveDate) -> RunResult<ListedRun> {
        self.lifecycle.find_run(username, day)
    }
    
    /// Hides a run from the leaderboards. `Ok(false)` if it already was.
    pub fn soft_delete(&self, player: PlayerId, day: NaiveDate, actor: &ActorId) -> RunResult<bool> {
        self.lifecycle.soft_delete(player, day, actor)
    }
    
    /// Undoes `soft_delete`. `Ok(false)` if the run was not deleted.
    pub fn restore(&self, player: PlayerId, day: NaiveDate) -> RunResult<bool> {
        self.lifecycle.restore(player, day)
    }
    
    /// `soft_delete` by player name and a `YYYY-MM-DD` day.
    pub fn soft_delete_by_name(&self, username: &str, day: &str, actor: &ActorId) -> RunResult<bool> {
        self.lifecycle.soft_delete_by_name(username, day, actor)
    }
    
    /// `restore` by player name and a `YYYY-MM-DD` day.
    pub fn restore_by_name(&self, username: &str, day: &str) -> RunResult<bool> {
        self.lifecycle.restore_by_name(username, day)
    }
}
