//! Scenario runner - drives the engine from many concurrent callers and
//! checks every observable against the oracle.

use crate::context::SimContext;
use crate::exporter::{read_board, LeaderboardSnapshot};
use crate::oracle::Oracle;
use crate::players::DeterministicNameProvider;
use crate::scenarios::{ScenarioId, StoreKind};

use chrono::{Duration as ChronoDuration, NaiveDate};
use dailyrun_core::{page_count, Category, DailyRunService, RunError, ServiceConfig, StoreConfig};
use dailyrun_env::{format_day, ActorId, PlayerId, RunContext};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Submissions per player in the storm scenarios.
const SUBMISSIONS_PER_PLAYER: usize = 8;

/// Days covered by the rollover scenario.
const ROLLOVER_DAYS: u64 = 10;

/// Why a scenario stopped.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("engine error: {0}")]
    Engine(#[from] RunError),
    
    #[error("invariant violated: {0}")]
    Invariant(String),
    
    #[error("caller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Fails with `SimError::Invariant` unless `holds`.
fn ensure(holds: bool, describe: impl FnOnce() -> String) -> Result<(), SimError> {
    if holds {
        Ok(())
    } else {
        Err(SimError::Invariant(describe()))
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Backend the scenario ran against
    pub store: StoreKind,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Virtual day the scenario ended on
    pub final_day: Option<NaiveDate>,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
    
    /// Final boards (absent if the scenario failed before reading them)
    pub snapshot: Option<LeaderboardSnapshot>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Seed issue/get calls
    pub seed_requests: u64,
    
    /// Accepted submissions
    pub submissions: u64,
    
    /// Submissions the engine refused
    pub rejected: u64,
    
    /// Soft delete and restore calls
    pub lifecycle_ops: u64,
    
    /// Of those, calls that changed state
    pub lifecycle_changes: u64,
    
    /// Days the virtual clock covered
    pub days_simulated: u64,
    
    /// Oracle comparisons performed
    pub checks: u64,
}

/// Runs scenarios against a fresh service per run.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,
    
    /// Number of registered players
    num_players: usize,
    
    /// Store backend
    store: StoreKind,
    
    /// Worker threads for the caller runtime
    workers: usize,
}

/// Everything one scenario touches.
struct Harness {
    context: Arc<SimContext>,
    service: Arc<DailyRunService<SimContext>>,
    oracle: Oracle,
    players: Vec<SimPlayer>,
    metrics: ScenarioMetrics,
}

#[derive(Debug, Clone)]
struct SimPlayer {
    id: PlayerId,
    username: String,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_players: usize) -> Self {
        Self {
            seed,
            num_players: num_players.max(1),
            store: StoreKind::Memory,
            workers: 4,
        }
    }
    
    /// Sets the store backend.
    pub fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }
    
    /// Sets the caller thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
    
    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={}, players={}, store={})",
            scenario.name(),
            self.seed,
            self.num_players,
            self.store.name()
        );
        debug!("{}", scenario.description());
        
        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            store: self.store,
            passed: false,
            final_day: None,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
            snapshot: None,
        };
        
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.workers)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                result.failure_reason = Some(SimError::from(e).to_string());
                return result;
            }
        };
        
        let mut harness = match self.harness() {
            Ok(harness) => harness,
            Err(e) => {
                result.failure_reason = Some(e.to_string());
                return result;
            }
        };
        
        let outcome = runtime.block_on(async {
            match scenario {
                ScenarioId::SeedStampede => seed_stampede(&mut harness).await,
                ScenarioId::ScoreStorm => score_storm(&mut harness).await,
                ScenarioId::WaveCreep => wave_creep(&mut harness),
                ScenarioId::PurgeAndRestore => purge_and_restore(&mut harness).await,
                ScenarioId::WeekRollover => week_rollover(&mut harness),
                ScenarioId::BannedPlayer => banned_player(&mut harness),
            }
        });
        
        result.final_day = Some(harness.context.today());
        result.snapshot = LeaderboardSnapshot::capture(&*harness.service).ok();
        result.metrics = harness.metrics;
        match outcome {
            Ok(()) => result.passed = true,
            Err(e) => result.failure_reason = Some(e.to_string()),
        }
        result
    }
    
    fn harness(&self) -> Result<Harness, SimError> {
        // Context and oracle draw from separate streams so adding checks to
        // one never perturbs the other
        let context = SimContext::shared(self.seed);
        context.advance_time(Duration::from_secs(9 * 3_600));
        
        let store = match self.store {
            StoreKind::Memory => StoreConfig::Memory,
            StoreKind::Sled => StoreConfig::Temporary,
        };
        let config = ServiceConfig::default().with_store(store);
        let service = Arc::new(DailyRunService::open(config, context.clone())?);
        
        let mut names = DeterministicNameProvider::new(self.seed);
        let mut players = Vec::with_capacity(self.num_players);
        for username in names.usernames(self.num_players) {
            let id = service.register_player(&username)?;
            players.push(SimPlayer { id, username });
        }
        
        Ok(Harness {
            context,
            service,
            oracle: Oracle::new(self.seed.wrapping_mul(0x9e3779b97f4a7c15)),
            players,
            metrics: ScenarioMetrics {
                days_simulated: 1,
                ..ScenarioMetrics::default()
            },
        })
    }
}

/// Runs every job on the blocking pool at once and collects the results in
/// job order.
async fn fan_out<T, F>(jobs: Vec<F>) -> Result<Vec<T>, SimError>
where
    F: FnOnce() -> Result<T, RunError> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = jobs.into_iter().map(tokio::task::spawn_blocking).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await??);
    }
    Ok(results)
}

impl Harness {
    /// Submits sequentially and mirrors the submission into the oracle.
    fn submit(&mut self, player: usize, day: NaiveDate, score: i64, wave: i64) -> Result<(), SimError> {
        let SimPlayer { id, username } = self.players[player].clone();
        let stored = self.service.submit(id, day, score, wave)?;
        self.oracle.record(&username, day, score, wave, self.context.now());
        self.metrics.submissions += 1;
        
        let expected = self.oracle.expected(&username, day);
        ensure(expected.map(|e| (e.score, e.wave)) == Some((stored.score, stored.wave)), || {
            format!("{} on {}: stored {}/{} after submit, oracle {:?}", username, format_day(day), stored.score, stored.wave, expected)
        })
    }
    
    /// Every player's stored run on `day` matches the oracle.
    fn verify_runs(&mut self, day: NaiveDate) -> Result<(), SimError> {
        for player in &self.players {
            self.metrics.checks += 1;
            let expected = self.oracle.expected(&player.username, day);
            match (self.service.find_run(&player.username, day), expected) {
                (Ok(listed), Some(expected)) => {
                    let run = listed.run;
                    ensure(
                        run.score == expected.score
                            && run.wave == expected.wave
                            && run.deleted == expected.deleted
                            && run.last_updated == expected.best_at,
                        || format!("{} on {}: stored {:?}, expected {:?}", player.username, format_day(day), run, expected),
                    )?;
                    ensure(run.deleted == run.deleted_at.is_some(), || {
                        format!("{} on {}: audit fields out of step", player.username, format_day(day))
                    })?;
                }
                (Err(RunError::NotFound(_)), None) => {}
                (Ok(listed), None) => {
                    return Err(SimError::Invariant(format!("unexpected run {:?}", listed)));
                }
                (Err(e), _) => return Err(e.into()),
            }
        }
        Ok(())
    }
    
    /// Both boards and their page counts match the oracle for today.
    fn verify_boards(&mut self) -> Result<(), SimError> {
        let today = self.context.today();
        self.metrics.checks += 2;
        
        let (daily_pages, daily) = read_board(&*self.service, Category::Daily)?;
        let expected_daily = self.oracle.expected_daily(today);
        ensure(daily_pages == page_count(expected_daily.len()), || {
            format!("daily page count {} for {} rows", daily_pages, expected_daily.len())
        })?;
        ensure(daily.iter().all(|row| row.rank.is_none()), || "daily rows carry a rank".to_string())?;
        let mut seen: Vec<(String, i64, i64)> = daily.into_iter().map(|r| (r.username, r.score, r.wave)).collect();
        seen.sort();
        ensure(seen == expected_daily, || format!("daily board {:?}, expected {:?}", seen, expected_daily))?;
        
        let (weekly_pages, weekly) = read_board(&*self.service, Category::Weekly)?;
        let expected_weekly = self.oracle.expected_weekly(today);
        ensure(weekly_pages == page_count(expected_weekly.len()), || {
            format!("weekly page count {} for {} rows", weekly_pages, expected_weekly.len())
        })?;
        let shape: Vec<(Option<u32>, &str, i64)> = weekly
            .iter()
            .map(|r| (r.rank, r.username.as_str(), r.score))
            .collect();
        let expected_shape: Vec<(Option<u32>, &str, i64)> = expected_weekly
            .iter()
            .map(|s| (Some(s.rank), s.username.as_str(), s.total))
            .collect();
        ensure(shape == expected_shape, || format!("weekly board {:?}, expected {:?}", shape, expected_shape))?;
        
        ensure(self.service.get_rankings(Category::Weekly, weekly_pages as i64 + 1)?.is_empty(), || {
            "page past the end is not empty".to_string()
        })
    }
    
    /// Totals match the oracle.
    fn verify_counts(&mut self) -> Result<(), SimError> {
        self.metrics.checks += 1;
        let total = self.service.total_run_count(true)?;
        let active = self.service.total_run_count(false)?;
        ensure(
            total == self.oracle.run_count(true) && active == self.oracle.run_count(false),
            || format!("counts total={} active={}, expected {}/{}", total, active, self.oracle.run_count(true), self.oracle.run_count(false)),
        )
    }
    
    fn advance_secs(&self, secs: usize) {
        self.context.advance_time(Duration::from_secs(secs as u64));
    }
}

/// DST-001: SeedStampede - concurrent first issuance of a day's seed.
///
/// **Assertion**: every caller sees the same seed, it is still the seed
/// after the day rolls over, and the next day gets a different one.
async fn seed_stampede(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-001: SeedStampede - racing seed issuance");
    let today = h.context.today();
    
    let jobs: Vec<_> = (0..h.players.len() * 4)
        .map(|_| {
            let service = h.service.clone();
            move || service.issue_or_get_seed(today)
        })
        .collect();
    let seeds = fan_out(jobs).await?;
    h.metrics.seed_requests += seeds.len() as u64;
    
    let first = seeds
        .first()
        .cloned()
        .ok_or_else(|| SimError::Invariant("no seed requests ran".to_string()))?;
    ensure(seeds.iter().all(|s| *s == first), || format!("{} callers saw diverging seeds", seeds.len()))?;
    ensure(first.len() == h.service.config.seed_length, || format!("seed {:?} has wrong length", first))?;
    ensure(h.service.get_seed(today)? == first, || "stored seed differs from issued".to_string())?;
    
    h.context.advance_days(1);
    h.metrics.days_simulated += 1;
    let tomorrow = h.context.today();
    ensure(matches!(h.service.get_seed(tomorrow), Err(RunError::NotFound(_))), || {
        format!("seed for {} exists before issuance", format_day(tomorrow))
    })?;
    
    let next = h.service.issue_today_seed()?;
    h.metrics.seed_requests += 2;
    ensure(next != first, || "consecutive days share a seed".to_string())?;
    ensure(h.service.get_seed(today)? == first, || "yesterday's seed changed".to_string())?;
    
    info!("  {} requests, seed {} for {}", h.metrics.seed_requests, first, format_day(today));
    Ok(())
}

/// DST-002: ScoreStorm - concurrent submissions for the same runs.
///
/// Submissions are drawn and folded into the oracle up front, then all of
/// them hit the engine at once. The clock does not move during the storm.
///
/// **Assertion**: no maximum is lost; one record per player.
async fn score_storm(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-002: ScoreStorm - {} concurrent submissions per player", SUBMISSIONS_PER_PLAYER);
    let today = h.context.today();
    let now = h.context.now();
    
    let mut jobs = Vec::new();
    for _ in 0..SUBMISSIONS_PER_PLAYER {
        for player in &h.players {
            let (score, wave) = h.oracle.draw_submission();
            h.oracle.record(&player.username, today, score, wave, now);
            let service = h.service.clone();
            let id = player.id;
            jobs.push(move || service.submit(id, today, score, wave));
        }
    }
    h.metrics.submissions += fan_out(jobs).await?.len() as u64;
    
    h.verify_runs(today)?;
    h.verify_boards()?;
    h.verify_counts()?;
    ensure(h.service.total_run_count(true)? == h.players.len(), || {
        "storm produced more than one record per player".to_string()
    })?;
    
    // The seed was issued by whichever submission got there first
    ensure(h.service.get_seed(today).is_ok(), || "storm left no seed behind".to_string())
}

/// DST-003: WaveCreep - sequential submissions with a moving clock.
///
/// Waves mostly climb while scores are noisy, so many submissions improve
/// only the wave.
///
/// **Assertion**: `last_updated` is the moment of the best score, never a
/// later wave-only improvement.
fn wave_creep(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-003: WaveCreep - wave-only improvements must not move last_updated");
    let today = h.context.today();
    let mut wave_only = 0u64;
    
    for round in 0..SUBMISSIONS_PER_PLAYER {
        for player in 0..h.players.len() {
            let (score, _) = h.oracle.draw_submission();
            let wave = (round * 5 + h.oracle.pick(5)) as i64;
            let before = h.oracle.expected(&h.players[player].username, today).map(|e| e.score);
            if before.is_some_and(|best| score <= best) {
                wave_only += 1;
            }
            h.submit(player, today, score, wave)?;
            let pause = 1 + h.oracle.pick(3);
            h.advance_secs(pause);
        }
    }
    
    ensure(h.context.today() == today, || "wave creep crossed midnight".to_string())?;
    h.verify_runs(today)?;
    h.verify_boards()?;
    info!("  {} submissions left the score unchanged", wave_only);
    Ok(())
}

/// DST-004: PurgeAndRestore - racing moderators.
///
/// **Assertion**: exactly one racing delete (and one racing restore)
/// reports a change per run; rankings and counts follow the flags.
async fn purge_and_restore(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-004: PurgeAndRestore - concurrent soft delete and restore");
    let today = h.context.today();
    
    for player in 0..h.players.len() {
        let (score, wave) = h.oracle.draw_submission();
        h.submit(player, today, score, wave)?;
    }
    h.advance_secs(30 * 60);
    
    let targets: Vec<SimPlayer> = h
        .players
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 == 0)
        .map(|(_, p)| p.clone())
        .collect();
    
    // Three moderators per target
    let mut jobs = Vec::new();
    for target in &targets {
        for moderator in 0..3 {
            let service = h.service.clone();
            let id = target.id;
            let actor = ActorId::new(format!("mod-{}", moderator));
            jobs.push(move || service.soft_delete(id, today, &actor));
        }
    }
    let deletes = fan_out(jobs).await?;
    let changed = deletes.iter().filter(|c| **c).count();
    h.metrics.lifecycle_ops += deletes.len() as u64;
    h.metrics.lifecycle_changes += changed as u64;
    ensure(changed == targets.len(), || format!("{} deletes changed state for {} targets", changed, targets.len()))?;
    for target in &targets {
        h.oracle.soft_delete(&target.username, today);
    }
    
    h.verify_runs(today)?;
    h.verify_boards()?;
    h.verify_counts()?;
    
    // Deleted runs stay visible to admins
    for target in &targets {
        let listed = h.service.list_runs(1, 100, &target.username)?;
        ensure(listed.iter().any(|l| l.username == target.username && l.run.deleted), || {
            format!("{} missing from admin listing", target.username)
        })?;
    }
    
    // Restore every other target, two moderators racing
    let restored: Vec<SimPlayer> = targets.iter().step_by(2).cloned().collect();
    let mut jobs = Vec::new();
    for target in &restored {
        for _ in 0..2 {
            let service = h.service.clone();
            let id = target.id;
            jobs.push(move || service.restore(id, today));
        }
    }
    let restores = fan_out(jobs).await?;
    let changed = restores.iter().filter(|c| **c).count();
    h.metrics.lifecycle_ops += restores.len() as u64;
    h.metrics.lifecycle_changes += changed as u64;
    ensure(changed == restored.len(), || format!("{} restores changed state for {} runs", changed, restored.len()))?;
    for target in &restored {
        h.oracle.restore(&target.username, today);
    }
    
    // Submissions to a deleted run keep it deleted
    if let Some(still_deleted) = targets.iter().skip(1).step_by(2).next() {
        if let Some(index) = h.players.iter().position(|p| p.id == still_deleted.id) {
            h.submit(index, today, i64::from(u16::MAX), 99)?;
        }
    }
    
    h.verify_runs(today)?;
    h.verify_boards()?;
    h.verify_counts()
}

/// DST-005: WeekRollover - ten days of play from a Monday.
///
/// **Assertion**: after every day the weekly board equals the oracle's, so
/// the Sunday reset and the RANK() ties hold; each day keeps its own seed.
fn week_rollover(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-005: WeekRollover - {} days across a week boundary", ROLLOVER_DAYS);
    let mut seeds: Vec<(NaiveDate, String)> = Vec::new();
    
    for offset in 0..ROLLOVER_DAYS {
        if offset > 0 {
            h.metrics.days_simulated += 1;
        }
        // Every day opens at 09:00
        h.context.set_time((offset * 86_400 + 9 * 3_600) * 1_000_000_000);
        let today = h.context.today();
        let morning = h.context.now();
        
        for player in 0..h.players.len() {
            if !h.oracle.chance(0.7) {
                continue;
            }
            for _ in 0..1 + h.oracle.pick(3) {
                let (score, wave) = h.oracle.draw_submission();
                h.submit(player, today, score, wave)?;
                let pause = 1 + h.oracle.pick(5);
                h.advance_secs(pause);
            }
        }
        
        // A late result for yesterday is accepted; one for tomorrow is not
        if offset > 0 && !h.players.is_empty() {
            let late = h.oracle.pick(h.players.len());
            let (score, wave) = h.oracle.draw_submission();
            h.submit(late, today - ChronoDuration::days(1), score, wave)?;
        }
        let future = h.service.submit(h.players[0].id, today + ChronoDuration::days(1), 1, 1);
        ensure(matches!(future, Err(RunError::ValidationError(_))), || "future day accepted".to_string())?;
        h.metrics.rejected += 1;
        
        if let Ok(seed) = h.service.get_seed(today) {
            seeds.push((today, seed));
        }
        h.metrics.seed_requests += 1;
        
        h.verify_runs(today)?;
        h.verify_boards()?;
        debug!(
            "  {} ({}): {} weekly rows after {}s of play",
            format_day(today),
            today.format("%a"),
            h.oracle.expected_weekly(today).len(),
            (h.context.now() - morning).num_seconds()
        );
    }
    
    for (day, seed) in &seeds {
        ensure(h.service.get_seed(*day)? == *seed, || format!("seed for {} changed", format_day(*day)))?;
    }
    let mut distinct: Vec<&String> = seeds.iter().map(|(_, s)| s).collect();
    distinct.sort();
    distinct.dedup();
    ensure(distinct.len() == seeds.len(), || "two days share a seed".to_string())?;
    
    h.verify_counts()
}

/// DST-006: BannedPlayer - bans remove players from both boards.
///
/// **Assertion**: boards and page counts shrink together; the admin
/// listing and totals still see banned players' runs.
fn banned_player(h: &mut Harness) -> Result<(), SimError> {
    info!("DST-006: BannedPlayer - bans hide rows from rankings only");
    let today = h.context.today();
    let yesterday = today - ChronoDuration::days(1);
    
    for player in 0..h.players.len() {
        let (score, wave) = h.oracle.draw_submission();
        h.submit(player, yesterday, score, wave)?;
        let (score, wave) = h.oracle.draw_submission();
        h.submit(player, today, score, wave)?;
        h.advance_secs(1);
    }
    h.verify_boards()?;
    
    let banned: Vec<SimPlayer> = h.players.iter().step_by(4).cloned().collect();
    for player in &banned {
        ensure(h.service.set_banned(player.id, true)?, || format!("ban of {} reported no change", player.username))?;
        h.oracle.ban(&player.username);
    }
    h.verify_boards()?;
    h.verify_counts()?;
    
    let listed = h.service.list_runs(1, 100, "")?.len();
    let expected_listed = h.oracle.run_count(true).min(100);
    ensure(listed == expected_listed, || format!("admin listing has {} rows, expected {}", listed, expected_listed))?;
    
    if let Some(pardoned) = banned.first() {
        ensure(h.service.set_banned(pardoned.id, false)?, || "unban reported no change".to_string())?;
        h.oracle.unban(&pardoned.username);
        h.verify_boards()?;
    }
    h.verify_runs(today)?;
    h.verify_runs(yesterday)
}
