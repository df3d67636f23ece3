//! Ranking Engine - daily and weekly leaderboards.
//!
//! Both categories are [`RankingStrategy`] implementations producing the
//! full ordered standings as a common [`RankingRow`] shape; the engine
//! applies one pagination contract on top:
//!
//! ```text
//! page p (1-indexed, p <= 0 treated as 1)  ->  rows [(p-1)*10, p*10)
//! page count                               ->  ceil(rows / 10)
//! ```
//!
//! Counting the same standings that are paged keeps the page count and
//! the pages in agreement on which records are excluded (deleted runs,
//! banned players).

use crate::error::RunResult;
use crate::model::{Account, Category, RankingRow, RunRecord};
use crate::store::RunStore;
use chrono::{DateTime, NaiveDate, Utc};
use dailyrun_env::{format_day, week_start, PlayerId, RunContext};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fixed leaderboard page size.
pub const RANKING_PAGE_SIZE: usize = 10;

/// Offset of a 1-indexed page; pages `<= 0` map to the first page.
pub fn page_offset(page: i64, page_size: usize) -> usize {
    let index = usize::try_from(page.max(1) - 1).unwrap_or(usize::MAX);
    index.saturating_mul(page_size)
}

/// Number of leaderboard pages needed for `rows` rows.
pub fn page_count(rows: usize) -> usize {
    rows.div_ceil(RANKING_PAGE_SIZE)
}

/// Account lookups for one read, fetched on first use and cached.
///
/// Only players that actually appear in the rows being built are looked up.
pub struct Roster<'a> {
    store: &'a dyn RunStore,
    accounts: HashMap<PlayerId, Option<Account>>,
}

impl<'a> Roster<'a> {
    /// Creates an empty roster over `store`.
    pub fn new(store: &'a dyn RunStore) -> Self {
        Self {
            store,
            accounts: HashMap::new(),
        }
    }
    
    /// The account of `player`, if registered.
    pub fn account(&mut self, player: PlayerId) -> RunResult<Option<&Account>> {
        if !self.accounts.contains_key(&player) {
            let account = self.store.get_account(player)?;
            self.accounts.insert(player, account);
        }
        Ok(self.accounts.get(&player).and_then(Option::as_ref))
    }
    
    /// Display name of a player allowed on leaderboards (registered, not banned).
    pub fn ranked_name(&mut self, player: PlayerId) -> RunResult<Option<String>> {
        Ok(self
            .account(player)?
            .filter(|a| !a.banned)
            .map(|a| a.username.clone()))
    }
    
    /// Number of distinct players looked up so far.
    pub fn lookups(&self) -> usize {
        self.accounts.len()
    }
}

/// One way of ordering runs into a leaderboard.
pub trait RankingStrategy: Send + Sync {
    /// Category this strategy serves.
    fn category(&self) -> Category;
    
    /// Full ordered standings as of `today`.
    fn standings(&self, store: &dyn RunStore, today: NaiveDate, roster: &mut Roster<'_>) -> RunResult<Vec<RankingRow>>;
}

/// Category 0: today's active runs in natural insertion order.
pub struct DailyRanking;

impl RankingStrategy for DailyRanking {
    fn category(&self) -> Category {
        Category::Daily
    }
    
    fn standings(&self, store: &dyn RunStore, today: NaiveDate, roster: &mut Roster<'_>) -> RunResult<Vec<RankingRow>> {
        let mut rows = Vec::new();
        for record in store.runs_on(today)?.into_iter().filter(RunRecord::is_active) {
            let Some(username) = roster.ranked_name(record.player)? else {
                continue;
            };
            rows.push(RankingRow {
                rank: None,
                player: record.player,
                username,
                score: record.score,
                wave: record.wave,
            });
        }
        Ok(rows)
    }
}

/// Category 1: per-player score sums since the start of the week.
///
/// `RANK()` semantics over `(sum DESC, latest best-score time ASC)`: rows
/// equal on both share a rank and the next distinct row skips ahead. Within
/// a tie, rows are listed by username (then player id) so repeated page
/// reads are stable.
pub struct WeeklyRanking;

struct WeeklyTally {
    player: PlayerId,
    username: String,
    total: i64,
    latest: DateTime<Utc>,
}

#[derive(Clone, Copy)]
struct WeeklySum {
    total: i64,
    latest: DateTime<Utc>,
}

impl RankingStrategy for WeeklyRanking {
    fn category(&self) -> Category {
        Category::Weekly
    }
    
    fn standings(&self, store: &dyn RunStore, today: NaiveDate, roster: &mut Roster<'_>) -> RunResult<Vec<RankingRow>> {
        let mut sums: HashMap<PlayerId, WeeklySum> = HashMap::new();
        for record in store.runs_between(week_start(today), today)? {
            if !record.is_active() {
                continue;
            }
            let sum = sums.entry(record.player).or_insert(WeeklySum {
                total: 0,
                latest: record.last_updated,
            });
            sum.total = sum.total.saturating_add(record.score);
            sum.latest = sum.latest.max(record.last_updated);
        }
        
        // Names only for players with an active run this week
        let mut ordered = Vec::with_capacity(sums.len());
        for (player, sum) in sums {
            if let Some(username) = roster.ranked_name(player)? {
                ordered.push(WeeklyTally {
                    player,
                    username,
                    total: sum.total,
                    latest: sum.latest,
                });
            }
        }
        
        ordered.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then(a.latest.cmp(&b.latest))
                .then_with(|| a.username.cmp(&b.username))
                .then(a.player.cmp(&b.player))
        });
        
        let mut rows = Vec::with_capacity(ordered.len());
        let mut rank = 0u32;
        let mut previous = None;
        for (position, tally) in ordered.into_iter().enumerate() {
            let key = (tally.total, tally.latest);
            if previous != Some(key) {
                rank = u32::try_from(position + 1).unwrap_or(u32::MAX);
                previous = Some(key);
            }
            rows.push(RankingRow {
                rank: Some(rank),
                player: tally.player,
                username: tally.username,
                score: tally.total,
                wave: 0,
            });
        }
        Ok(rows)
    }
}

/// Serves paginated leaderboards for both categories.
pub struct RankingEngine<Ctx: RunContext> {
    store: Arc<dyn RunStore>,
    context: Arc<Ctx>,
    daily: DailyRanking,
    weekly: WeeklyRanking,
}

impl<Ctx: RunContext> RankingEngine<Ctx> {
    /// Creates the engine.
    pub fn new(store: Arc<dyn RunStore>, context: Arc<Ctx>) -> Self {
        Self {
            store,
            context,
            daily: DailyRanking,
            weekly: WeeklyRanking,
        }
    }
    
    fn strategy(&self, category: Category) -> &dyn RankingStrategy {
        match category {
            Category::Daily => &self.daily,
            Category::Weekly => &self.weekly,
        }
    }
    
    fn standings(&self, category: Category) -> RunResult<Vec<RankingRow>> {
        let today = self.context.today();
        let mut roster = Roster::new(self.store.as_ref());
        let strategy = self.strategy(category);
        debug_assert_eq!(strategy.category(), category);
        strategy.standings(self.store.as_ref(), today, &mut roster)
    }
    
    /// One page of the leaderboard for `category`.
    pub fn get_rankings(&self, category: Category, page: i64) -> RunResult<Vec<RankingRow>> {
        let offset = page_offset(page, RANKING_PAGE_SIZE);
        let rows: Vec<RankingRow> = self
            .standings(category)?
            .into_iter()
            .skip(offset)
            .take(RANKING_PAGE_SIZE)
            .collect();
        
        debug!(
            "Rankings {} page {} ({}): {} rows",
            category,
            page,
            format_day(self.context.today()),
            rows.len()
        );
        Ok(rows)
    }
    
    /// Number of pages for `category`.
    pub fn get_page_count(&self, category: Category) -> RunResult<usize> {
        Ok(page_count(self.standings(category)?.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::testing::{day, memory_service};
    use chrono::{Duration, TimeZone};
    use dailyrun_env::ActorId;
    use proptest::prelude::*;
    
    #[test]
    fn test_page_count_formula() {
        assert_eq!(page_count(25), 3);
        assert_eq!(page_count(20), 2);
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
    }
    
    #[test]
    fn test_page_offset_floors_at_first_page() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(-7, 10), 0);
        assert_eq!(page_offset(2, 50), 50);
    }
    
    #[test]
    fn test_daily_example_scenario() {
        let (service, _, _) = memory_service();
        let p1 = service.register_player("P1").unwrap();
        
        service.submit_today(p1, 100, 5).unwrap();
        service.submit_today(p1, 90, 8).unwrap();
        
        let page = service.get_rankings(Category::Daily, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].username, "P1");
        assert_eq!((page[0].score, page[0].wave), (100, 8));
        assert_eq!(page[0].rank, None);
    }
    
    #[test]
    fn test_daily_pages_follow_insertion_order() {
        let (service, _, _) = memory_service();
        let mut players = Vec::new();
        for i in 0..25 {
            let p = service.register_player(&format!("player{:02}", i)).unwrap();
            // Scores deliberately not monotonic in insertion order
            service.submit_today(p, (i * 37) % 11, 1).unwrap();
            players.push(p);
        }
        
        assert_eq!(service.get_page_count(Category::Daily).unwrap(), 3);
        
        let first = service.get_rankings(Category::Daily, 1).unwrap();
        let third = service.get_rankings(Category::Daily, 3).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(third.len(), 5);
        assert_eq!(first.iter().map(|r| r.player).collect::<Vec<_>>(), players[..10].to_vec());
        assert_eq!(third.iter().map(|r| r.player).collect::<Vec<_>>(), players[20..].to_vec());
        
        assert_eq!(service.get_rankings(Category::Daily, 0).unwrap(), first);
        assert!(service.get_rankings(Category::Daily, 4).unwrap().is_empty());
    }
    
    #[test]
    fn test_daily_only_covers_today() {
        let (service, ctx, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        service.submit_today(p, 10, 1).unwrap();
        ctx.advance(Duration::days(1));
        
        assert!(service.get_rankings(Category::Daily, 1).unwrap().is_empty());
        assert_eq!(service.get_page_count(Category::Daily).unwrap(), 0);
    }
    
    #[test]
    fn test_weekly_sums_within_window() {
        let (service, _, _) = memory_service();
        let a = service.register_player("alice").unwrap();
        let b = service.register_player("bob").unwrap();
        
        // Today is Wednesday 2024-01-10; the week began Sunday 2024-01-07
        service.submit(a, day(2024, 1, 6), 1_000, 9).unwrap(); // previous week
        service.submit(a, day(2024, 1, 7), 40, 2).unwrap();
        service.submit(a, day(2024, 1, 10), 30, 3).unwrap();
        service.submit(b, day(2024, 1, 9), 50, 4).unwrap();
        
        let rows = service.get_rankings(Category::Weekly, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].username.as_str(), rows[0].score, rows[0].rank), ("alice", 70, Some(1)));
        assert_eq!((rows[1].username.as_str(), rows[1].score, rows[1].rank), ("bob", 50, Some(2)));
        assert!(rows.iter().all(|r| r.wave == 0));
        assert_eq!(service.get_page_count(Category::Weekly).unwrap(), 1);
    }
    
    #[test]
    fn test_weekly_tie_break_and_shared_rank() {
        let (service, ctx, _) = memory_service();
        let early = service.register_player("early").unwrap();
        let late = service.register_player("late").unwrap();
        let twin_b = service.register_player("twin_b").unwrap();
        let twin_a = service.register_player("twin_a").unwrap();
        let top = service.register_player("top").unwrap();
        
        service.submit_today(early, 100, 1).unwrap();
        ctx.advance(Duration::minutes(1));
        service.submit_today(late, 100, 1).unwrap();
        ctx.advance(Duration::minutes(1));
        // Same sum, same timestamp: tied rank
        service.submit_today(twin_b, 60, 1).unwrap();
        service.submit_today(twin_a, 60, 1).unwrap();
        service.submit_today(top, 500, 1).unwrap();
        
        let rows = service.get_rankings(Category::Weekly, 1).unwrap();
        let summary: Vec<(&str, Option<u32>)> =
            rows.iter().map(|r| (r.username.as_str(), r.rank)).collect();
        assert_eq!(
            summary,
            vec![
                ("top", Some(1)),
                ("early", Some(2)),
                ("late", Some(3)),
                ("twin_a", Some(4)),
                ("twin_b", Some(4)),
            ]
        );
    }
    
    #[test]
    fn test_weekly_uses_latest_best_time_across_days() {
        let (service, ctx, _) = memory_service();
        let a = service.register_player("a").unwrap();
        let b = service.register_player("b").unwrap();
        
        // a finishes its week total first, b later, same total
        service.submit(a, day(2024, 1, 8), 30, 1).unwrap();
        service.submit(b, day(2024, 1, 8), 10, 1).unwrap();
        ctx.advance(Duration::minutes(1));
        service.submit(a, day(2024, 1, 9), 10, 1).unwrap();
        ctx.advance(Duration::minutes(1));
        service.submit(b, day(2024, 1, 9), 30, 1).unwrap();
        
        let rows = service.get_rankings(Category::Weekly, 1).unwrap();
        assert_eq!(rows[0].player, a);
        assert_eq!(rows[1].player, b);
        assert_eq!((rows[0].rank, rows[1].rank), (Some(1), Some(2)));
    }
    
    #[test]
    fn test_week_window_resets_on_sunday() {
        let (service, ctx, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        service.submit_today(p, 10, 1).unwrap();
        // Wednesday -> Sunday
        ctx.advance(Duration::days(4));
        
        assert!(service.get_rankings(Category::Weekly, 1).unwrap().is_empty());
        service.submit_today(p, 7, 1).unwrap();
        assert_eq!(service.get_rankings(Category::Weekly, 1).unwrap()[0].score, 7);
    }
    
    #[test]
    fn test_week_boundary_is_sunday_midnight() {
        let (service, ctx, _) = memory_service();
        let p = service.register_player("p").unwrap();
        
        ctx.set(Utc.with_ymd_and_hms(2024, 1, 13, 23, 59, 59).unwrap());
        service.submit_today(p, 10, 1).unwrap();
        assert_eq!(service.get_rankings(Category::Weekly, 1).unwrap()[0].score, 10);
        
        ctx.set(Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap());
        assert!(service.get_rankings(Category::Weekly, 1).unwrap().is_empty());
        assert_eq!(service.get_page_count(Category::Weekly).unwrap(), 0);
    }
    
    #[test]
    fn test_tie_across_page_boundary_shares_rank() {
        let (service, _, _) = memory_service();
        // Registered in reverse so username order differs from insertion order
        for i in (0..15).rev() {
            let p = service.register_player(&format!("tie{:02}", i)).unwrap();
            service.submit_today(p, 100, 1).unwrap();
        }
        
        let first = service.get_rankings(Category::Weekly, 1).unwrap();
        let second = service.get_rankings(Category::Weekly, 2).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 5);
        assert_eq!(service.get_page_count(Category::Weekly).unwrap(), 2);
        
        let rows: Vec<&RankingRow> = first.iter().chain(second.iter()).collect();
        assert!(rows.iter().all(|r| r.rank == Some(1)));
        let names: Vec<&str> = rows.iter().map(|r| r.username.as_str()).collect();
        let expected: Vec<String> = (0..15).map(|i| format!("tie{:02}", i)).collect();
        assert_eq!(names, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
    
    #[test]
    fn test_names_resolved_only_for_ranked_runs() {
        let (service, _, store) = memory_service();
        let today = day(2024, 1, 10);
        let shown = service.register_player("shown").unwrap();
        let hidden = service.register_player("hidden").unwrap();
        for i in 0..20 {
            service.register_player(&format!("idle{}", i)).unwrap();
        }
        service.submit(shown, today, 5, 1).unwrap();
        service.submit(hidden, today, 9, 1).unwrap();
        service.soft_delete(hidden, today, &ActorId::new("mod")).unwrap();
        
        for strategy in [&DailyRanking as &dyn RankingStrategy, &WeeklyRanking] {
            let mut roster = Roster::new(store.as_ref());
            let rows = strategy.standings(store.as_ref(), today, &mut roster).unwrap();
            assert_eq!(rows.iter().map(|r| r.player).collect::<Vec<_>>(), vec![shown]);
            assert_eq!(roster.lookups(), 1, "{}", strategy.category());
        }
    }
    
    #[test]
    fn test_deleted_runs_never_ranked_or_counted() {
        let (service, _, _) = memory_service();
        let keep = service.register_player("keep").unwrap();
        let cheat = service.register_player("cheat").unwrap();
        let today = day(2024, 1, 10);
        
        service.submit(keep, today, 10, 1).unwrap();
        service.submit(cheat, today, 9_999, 99).unwrap();
        service.soft_delete(cheat, today, &ActorId::new("mod")).unwrap();
        
        for category in [Category::Daily, Category::Weekly] {
            let rows = service.get_rankings(category, 1).unwrap();
            assert_eq!(rows.len(), 1, "{}", category);
            assert_eq!(rows[0].player, keep);
            assert_eq!(service.get_page_count(category).unwrap(), 1);
        }
    }
    
    #[test]
    fn test_banned_players_excluded() {
        let (service, _, _) = memory_service();
        let ok = service.register_player("ok").unwrap();
        let banned = service.register_player("banned").unwrap();
        service.submit_today(ok, 1, 1).unwrap();
        service.submit_today(banned, 2, 2).unwrap();
        
        assert!(service.set_banned(banned, true).unwrap());
        
        for category in [Category::Daily, Category::Weekly] {
            let rows = service.get_rankings(category, 1).unwrap();
            assert_eq!(rows.iter().map(|r| r.player).collect::<Vec<_>>(), vec![ok]);
        }
        assert_eq!(service.total_run_count(false).unwrap(), 2);
    }
    
    #[test]
    fn test_storage_failure_is_not_an_empty_board() {
        let (service, _, store) = memory_service();
        let p = service.register_player("p").unwrap();
        service.submit_today(p, 1, 1).unwrap();
        
        store.set_unavailable(true);
        assert!(matches!(service.get_rankings(Category::Daily, 1), Err(RunError::StorageError(_))));
        assert!(matches!(service.get_page_count(Category::Weekly), Err(RunError::StorageError(_))));
    }
    
    proptest! {
        #[test]
        fn prop_page_count_covers_rows(rows in 0usize..10_000) {
            let pages = page_count(rows);
            prop_assert!(pages * RANKING_PAGE_SIZE >= rows);
            prop_assert!(pages == 0 || (pages - 1) * RANKING_PAGE_SIZE < rows);
        }
    }
}
