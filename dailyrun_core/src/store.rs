//! Storage boundary for seeds, runs and accounts.
//!
//! Every cross-request consistency guarantee of the engine is pushed down to
//! the primitives of this trait:
//! - **insert-if-absent** for day seeds (exactly one survives a race)
//! - **atomic read-modify-write** per run row (no lost merge, no torn write)
//! - plain snapshot reads for rankings and listings
//! - a creation-order index and running counts, so administrative reads
//!   touch one page of records instead of the whole history
//!
//! Implementations: [`MemoryRunStore`] (in-process, with fault injection) and
//! [`crate::sled_store::SledRunStore`] (persistent).

use crate::error::{RunError, RunResult};
use crate::model::{Account, DailySeed, RunRecord};
use chrono::NaiveDate;
use dailyrun_env::PlayerId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Trait for the transactional store the engine runs on.
///
/// Implementations must be thread-safe. Closures passed to the
/// read-modify-write primitives may be invoked more than once under
/// contention and must be pure functions of the record they are given.
pub trait RunStore: Send + Sync {
    /// Inserts `candidate` unless a seed already exists for its day.
    ///
    /// Returns the seed that is stored after the call: either `candidate`
    /// or the one that won an earlier (or concurrent) insert.
    fn insert_seed_if_absent(&self, candidate: DailySeed) -> RunResult<DailySeed>;
    
    /// Fetches the seed for a day.
    fn get_seed(&self, day: NaiveDate) -> RunResult<Option<DailySeed>>;
    
    /// Atomically inserts `fresh` (assigning its `seq`) when no record exists
    /// for its `(player, day)`, otherwise applies `merge` to the stored record.
    ///
    /// Returns the record as stored after the operation.
    fn upsert_run(&self, fresh: RunRecord, merge: &dyn Fn(&mut RunRecord)) -> RunResult<RunRecord>;
    
    /// Atomically applies `apply` to an existing record.
    ///
    /// Returns `None` if the record does not exist, otherwise whether `apply`
    /// reported a change.
    fn update_run(
        &self,
        player: PlayerId,
        day: NaiveDate,
        apply: &dyn Fn(&mut RunRecord) -> bool,
    ) -> RunResult<Option<bool>>;
    
    /// Fetches one record.
    fn get_run(&self, player: PlayerId, day: NaiveDate) -> RunResult<Option<RunRecord>>;
    
    /// All records for a day, in creation (`seq`) order.
    fn runs_on(&self, day: NaiveDate) -> RunResult<Vec<RunRecord>>;
    
    /// All records with `first <= day <= last`, in creation order.
    fn runs_between(&self, first: NaiveDate, last: NaiveDate) -> RunResult<Vec<RunRecord>>;
    
    /// Number of records, optionally counting soft-deleted ones.
    fn count_runs(&self, include_deleted: bool) -> RunResult<usize>;
    
    /// Up to `limit` records after the first `offset`, in creation order.
    fn runs_page(&self, offset: usize, limit: usize) -> RunResult<Vec<RunRecord>>;
    
    /// Visits records in creation order until `visit` returns `Ok(false)`.
    ///
    /// No lock is held while `visit` runs; it may call back into the store.
    fn scan_runs(&self, visit: &mut dyn FnMut(&RunRecord) -> RunResult<bool>) -> RunResult<()>;
    
    /// Inserts an account. Returns `false` if the username is already taken.
    fn insert_account(&self, account: &Account) -> RunResult<bool>;
    
    /// Fetches an account by id.
    fn get_account(&self, id: PlayerId) -> RunResult<Option<Account>>;
    
    /// Fetches an account by username (case-insensitive).
    fn find_account(&self, username: &str) -> RunResult<Option<Account>>;
    
    /// Atomically applies `apply` to an existing account.
    fn update_account(
        &self,
        id: PlayerId,
        apply: &dyn Fn(&mut Account) -> bool,
    ) -> RunResult<Option<bool>>;
}

/// Normalized username used for uniqueness and lookups.
pub(crate) fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Change in the deleted-record count when a record goes from `before` to `after`.
pub(crate) fn deleted_delta(before: bool, after: bool) -> i64 {
    i64::from(after) - i64::from(before)
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
struct Tables {
    seeds: BTreeMap<NaiveDate, DailySeed>,
    runs: HashMap<(PlayerId, NaiveDate), RunRecord>,
    order: BTreeMap<u64, (PlayerId, NaiveDate)>,
    deleted: usize,
    accounts: HashMap<PlayerId, Account>,
    usernames: HashMap<String, PlayerId>,
    next_seq: u64,
}

/// In-process store; one lock gives every operation row (and table) atomicity.
///
/// `set_unavailable(true)` makes every call fail with `StorageError`, which is
/// how tests check that failures surface instead of turning into empty pages.
#[derive(Default)]
pub struct MemoryRunStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryRunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Simulates the backing store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
    
    fn tables(&self) -> RunResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RunError::storage("store unavailable"));
        }
        self.tables
            .lock()
            .map_err(|_| RunError::storage("memory store lock poisoned"))
    }
}

fn by_seq(mut runs: Vec<RunRecord>) -> Vec<RunRecord> {
    runs.sort_by_key(|r| r.seq);
    runs
}

impl RunStore for MemoryRunStore {
    fn insert_seed_if_absent(&self, candidate: DailySeed) -> RunResult<DailySeed> {
        let mut tables = self.tables()?;
        Ok(tables.seeds.entry(candidate.day).or_insert(candidate).clone())
    }
    
    fn get_seed(&self, day: NaiveDate) -> RunResult<Option<DailySeed>> {
        Ok(self.tables()?.seeds.get(&day).cloned())
    }
    
    fn upsert_run(&self, mut fresh: RunRecord, merge: &dyn Fn(&mut RunRecord)) -> RunResult<RunRecord> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let key = (fresh.player, fresh.day);
        
        if let Some(existing) = tables.runs.get_mut(&key) {
            let was_deleted = existing.deleted;
            merge(existing);
            let delta = deleted_delta(was_deleted, existing.deleted);
            tables.deleted = tables.deleted.saturating_add_signed(delta as isize);
            return Ok(existing.clone());
        }
        
        tables.next_seq += 1;
        fresh.seq = tables.next_seq;
        tables.order.insert(fresh.seq, key);
        if fresh.deleted {
            tables.deleted += 1;
        }
        tables.runs.insert(key, fresh.clone());
        Ok(fresh)
    }
    
    fn update_run(
        &self,
        player: PlayerId,
        day: NaiveDate,
        apply: &dyn Fn(&mut RunRecord) -> bool,
    ) -> RunResult<Option<bool>> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let Some(record) = tables.runs.get_mut(&(player, day)) else {
            return Ok(None);
        };
        let was_deleted = record.deleted;
        let changed = apply(record);
        let delta = deleted_delta(was_deleted, record.deleted);
        tables.deleted = tables.deleted.saturating_add_signed(delta as isize);
        Ok(Some(changed))
    }
    
    fn get_run(&self, player: PlayerId, day: NaiveDate) -> RunResult<Option<RunRecord>> {
        Ok(self.tables()?.runs.get(&(player, day)).cloned())
    }
    
    fn runs_on(&self, day: NaiveDate) -> RunResult<Vec<RunRecord>> {
        self.runs_between(day, day)
    }
    
    fn runs_between(&self, first: NaiveDate, last: NaiveDate) -> RunResult<Vec<RunRecord>> {
        let tables = self.tables()?;
        let runs = tables
            .runs
            .values()
            .filter(|r| r.day >= first && r.day <= last)
            .cloned()
            .collect();
        Ok(by_seq(runs))
    }
    
    fn count_runs(&self, include_deleted: bool) -> RunResult<usize> {
        let tables = self.tables()?;
        if include_deleted {
            Ok(tables.runs.len())
        } else {
            Ok(tables.runs.len().saturating_sub(tables.deleted))
        }
    }
    
    fn runs_page(&self, offset: usize, limit: usize) -> RunResult<Vec<RunRecord>> {
        let tables = self.tables()?;
        Ok(tables
            .order
            .values()
            .skip(offset)
            .take(limit)
            .filter_map(|key| tables.runs.get(key).cloned())
            .collect())
    }
    
    fn scan_runs(&self, visit: &mut dyn FnMut(&RunRecord) -> RunResult<bool>) -> RunResult<()> {
        let mut after = 0u64;
        loop {
            // Lock per step, released before `visit`
            let next = {
                let tables = self.tables()?;
                tables
                    .order
                    .range(after + 1..)
                    .next()
                    .map(|(seq, key)| (*seq, tables.runs.get(key).cloned()))
            };
            let Some((seq, record)) = next else {
                return Ok(());
            };
            after = seq;
            if let Some(record) = record {
                if !visit(&record)? {
                    return Ok(());
                }
            }
        }
    }
    
    fn insert_account(&self, account: &Account) -> RunResult<bool> {
        let mut tables = self.tables()?;
        let key = username_key(&account.username);
        if tables.usernames.contains_key(&key) || tables.accounts.contains_key(&account.id) {
            return Ok(false);
        }
        tables.usernames.insert(key, account.id);
        tables.accounts.insert(account.id, account.clone());
        Ok(true)
    }
    
    fn get_account(&self, id: PlayerId) -> RunResult<Option<Account>> {
        Ok(self.tables()?.accounts.get(&id).cloned())
    }
    
    fn find_account(&self, username: &str) -> RunResult<Option<Account>> {
        let tables = self.tables()?;
        Ok(tables
            .usernames
            .get(&username_key(username))
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }
    
    fn update_account(
        &self,
        id: PlayerId,
        apply: &dyn Fn(&mut Account) -> bool,
    ) -> RunResult<Option<bool>> {
        let mut tables = self.tables()?;
        Ok(tables.accounts.get_mut(&id).map(|account| apply(account)))
    }
}
