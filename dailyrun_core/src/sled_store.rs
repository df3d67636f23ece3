//! Sled-based persistent store.
//!
//! Uses an embedded key-value database for durability. Layout:
//!
//! | tree          | key                         | value              |
//! |---------------|-----------------------------|--------------------|
//! | `daily_seeds` | `YYYY-MM-DD`                | `DailySeed` (json) |
//! | `daily_runs`  | `YYYY-MM-DD/` + player uuid | `RunRecord` (json) |
//! | `accounts`    | player uuid                 | `Account` (json)   |
//! | `usernames`   | lowercased username         | player uuid        |
//! | `run_order`   | `seq` (big-endian u64)      | run key            |
//! | `run_counts`  | `runs` / `deleted`          | big-endian u64     |
//!
//! Day-prefixed run keys make "runs on a day" a prefix scan and "runs in a
//! week" a single range scan. `run_order` and `run_counts` are written in the
//! same transaction as the run itself, so the administrative listing reads a
//! page without decoding the records it skips, and counts never scan.

use crate::error::{RunError, RunResult};
use crate::model::{Account, DailySeed, RunRecord};
use crate::store::{deleted_delta, username_key, RunStore};
use chrono::NaiveDate;
use dailyrun_env::{format_day, PlayerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, TransactionResult,
    TransactionalTree,
};
use sled::Transactional;
use std::path::Path;
use uuid::Uuid;

/// Persistent `RunStore` on top of sled.
pub struct SledRunStore {
    db: sled::Db,
    seeds: sled::Tree,
    runs: sled::Tree,
    accounts: sled::Tree,
    usernames: sled::Tree,
    order: sled::Tree,
    counts: sled::Tree,
    flush_every_write: bool,
}

impl SledRunStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P, flush_every_write: bool) -> RunResult<Self> {
        let db = sled::open(path)
            .map_err(|e| RunError::storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db, flush_every_write)
    }
    
    /// Create a temporary store, removed when dropped
    pub fn temporary() -> RunResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| RunError::storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db, false)
    }
    
    fn from_db(db: sled::Db, flush_every_write: bool) -> RunResult<Self> {
        Ok(Self {
            seeds: db.open_tree("daily_seeds")?,
            runs: db.open_tree("daily_runs")?,
            accounts: db.open_tree("accounts")?,
            usernames: db.open_tree("usernames")?,
            order: db.open_tree("run_order")?,
            counts: db.open_tree("run_counts")?,
            db,
            flush_every_write,
        })
    }
    
    fn flush_if_needed(&self) -> RunResult<()> {
        if self.flush_every_write {
            self.db
                .flush()
                .map_err(|e| RunError::storage(format!("Flush failed: {}", e)))?;
        }
        Ok(())
    }
}

const RUN_COUNT: &[u8] = b"runs";
const DELETED_COUNT: &[u8] = b"deleted";

fn run_key(day: NaiveDate, player: PlayerId) -> Vec<u8> {
    let mut key = day_prefix(day);
    key.extend_from_slice(player.as_bytes());
    key
}

fn day_prefix(day: NaiveDate) -> Vec<u8> {
    format!("{}/", format_day(day)).into_bytes()
}

/// Exclusive upper bound for every run key of `day` ('0' sorts right after '/').
fn day_upper_bound(day: NaiveDate) -> Vec<u8> {
    format!("{}0", format_day(day)).into_bytes()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RunResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn decode_player(bytes: &[u8]) -> RunResult<PlayerId> {
    Uuid::from_slice(bytes)
        .map(PlayerId::from_uuid)
        .map_err(|e| RunError::storage(format!("Corrupt player key: {}", e)))
}

fn collect_runs(iter: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>) -> RunResult<Vec<RunRecord>> {
    let mut runs = Vec::new();
    for result in iter {
        let (_, value) = result
            .map_err(|e| RunError::storage(format!("Iteration failed: {}", e)))?;
        runs.push(decode::<RunRecord>(&value)?);
    }
    runs.sort_by_key(|r| r.seq);
    Ok(runs)
}

fn decode_count(bytes: &[u8]) -> RunResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| RunError::storage(format!("Corrupt counter of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn abort(e: impl Into<RunError>) -> ConflictableTransactionError<RunError> {
    ConflictableTransactionError::Abort(e.into())
}

fn settle<T>(result: TransactionResult<T, RunError>) -> RunResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    })
}

fn read_count(counts: &TransactionalTree, key: &[u8]) -> ConflictableTransactionResult<u64, RunError> {
    match counts.get(key)? {
        Some(bytes) => decode_count(&bytes).map_err(abort),
        None => Ok(0),
    }
}

fn bump_count(counts: &TransactionalTree, key: &[u8], delta: i64) -> ConflictableTransactionResult<(), RunError> {
    if delta == 0 {
        return Ok(());
    }
    let next = read_count(counts, key)?.saturating_add_signed(delta);
    counts.insert(key, next.to_be_bytes().to_vec())?;
    Ok(())
}

/// Atomic read-modify-write of one json value. `None` when the key is absent.
fn modify<T: Serialize + DeserializeOwned>(
    tree: &sled::Tree,
    key: &[u8],
    apply: &dyn Fn(&mut T) -> bool,
) -> RunResult<Option<bool>> {
    let mut outcome = None;
    let mut failure: Option<RunError> = None;
    
    tree.update_and_fetch(key, |current| {
        outcome = None;
        failure = None;
        let bytes = current?;
        
        let mut value: T = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                failure = Some(e.into());
                return Some(bytes.to_vec());
            }
        };
        let changed = apply(&mut value);
        outcome = Some(changed);
        if !changed {
            return Some(bytes.to_vec());
        }
        match serde_json::to_vec(&value) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                failure = Some(e.into());
                Some(bytes.to_vec())
            }
        }
    })?;
    
    match failure {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

impl RunStore for SledRunStore {
    fn insert_seed_if_absent(&self, candidate: DailySeed) -> RunResult<DailySeed> {
        let key = format_day(candidate.day);
        let encoded = serde_json::to_vec(&candidate)?;
        
        match self.seeds.compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(encoded))? {
            Ok(()) => {
                self.flush_if_needed()?;
                Ok(candidate)
            }
            Err(conflict) => {
                let current = conflict
                    .current
                    .ok_or_else(|| RunError::storage(format!("Seed for {} lost during insert", key)))?;
                decode(&current)
            }
        }
    }
    
    fn get_seed(&self, day: NaiveDate) -> RunResult<Option<DailySeed>> {
        self.seeds
            .get(format_day(day).as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
    
    fn upsert_run(&self, fresh: RunRecord, merge: &dyn Fn(&mut RunRecord)) -> RunResult<RunRecord> {
        let key = run_key(fresh.day, fresh.player);
        // Only consumed if this call creates the record
        let seq = self.db.generate_id()?;
        let fresh = RunRecord { seq, ..fresh };
        
        let result: TransactionResult<RunRecord, RunError> =
            (&self.runs, &self.order, &self.counts).transaction(|(runs, order, counts)| {
                let Some(bytes) = runs.get(&key[..])? else {
                    runs.insert(&key[..], serde_json::to_vec(&fresh).map_err(abort)?)?;
                    order.insert(&seq.to_be_bytes()[..], &key[..])?;
                    bump_count(counts, RUN_COUNT, 1)?;
                    bump_count(counts, DELETED_COUNT, i64::from(fresh.deleted))?;
                    return Ok(fresh.clone());
                };
                
                let mut record: RunRecord = serde_json::from_slice(&bytes).map_err(abort)?;
                let was_deleted = record.deleted;
                merge(&mut record);
                runs.insert(&key[..], serde_json::to_vec(&record).map_err(abort)?)?;
                bump_count(counts, DELETED_COUNT, deleted_delta(was_deleted, record.deleted))?;
                Ok(record)
            });
        
        let stored = settle(result)?;
        self.flush_if_needed()?;
        Ok(stored)
    }
    
    fn update_run(
        &self,
        player: PlayerId,
        day: NaiveDate,
        apply: &dyn Fn(&mut RunRecord) -> bool,
    ) -> RunResult<Option<bool>> {
        let key = run_key(day, player);
        let result: TransactionResult<Option<bool>, RunError> =
            (&self.runs, &self.counts).transaction(|(runs, counts)| {
                let Some(bytes) = runs.get(&key[..])? else {
                    return Ok(None);
                };
                let mut record: RunRecord = serde_json::from_slice(&bytes).map_err(abort)?;
                let was_deleted = record.deleted;
                if !apply(&mut record) {
                    return Ok(Some(false));
                }
                runs.insert(&key[..], serde_json::to_vec(&record).map_err(abort)?)?;
                bump_count(counts, DELETED_COUNT, deleted_delta(was_deleted, record.deleted))?;
                Ok(Some(true))
            });
        
        let outcome = settle(result)?;
        if outcome == Some(true) {
            self.flush_if_needed()?;
        }
        Ok(outcome)
    }
    
    fn get_run(&self, player: PlayerId, day: NaiveDate) -> RunResult<Option<RunRecord>> {
        self.runs
            .get(run_key(day, player))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
    
    fn runs_on(&self, day: NaiveDate) -> RunResult<Vec<RunRecord>> {
        collect_runs(self.runs.scan_prefix(day_prefix(day)))
    }
    
    fn runs_between(&self, first: NaiveDate, last: NaiveDate) -> RunResult<Vec<RunRecord>> {
        if first > last {
            return Ok(Vec::new());
        }
        collect_runs(self.runs.range(day_prefix(first)..day_upper_bound(last)))
    }
    
    fn count_runs(&self, include_deleted: bool) -> RunResult<usize> {
        // One snapshot of both counters
        let result: TransactionResult<u64, RunError> = self.counts.transaction(|counts| {
            let total = read_count(counts, RUN_COUNT)?;
            let deleted = if include_deleted { 0 } else { read_count(counts, DELETED_COUNT)? };
            Ok(total.saturating_sub(deleted))
        });
        Ok(usize::try_from(settle(result)?).unwrap_or(usize::MAX))
    }
    
    fn runs_page(&self, offset: usize, limit: usize) -> RunResult<Vec<RunRecord>> {
        let mut page = Vec::with_capacity(limit.min(128));
        for entry in self.order.iter().skip(offset).take(limit) {
            let (_, key) = entry?;
            if let Some(bytes) = self.runs.get(&key)? {
                page.push(decode(&bytes)?);
            }
        }
        Ok(page)
    }
    
    fn scan_runs(&self, visit: &mut dyn FnMut(&RunRecord) -> RunResult<bool>) -> RunResult<()> {
        for entry in self.order.iter() {
            let (_, key) = entry?;
            let Some(bytes) = self.runs.get(&key)? else {
                continue;
            };
            if !visit(&decode(&bytes)?)? {
                break;
            }
        }
        Ok(())
    }
    
    fn insert_account(&self, account: &Account) -> RunResult<bool> {
        let name_key = username_key(&account.username);
        let id_key = account.id.as_bytes().to_vec();
        let encoded = serde_json::to_vec(account)?;
        
        let result: TransactionResult<bool, ()> =
            (&self.usernames, &self.accounts).transaction(|(names, accounts)| {
                if names.get(name_key.as_bytes())?.is_some() || accounts.get(&id_key[..])?.is_some() {
                    return Ok(false);
                }
                names.insert(name_key.as_bytes(), id_key.clone())?;
                accounts.insert(&id_key[..], encoded.clone())?;
                Ok(true)
            });
        
        let inserted = result
            .map_err(|e| RunError::storage(format!("Account transaction failed: {:?}", e)))?;
        if inserted {
            self.flush_if_needed()?;
        }
        Ok(inserted)
    }
    
    fn get_account(&self, id: PlayerId) -> RunResult<Option<Account>> {
        self.accounts
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
    
    fn find_account(&self, username: &str) -> RunResult<Option<Account>> {
        match self.usernames.get(username_key(username).as_bytes())? {
            Some(id_bytes) => self.get_account(decode_player(&id_bytes)?),
            None => Ok(None),
        }
    }
    
    fn update_account(
        &self,
        id: PlayerId,
        apply: &dyn Fn(&mut Account) -> bool,
    ) -> RunResult<Option<bool>> {
        let outcome = modify(&self.accounts, id.as_bytes(), apply)?;
        if outcome == Some(true) {
            self.flush_if_needed()?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use chrono::Utc;
    use std::sync::Arc;
    
    #[test]
    fn test_sled_seed_insert_if_absent() {
        conformance::seed_insert_if_absent(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_sled_concurrent_seed_race() {
        conformance::concurrent_seed_race(Arc::new(SledRunStore::temporary().unwrap()));
    }
    
    #[test]
    fn test_sled_upsert() {
        conformance::upsert_assigns_seq_and_merges(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_sled_update() {
        conformance::update_missing_and_present(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_sled_range_reads() {
        conformance::range_reads(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_sled_counts_and_pages() {
        conformance::counts_and_pages(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_sled_accounts() {
        conformance::accounts_unique_case_insensitive(&SledRunStore::temporary().unwrap());
    }
    
    #[test]
    fn test_day_bounds_do_not_leak_into_neighbours() {
        let store = SledRunStore::temporary().unwrap();
        let now = Utc::now();
        let d9 = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let d10 = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let d11 = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        
        for (i, day) in [d9, d10, d11].into_iter().enumerate() {
            store
                .upsert_run(RunRecord::new(PlayerId::from_seed(i as u64), day, 1, 1, now), &|_| {})
                .unwrap();
        }
        
        assert_eq!(store.runs_on(d10).unwrap().len(), 1);
        assert_eq!(store.runs_between(d10, d11).unwrap().len(), 2);
        assert!(store.runs_between(d11, d9).unwrap().is_empty());
    }
    
    #[test]
    fn test_corrupt_record_is_storage_error() {
        let store = SledRunStore::temporary().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let player = PlayerId::from_seed(1);
        store.runs.insert(run_key(day, player), b"not json".to_vec()).unwrap();
        
        assert!(matches!(store.get_run(player, day), Err(RunError::StorageError(_))));
        assert!(matches!(store.update_run(player, day, &|_| true), Err(RunError::StorageError(_))));
        assert!(matches!(store.runs_on(day), Err(RunError::StorageError(_))));
    }
    
    #[test]
    fn test_corrupt_counter_is_storage_error() {
        let store = SledRunStore::temporary().unwrap();
        store.counts.insert(RUN_COUNT, b"x".to_vec()).unwrap();
        
        assert!(matches!(store.count_runs(true), Err(RunError::StorageError(_))));
    }
    
    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let player = PlayerId::from_seed(5);
        
        {
            let store = SledRunStore::open(dir.path(), true).unwrap();
            store.insert_seed_if_absent(DailySeed { day, seed: "abc123".into() }).unwrap();
            store.insert_account(&Account::new(player, "persistent")).unwrap();
            store
                .upsert_run(RunRecord::new(player, day, 100, 5, Utc::now()), &|_| {})
                .unwrap();
        }
        
        let reopened = SledRunStore::open(dir.path(), true).unwrap();
        assert_eq!(reopened.get_seed(day).unwrap().unwrap().seed, "abc123");
        assert_eq!(reopened.find_account("PERSISTENT").unwrap().unwrap().id, player);
        let run = reopened.get_run(player, day).unwrap().unwrap();
        assert_eq!((run.score, run.wave), (100, 5));
        assert_eq!(reopened.count_runs(false).unwrap(), 1);
        assert_eq!(reopened.runs_page(0, 10).unwrap(), vec![run]);
    }
}
