pub mod local;

use crate::aggregate::aggregate;
use crate::errors::{AppError, AppResult, StoreResult};
use crate::models::{MeasurementEntry, MeasurementRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use self::local::merge_entry;
pub use local::{LocalCache, CACHE_KEY, PENDING_KEY};

pub const DEGRADED_NOTICE: &str = "Saved locally. You appear to be offline.";

/// Row store for flat measurement records, always scoped to one owner.
pub trait MeasurementStore: Send + Sync {
    /// Records of `owner_id`, ascending by `recorded_at`.
    fn list_records(&self, owner_id: &str) -> StoreResult<Vec<MeasurementRecord>>;
    /// Inserts one submission batch atomically.
    fn insert_records(&self, owner_id: &str, records: &[MeasurementRecord]) -> StoreResult<()>;
    /// Deletes every record of `owner_id` recorded at exactly `recorded_at`.
    fn delete_group(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<usize>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> StoreOutcome<T> {
    fn fresh(value: T) -> Self {
        Self { value, degraded: false }
    }

    fn degraded(value: T) -> Self {
        Self { value, degraded: true }
    }

    pub fn notice(&self) -> Option<&'static str> {
        self.degraded.then_some(DEGRADED_NOTICE)
    }
}

/// Primary row store backed by a per-owner local entry cache.
///
/// Reads and inserts that fail on the primary are served from the cache and
/// flagged as degraded. Inserts the primary rejected stay pending locally and
/// are pushed to the primary the next time it answers.
#[derive(Clone)]
pub struct TieredStore {
    primary: Arc<dyn MeasurementStore>,
    cache: LocalCache,
}

impl TieredStore {
    pub fn new(primary: Arc<dyn MeasurementStore>, cache: LocalCache) -> Self {
        Self { primary, cache }
    }

    pub fn list_entries(&self, owner_id: &str) -> AppResult<StoreOutcome<Vec<MeasurementEntry>>> {
        let unsynced = self.sync_pending(owner_id);
        match self.primary.list_records(owner_id) {
            Ok(records) => {
                let mut entries = aggregate(&records);
                for entry in &unsynced {
                    merge_entry(&mut entries, entry);
                }
                if let Err(error) = self.cache.replace(owner_id, &entries) {
                    tracing::warn!(owner = %owner_id, error = %error, "failed to refresh local measurement cache");
                }
                if unsynced.is_empty() {
                    Ok(StoreOutcome::fresh(entries))
                } else {
                    Ok(StoreOutcome::degraded(entries))
                }
            }
            Err(error) => {
                tracing::warn!(
                    owner = %owner_id,
                    operation = "list_records",
                    error = %error,
                    "primary store failed; reading local cache"
                );
                let entries = self.cache.load(owner_id).map_err(AppError::from)?;
                Ok(StoreOutcome::degraded(entries))
            }
        }
    }

    pub fn insert_entry(&self, owner_id: &str, entry: &MeasurementEntry) -> AppResult<StoreOutcome<()>> {
        let records = entry.to_records(owner_id);
        match self.primary.insert_records(owner_id, &records) {
            Ok(()) => {
                if let Err(error) = self.cache.append(owner_id, entry) {
                    tracing::warn!(owner = %owner_id, error = %error, "failed to append to local measurement cache");
                }
                if self.sync_pending(owner_id).is_empty() {
                    Ok(StoreOutcome::fresh(()))
                } else {
                    Ok(StoreOutcome::degraded(()))
                }
            }
            Err(error) => {
                tracing::warn!(
                    owner = %owner_id,
                    operation = "insert_records",
                    count = records.len(),
                    error = %error,
                    "primary store failed; saving locally"
                );
                self.cache.add_pending(owner_id, entry).map_err(AppError::from)?;
                Ok(StoreOutcome::degraded(()))
            }
        }
    }

    /// Removes the group on the primary and locally. A group that only ever
    /// reached the local pending set is deleted even while the primary is
    /// unreachable; anything else needs the primary.
    pub fn delete_group(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> AppResult<usize> {
        match self.primary.delete_group(owner_id, recorded_at) {
            Ok(removed) => {
                let local = self.forget_pending(owner_id, recorded_at).unwrap_or_else(|error| {
                    tracing::warn!(owner = %owner_id, error = %error, "failed to drop pending measurement group");
                    0
                });
                self.forget_cached(owner_id, recorded_at);
                Ok(removed.max(local))
            }
            Err(error) => {
                tracing::warn!(owner = %owner_id, operation = "delete_group", error = %error, "primary store delete failed");
                match self.forget_pending(owner_id, recorded_at) {
                    Ok(local) if local > 0 => {
                        self.forget_cached(owner_id, recorded_at);
                        Ok(local)
                    }
                    _ => Err(AppError::from(error)),
                }
            }
        }
    }

    fn forget_pending(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self
            .cache
            .take_pending(owner_id, recorded_at)?
            .map_or(0, |entry| entry.values.len()))
    }

    fn forget_cached(&self, owner_id: &str, recorded_at: DateTime<Utc>) {
        if let Err(error) = self.cache.remove_group(owner_id, recorded_at) {
            tracing::warn!(owner = %owner_id, error = %error, "failed to remove group from local measurement cache");
        }
    }

    /// Pushes pending entries to the primary in order, stopping at the first
    /// failure. Returns the entries still pending.
    fn sync_pending(&self, owner_id: &str) -> Vec<MeasurementEntry> {
        let pending = match self.cache.pending(owner_id) {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!(owner = %owner_id, error = %error, "failed to read pending measurements");
                return Vec::new();
            }
        };

        let mut unsynced = Vec::new();
        for entry in pending {
            if !unsynced.is_empty() {
                unsynced.push(entry);
                continue;
            }
            match self.primary.insert_records(owner_id, &entry.to_records(owner_id)) {
                Ok(()) => {
                    if let Err(error) = self.cache.take_pending(owner_id, entry.recorded_at) {
                        tracing::warn!(owner = %owner_id, error = %error, "failed to clear synced measurement");
                    }
                    if let Err(error) = self.cache.append(owner_id, &entry) {
                        tracing::warn!(owner = %owner_id, error = %error, "failed to append to local measurement cache");
                    }
                }
                Err(error) => {
                    tracing::debug!(owner = %owner_id, error = %error, "primary store still unavailable; keeping pending");
                    unsynced.push(entry);
                }
            }
        }
        if !unsynced.is_empty() {
            tracing::info!(owner = %owner_id, pending = unsynced.len(), "measurements waiting for primary store");
        }
        unsynced
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MeasurementStore;
    use crate::db::Database;
    use crate::errors::{StoreError, StoreResult};
    use crate::models::MeasurementRecord;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Primary store that is never reachable.
    pub struct OfflineStore;

    impl MeasurementStore for OfflineStore {
        fn list_records(&self, _owner_id: &str) -> StoreResult<Vec<MeasurementRecord>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn insert_records(&self, _owner_id: &str, _records: &[MeasurementRecord]) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn delete_group(&self, _owner_id: &str, _recorded_at: DateTime<Utc>) -> StoreResult<usize> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// In-memory database whose connection can be cut and restored.
    pub struct SwitchableStore {
        db: Database,
        online: AtomicBool,
    }

    impl SwitchableStore {
        pub fn new() -> Self {
            Self {
                db: Database::in_memory().expect("db"),
                online: AtomicBool::new(true),
            }
        }

        pub fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
        }
    }

    impl MeasurementStore for SwitchableStore {
        fn list_records(&self, owner_id: &str) -> StoreResult<Vec<MeasurementRecord>> {
            self.check()?;
            self.db.list_records(owner_id)
        }

        fn insert_records(&self, owner_id: &str, records: &[MeasurementRecord]) -> StoreResult<()> {
            self.check()?;
            self.db.insert_records(owner_id, records)
        }

        fn delete_group(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<usize> {
            self.check()?;
            self.db.delete_group(owner_id, recorded_at)
        }
    }
}
