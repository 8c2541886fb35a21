use crate::errors::StoreResult;
use crate::kv::KeyValueStore;
use crate::models::MeasurementEntry;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const CACHE_KEY: &str = "fitness-measurements";
pub const PENDING_KEY: &str = "fitness-measurements-pending";

fn owner_key(prefix: &str, owner_id: &str) -> String {
    format!("{prefix}:{owner_id}")
}

/// Adds an entry, merging into an existing one with the same instant.
pub(crate) fn merge_entry(entries: &mut Vec<MeasurementEntry>, entry: &MeasurementEntry) {
    match entries
        .iter_mut()
        .find(|existing| existing.recorded_at == entry.recorded_at)
    {
        Some(existing) => existing
            .values
            .extend(entry.values.iter().map(|(kind, value)| (kind.clone(), *value))),
        None => {
            entries.push(entry.clone());
            entries.sort_by_key(|entry| entry.recorded_at);
        }
    }
}

/// Entry-shaped copy of each owner's measurement history, kept in local
/// key-value storage under `fitness-measurements:<owner>`.
///
/// Entries saved while the primary store was unreachable also sit in a
/// pending set (`fitness-measurements-pending:<owner>`) until they are synced.
#[derive(Clone)]
pub struct LocalCache {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn read(&self, key: &str) -> StoreResult<Vec<MeasurementEntry>> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<MeasurementEntry> = serde_json::from_str(&raw)?;
        entries.sort_by_key(|entry| entry.recorded_at);
        Ok(entries)
    }

    fn write(&self, key: &str, entries: &[MeasurementEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return self.kv.remove(key);
        }
        self.kv.set(key, &serde_json::to_string(entries)?)
    }

    /// Cached history of `owner_id`, pending entries included.
    pub fn load(&self, owner_id: &str) -> StoreResult<Vec<MeasurementEntry>> {
        let mut entries = self.read(&owner_key(CACHE_KEY, owner_id))?;
        for entry in self.pending(owner_id)? {
            merge_entry(&mut entries, &entry);
        }
        Ok(entries)
    }

    pub fn replace(&self, owner_id: &str, entries: &[MeasurementEntry]) -> StoreResult<()> {
        self.write(&owner_key(CACHE_KEY, owner_id), entries)
    }

    pub fn append(&self, owner_id: &str, entry: &MeasurementEntry) -> StoreResult<()> {
        let key = owner_key(CACHE_KEY, owner_id);
        let mut entries = self.read(&key)?;
        merge_entry(&mut entries, entry);
        self.write(&key, &entries)
    }

    pub fn remove_group(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<bool> {
        let key = owner_key(CACHE_KEY, owner_id);
        let mut entries = self.read(&key)?;
        let before = entries.len();
        entries.retain(|entry| entry.recorded_at != recorded_at);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&key, &entries)?;
        Ok(true)
    }

    /// Entries the primary store has not accepted yet, oldest first.
    pub fn pending(&self, owner_id: &str) -> StoreResult<Vec<MeasurementEntry>> {
        self.read(&owner_key(PENDING_KEY, owner_id))
    }

    pub fn add_pending(&self, owner_id: &str, entry: &MeasurementEntry) -> StoreResult<()> {
        let key = owner_key(PENDING_KEY, owner_id);
        let mut entries = self.read(&key)?;
        merge_entry(&mut entries, entry);
        self.write(&key, &entries)
    }

    /// Drops the pending entry recorded at `recorded_at`, returning it.
    pub fn take_pending(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<Option<MeasurementEntry>> {
        let key = owner_key(PENDING_KEY, owner_id);
        let mut entries = self.read(&key)?;
        let Some(index) = entries.iter().position(|entry| entry.recorded_at == recorded_at) else {
            return Ok(None);
        };
        let taken = entries.remove(index);
        self.write(&key, &entries)?;
        Ok(Some(taken))
    }
}
