use crate::models::{MeasurementEntry, MeasurementRecord};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Groups flat records into entries keyed by their exact `recorded_at`.
///
/// Records sharing an instant collapse into one entry. If two records in a
/// group carry the same kind, the later one in input order wins. The result
/// is strictly ascending by timestamp and every entry gets a fresh id.
pub fn aggregate<'a, I>(records: I) -> Vec<MeasurementEntry>
where
    I: IntoIterator<Item = &'a MeasurementRecord>,
{
    let mut groups: BTreeMap<DateTime<Utc>, BTreeMap<String, f64>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.recorded_at)
            .or_default()
            .insert(record.kind.clone(), record.value);
    }

    groups
        .into_iter()
        .map(|(recorded_at, values)| MeasurementEntry::new(recorded_at, values))
        .collect()
}

pub fn distinct_kinds(entries: &[MeasurementEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.values.keys().cloned())
        .collect()
}
