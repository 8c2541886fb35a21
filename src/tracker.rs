use crate::aggregate::distinct_kinds;
use crate::chart::{chart_series, KindSelection};
use crate::errors::{AppError, AppResult};
use crate::models::{timestamp_key, timestamp_now, Dashboard, MeasurementEntry, SubmitResponse};
use crate::session::SessionManager;
use crate::store::{StoreOutcome, TieredStore};
use crate::submission::parse_submission;
use crate::trend::latest_cards;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Measurement operations for signed-in users.
#[derive(Clone)]
pub struct TrackerCore {
    store: TieredStore,
    sessions: SessionManager,
}

impl TrackerCore {
    pub fn new(store: TieredStore, sessions: SessionManager) -> Self {
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Validates raw form fields and records them under one timestamp.
    /// Rejected submissions never reach the store.
    pub async fn submit_measurements(
        &self,
        token: &str,
        fields: &BTreeMap<String, String>,
    ) -> AppResult<SubmitResponse> {
        let owner_id = self.sessions.owner_for(token).await?;
        let values = parse_submission(fields)?;
        let entry = MeasurementEntry::new(timestamp_now(), values);

        let outcome = self.store.insert_entry(&owner_id, &entry)?;
        tracing::info!(
            owner = %owner_id,
            kinds = entry.values.len(),
            degraded = outcome.degraded,
            "recorded measurements"
        );

        Ok(SubmitResponse {
            entry,
            degraded: outcome.degraded,
            notice: outcome.notice().map(ToString::to_string),
        })
    }

    /// Submits and makes the newly recorded kinds visible in `selection`.
    pub async fn submit_into_selection(
        &self,
        token: &str,
        fields: &BTreeMap<String, String>,
        selection: &mut KindSelection,
    ) -> AppResult<SubmitResponse> {
        let response = self.submit_measurements(token, fields).await?;
        selection.include(response.entry.values.keys());
        Ok(response)
    }

    pub async fn list_entries(&self, token: &str) -> AppResult<StoreOutcome<Vec<MeasurementEntry>>> {
        let owner_id = self.sessions.owner_for(token).await?;
        self.store.list_entries(&owner_id)
    }

    /// Cards, filter set and chart series. Without a selection every kind is
    /// charted.
    pub async fn dashboard(&self, token: &str, selection: Option<&KindSelection>) -> AppResult<Dashboard> {
        let outcome = self.list_entries(token).await?;
        let entries = &outcome.value;
        let default_selection;
        let selection = match selection {
            Some(selection) => selection,
            None => {
                default_selection = KindSelection::all(entries);
                &default_selection
            }
        };

        Ok(Dashboard {
            cards: latest_cards(entries),
            available_kinds: distinct_kinds(entries).into_iter().collect(),
            series: chart_series(entries, selection),
            entry_count: entries.len(),
            degraded: outcome.degraded,
            notice: outcome.notice().map(ToString::to_string),
        })
    }

    /// Deletes every kind recorded at `recorded_at`.
    pub async fn delete_entry(&self, token: &str, recorded_at: DateTime<Utc>) -> AppResult<usize> {
        let owner_id = self.sessions.owner_for(token).await?;
        let removed = self.store.delete_group(&owner_id, recorded_at)?;
        if removed == 0 {
            return Err(AppError::NotFound(format!(
                "no measurements recorded at {}",
                timestamp_key(&recorded_at)
            )));
        }
        tracing::info!(owner = %owner_id, removed, "deleted measurement entry");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::TrackerCore;
    use crate::chart::KindSelection;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::kv::MemoryKeyValueStore;
    use crate::session::SessionManager;
    use crate::store::testing::{OfflineStore, SwitchableStore};
    use crate::store::{LocalCache, MeasurementStore, TieredStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(kind, raw)| (kind.to_string(), raw.to_string()))
            .collect()
    }

    fn core_with(primary: Arc<dyn MeasurementStore>) -> TrackerCore {
        let cache = LocalCache::new(Arc::new(MemoryKeyValueStore::new()));
        TrackerCore::new(TieredStore::new(primary, cache), SessionManager::new())
    }

    #[tokio::test]
    async fn rejected_submission_does_not_touch_store() {
        let db = Arc::new(Database::in_memory().expect("db"));
        let core = core_with(db.clone());
        let session = core.sessions().sign_in("user-1").await.expect("sign in");

        for raw in ["-5", "abc"] {
            let err = core
                .submit_measurements(&session.token, &fields(&[("chest", raw)]))
                .await
                .expect_err("rejected");
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(db.list_records("user-1").expect("records").is_empty());
        assert_eq!(core.dashboard(&session.token, None).await.expect("dashboard").entry_count, 0);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let core = core_with(Arc::new(Database::in_memory().expect("db")));
        let err = core.list_entries("nope").await.expect_err("unauthorized");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn submit_then_dashboard_and_delete() {
        let core = core_with(Arc::new(Database::in_memory().expect("db")));
        let session = core.sessions().sign_in("user-1").await.expect("sign in");

        let first = core
            .submit_measurements(&session.token, &fields(&[("chest", "100"), ("weight", "80.5")]))
            .await
            .expect("first");
        assert!(!first.degraded);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        core.submit_measurements(&session.token, &fields(&[("chest", "101.5")]))
            .await
            .expect("second");

        let dashboard = core.dashboard(&session.token, None).await.expect("dashboard");
        assert_eq!(dashboard.entry_count, 2);
        assert_eq!(dashboard.available_kinds, vec!["chest".to_string(), "weight".to_string()]);
        assert_eq!(dashboard.cards.len(), 1);
        assert_eq!(dashboard.cards[0].change, Some(1.5));
        assert_eq!(dashboard.series.len(), 2);

        let mut selection = KindSelection::all(&core.list_entries(&session.token).await.expect("list").value);
        selection.toggle("weight");
        let filtered = core.dashboard(&session.token, Some(&selection)).await.expect("dashboard");
        assert_eq!(filtered.series.len(), 1);

        assert_eq!(
            core.delete_entry(&session.token, first.entry.recorded_at).await.expect("delete"),
            2
        );
        let remaining = core.list_entries(&session.token).await.expect("list").value;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].values["chest"], 101.5);

        let err = core
            .delete_entry(&session.token, first.entry.recorded_at)
            .await
            .expect_err("already gone");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn offline_submission_is_kept_locally() {
        let core = core_with(Arc::new(OfflineStore));
        let session = core.sessions().sign_in("user-1").await.expect("sign in");

        let response = core
            .submit_measurements(&session.token, &fields(&[("waist", "84")]))
            .await
            .expect("submit");
        assert!(response.degraded);
        assert!(response.notice.is_some());

        let dashboard = core.dashboard(&session.token, None).await.expect("dashboard");
        assert!(dashboard.degraded);
        assert_eq!(dashboard.cards[0].kind, "waist");
    }

    #[tokio::test]
    async fn new_kinds_join_the_chart_selection() {
        let core = core_with(Arc::new(Database::in_memory().expect("db")));
        let session = core.sessions().sign_in("user-1").await.expect("sign in");
        core.submit_measurements(&session.token, &fields(&[("chest", "100")]))
            .await
            .expect("first");

        let mut selection = KindSelection::all(&core.list_entries(&session.token).await.expect("list").value);
        selection.toggle("chest");
        core.submit_into_selection(&session.token, &fields(&[("neck", "38")]), &mut selection)
            .await
            .expect("second");

        assert!(selection.is_selected("neck"));
        assert!(!selection.is_selected("chest"));
        let dashboard = core.dashboard(&session.token, Some(&selection)).await.expect("dashboard");
        assert_eq!(dashboard.series.len(), 1);
        assert_eq!(dashboard.series[0].kind, "neck");
    }

    #[tokio::test]
    async fn entry_saved_offline_can_be_deleted_once_back_online() {
        let primary = Arc::new(SwitchableStore::new());
        let core = core_with(primary.clone());
        let session = core.sessions().sign_in("user-1").await.expect("sign in");

        primary.set_online(false);
        let response = core
            .submit_measurements(&session.token, &fields(&[("chest", "100"), ("waist", "84")]))
            .await
            .expect("submit");
        assert!(response.degraded);

        primary.set_online(true);
        assert_eq!(
            core.delete_entry(&session.token, response.entry.recorded_at).await.expect("delete"),
            2
        );
        assert!(core.list_entries(&session.token).await.expect("list").value.is_empty());
    }
}
