use crate::errors::{AppError, AppResult, StoreError, StoreResult};
use crate::kv::KeyValueStore;
use crate::models::{timestamp_key, MeasurementRecord, NotificationRequest};
use crate::store::MeasurementStore;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Relational backing store: measurement rows per user, settings, and the
/// pending set of the local notification center.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::init(conn, path.to_path_buf())
    }

    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, db_path: PathBuf) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database mutex poisoned".to_string()))
    }

    pub fn pending_notifications(&self) -> StoreResult<Vec<NotificationRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT payload_json FROM pending_notifications ORDER BY fire_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(serde_json::from_str(&row?)?);
        }
        Ok(result)
    }

    /// Inserts the whole batch in one transaction. An id already pending is
    /// replaced.
    pub fn insert_notifications(&self, batch: &[NotificationRequest]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        for notification in batch {
            tx.execute(
                "INSERT INTO pending_notifications (id, fire_at, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET fire_at = excluded.fire_at,
                   payload_json = excluded.payload_json, created_at = excluded.created_at",
                params![
                    notification.id,
                    timestamp_key(&notification.fire_at),
                    serde_json::to_string(notification)?,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_notifications(&self, ids: &[i32]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0usize;
        for id in ids {
            removed += tx.execute("DELETE FROM pending_notifications WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn next_notification_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row("SELECT MIN(fire_at) FROM pending_notifications", [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
        raw.map(|raw| parse_time(&raw).map_err(StoreError::from)).transpose()
    }

    /// Removes and returns every notification due at or before `now`.
    pub fn take_due_notifications(&self, now: DateTime<Utc>) -> StoreResult<Vec<NotificationRequest>> {
        let mut conn = self.lock()?;
        let cutoff = timestamp_key(&now);
        let tx = conn.transaction()?;
        let mut due = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT payload_json FROM pending_notifications WHERE fire_at <= ?1 ORDER BY fire_at ASC, id ASC",
            )?;
            let rows = stmt.query_map([&cutoff], |row| row.get::<_, String>(0))?;
            for row in rows {
                due.push(serde_json::from_str::<NotificationRequest>(&row?)?);
            }
        }
        tx.execute("DELETE FROM pending_notifications WHERE fire_at <= ?1", [&cutoff])?;
        tx.commit()?;
        Ok(due)
    }
}

impl MeasurementStore for Database {
    fn list_records(&self, owner_id: &str) -> StoreResult<Vec<MeasurementRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, measurement_type, value, created_at
             FROM measurements WHERE user_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([owner_id], parse_measurement_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn insert_records(&self, owner_id: &str, records: &[MeasurementRecord]) -> StoreResult<()> {
        if let Some(foreign) = records.iter().find(|record| record.owner_id != owner_id) {
            return Err(StoreError::Corrupt(format!(
                "record {} does not belong to the signed-in owner",
                foreign.id
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO measurements (id, user_id, measurement_type, value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    owner_id,
                    record.kind,
                    record.value,
                    timestamp_key(&record.recorded_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_group(&self, owner_id: &str, recorded_at: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM measurements WHERE user_id = ?1 AND created_at = ?2",
            params![owner_id, timestamp_key(&recorded_at)],
        )?;
        Ok(removed)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

fn parse_measurement_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeasurementRecord> {
    Ok(MeasurementRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind: row.get(2)?,
        value: row.get(3)?,
        recorded_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::kv::KeyValueStore;
    use crate::models::{MeasurementRecord, NotificationExtra, NotificationRequest};
    use crate::store::MeasurementStore;
    use chrono::{DateTime, Duration, Utc};

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("timestamp")
    }

    fn notification(id: i32, fire_at: DateTime<Utc>) -> NotificationRequest {
        NotificationRequest {
            id,
            title: "t".to_string(),
            body: "b".to_string(),
            fire_at,
            sound: "default".to_string(),
            action_type: "WEIGHT_REMINDER".to_string(),
            extra: NotificationExtra {
                kind: "weight_reminder".to_string(),
            },
        }
    }

    #[test]
    fn database_can_insert_and_list_records_per_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.sqlite")).expect("db");

        let later = at("2026-10-12T08:00:00.000Z");
        let earlier = at("2026-10-05T08:00:00.000Z");
        db.insert_records(
            "user-1",
            &[
                MeasurementRecord::new("user-1", "chest", 100.0, later),
                MeasurementRecord::new("user-1", "waist", 84.0, later),
            ],
        )
        .expect("insert later");
        db.insert_records("user-1", &[MeasurementRecord::new("user-1", "chest", 101.0, earlier)])
            .expect("insert earlier");
        db.insert_records("user-2", &[MeasurementRecord::new("user-2", "chest", 90.0, earlier)])
            .expect("insert other owner");

        let records = db.list_records("user-1").expect("list");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].recorded_at, earlier);
        assert!(records.iter().all(|record| record.owner_id == "user-1"));
    }

    #[test]
    fn insert_is_all_or_nothing() {
        let db = Database::in_memory().expect("db");
        let now = at("2026-10-05T08:00:00.000Z");
        let good = MeasurementRecord::new("user-1", "chest", 100.0, now);
        let mut duplicate = MeasurementRecord::new("user-1", "waist", 80.0, now);
        duplicate.id = good.id.clone();

        assert!(db.insert_records("user-1", &[good, duplicate]).is_err());
        assert!(db.list_records("user-1").expect("list").is_empty());
    }

    #[test]
    fn insert_rejects_foreign_records() {
        let db = Database::in_memory().expect("db");
        let record = MeasurementRecord::new("user-2", "chest", 100.0, Utc::now());
        assert!(db.insert_records("user-1", &[record]).is_err());
    }

    #[test]
    fn delete_group_removes_only_that_timestamp_for_that_owner() {
        let db = Database::in_memory().expect("db");
        let first = at("2026-10-05T08:00:00.000Z");
        let second = at("2026-10-12T08:00:00.000Z");
        db.insert_records(
            "user-1",
            &[
                MeasurementRecord::new("user-1", "chest", 100.0, first),
                MeasurementRecord::new("user-1", "waist", 84.0, first),
                MeasurementRecord::new("user-1", "chest", 99.0, second),
            ],
        )
        .expect("insert");
        db.insert_records("user-2", &[MeasurementRecord::new("user-2", "chest", 90.0, first)])
            .expect("insert other");

        assert_eq!(db.delete_group("user-1", first).expect("delete"), 2);
        let remaining = db.list_records("user-1").expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].recorded_at, second);
        assert_eq!(db.list_records("user-2").expect("list").len(), 1);
    }

    #[test]
    fn settings_behave_as_key_value_store() {
        let db = Database::in_memory().expect("db");
        db.set("reminder-time", "08:00").expect("set");
        db.set("reminder-time", "09:15").expect("overwrite");
        assert_eq!(db.get("reminder-time").expect("get").as_deref(), Some("09:15"));
        db.remove("reminder-time").expect("remove");
        assert_eq!(db.get("reminder-time").expect("get"), None);
    }

    #[test]
    fn due_notifications_are_taken_once() {
        let db = Database::in_memory().expect("db");
        let now = at("2026-10-18T08:00:00.000Z");
        db.insert_notifications(&[
            notification(1000, now - Duration::minutes(1)),
            notification(1001, now + Duration::days(1)),
        ])
        .expect("insert");

        assert_eq!(db.next_notification_at().expect("next"), Some(now - Duration::minutes(1)));
        let due = db.take_due_notifications(now).expect("take");
        assert_eq!(due.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1000]);
        assert!(db.take_due_notifications(now).expect("take again").is_empty());
        assert_eq!(db.pending_notifications().expect("pending").len(), 1);
        assert_eq!(db.delete_notifications(&[1001, 1002]).expect("delete"), 1);
        assert_eq!(db.next_notification_at().expect("next"), None);
    }
}
