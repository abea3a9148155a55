//! SQLite local store.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, SyncedRecord, Timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use super::{LocalStore, PushedRecord, QuarantinedRecord, RowState};
use crate::error::LocalStoreError;

const RECORD_COLUMNS: &str =
    "id, version, updated_at, created_at, is_dirty, is_deleted, deleted_at, fields";

/// SQLite-backed local store.
///
/// Uses WAL mode for concurrent reads/writes. One table holds every
/// entity type, keyed by `(entity, id)`.
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Open (or create) a store at the given path.
    pub async fn new(path: &Path) -> Result<Self, LocalStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, LocalStoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                entity TEXT NOT NULL,
                id TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                is_dirty INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL,
                deleted_at INTEGER,
                fields TEXT NOT NULL,
                push_failures INTEGER NOT NULL DEFAULT 0,
                last_push_error TEXT,
                quarantined_at INTEGER,
                PRIMARY KEY (entity, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pull_cursors (
                entity TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                record_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_dirty ON records(entity, is_dirty, updated_at, id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_tombstones ON records(entity, is_deleted, deleted_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode(entity: EntityType, rows: Vec<RecordRow>) -> Result<Vec<SyncedRecord>, LocalStoreError> {
        rows.into_iter().map(|row| row.into_record(entity)).collect()
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn load_dirty_batch(
        &self,
        entity: EntityType,
        limit: usize,
    ) -> Result<Vec<SyncedRecord>, LocalStoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM records
            WHERE entity = ?1 AND is_dirty = 1 AND quarantined_at IS NULL
            ORDER BY updated_at ASC, id ASC
            LIMIT ?2
            "#
        ))
        .bind(entity.collection())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Self::decode(entity, rows)
    }

    async fn mark_batch_pushed(
        &self,
        entity: EntityType,
        records: &[PushedRecord],
        version: u64,
        pushed_at: Timestamp,
    ) -> Result<u64, LocalStoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut cleaned = 0;
        let mut tx = self.pool.begin().await?;
        for pushed in records {
            let result = sqlx::query(
                r#"
                UPDATE records
                SET is_dirty = 0, version = ?3, updated_at = ?4,
                    push_failures = 0, last_push_error = NULL
                WHERE entity = ?1 AND id = ?2 AND is_dirty = 1 AND updated_at = ?5
                "#,
            )
            .bind(entity.collection())
            .bind(pushed.id.as_str())
            .bind(version as i64)
            .bind(pushed_at.as_millis())
            .bind(pushed.loaded_at.as_millis())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                cleaned += 1;
                continue;
            }

            // Edited after it was loaded: keep it dirty, ahead of the pushed copy.
            sqlx::query(
                r#"
                UPDATE records
                SET version = MAX(version, ?3), updated_at = MAX(updated_at, ?4),
                    push_failures = 0, last_push_error = NULL
                WHERE entity = ?1 AND id = ?2 AND is_dirty = 1
                "#,
            )
            .bind(entity.collection())
            .bind(pushed.id.as_str())
            .bind(version as i64)
            .bind(pushed_at.as_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(cleaned)
    }

    async fn apply_pulled(
        &self,
        entity: EntityType,
        writes: &[(SyncedRecord, RowState)],
    ) -> Result<Vec<RecordId>, LocalStoreError> {
        let mut changed = Vec::new();
        if writes.is_empty() {
            return Ok(changed);
        }

        let mut tx = self.pool.begin().await?;
        for (record, seen) in writes {
            let fields = serde_json::to_string(&record.fields)?;
            let result = match seen {
                RowState::Absent => {
                    sqlx::query(
                        r#"
                        INSERT INTO records
                            (entity, id, version, updated_at, created_at, is_dirty, is_deleted, deleted_at, fields)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                        ON CONFLICT(entity, id) DO NOTHING
                        "#,
                    )
                    .bind(entity.collection())
                    .bind(record.id.as_str())
                    .bind(record.version as i64)
                    .bind(record.updated_at.as_millis())
                    .bind(record.created_at.as_millis())
                    .bind(record.is_dirty)
                    .bind(record.is_deleted)
                    .bind(record.deleted_at.map(|t| t.as_millis()))
                    .bind(fields)
                    .execute(&mut *tx)
                    .await?
                }
                RowState::Present {
                    updated_at,
                    is_dirty,
                } => {
                    sqlx::query(
                        r#"
                        UPDATE records
                        SET version = ?3, updated_at = ?4, is_dirty = ?5, is_deleted = ?6,
                            deleted_at = ?7, fields = ?8,
                            push_failures = CASE WHEN ?5 = 0 THEN 0 ELSE push_failures END,
                            last_push_error = CASE WHEN ?5 = 0 THEN NULL ELSE last_push_error END,
                            quarantined_at = CASE WHEN ?5 = 0 THEN NULL ELSE quarantined_at END
                        WHERE entity = ?1 AND id = ?2 AND updated_at = ?9 AND is_dirty = ?10
                        "#,
                    )
                    .bind(entity.collection())
                    .bind(record.id.as_str())
                    .bind(record.version as i64)
                    .bind(record.updated_at.as_millis())
                    .bind(record.is_dirty)
                    .bind(record.is_deleted)
                    .bind(record.deleted_at.map(|t| t.as_millis()))
                    .bind(fields)
                    .bind(updated_at.as_millis())
                    .bind(*is_dirty)
                    .execute(&mut *tx)
                    .await?
                }
            };
            if result.rows_affected() == 0 {
                changed.push(record.id.clone());
            }
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn upsert_all(
        &self,
        entity: EntityType,
        records: &[SyncedRecord],
    ) -> Result<(), LocalStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let fields = serde_json::to_string(&record.fields)?;
            sqlx::query(
                r#"
                INSERT INTO records
                    (entity, id, version, updated_at, created_at, is_dirty, is_deleted, deleted_at, fields)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(entity, id) DO UPDATE SET
                    version = excluded.version,
                    updated_at = excluded.updated_at,
                    is_dirty = excluded.is_dirty,
                    is_deleted = excluded.is_deleted,
                    deleted_at = excluded.deleted_at,
                    fields = excluded.fields,
                    push_failures = CASE WHEN excluded.is_dirty = 0 THEN 0 ELSE push_failures END,
                    last_push_error = CASE WHEN excluded.is_dirty = 0 THEN NULL ELSE last_push_error END,
                    quarantined_at = CASE WHEN excluded.is_dirty = 0 THEN NULL ELSE quarantined_at END
                "#,
            )
            .bind(entity.collection())
            .bind(record.id.as_str())
            .bind(record.version as i64)
            .bind(record.updated_at.as_millis())
            .bind(record.created_at.as_millis())
            .bind(record.is_dirty)
            .bind(record.is_deleted)
            .bind(record.deleted_at.map(|t| t.as_millis()))
            .bind(fields)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find(
        &self,
        entity: EntityType,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SyncedRecord>, LocalStoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE entity = "
        ));
        query.push_bind(entity.collection());
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Self::decode(entity, rows)?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect())
    }

    async fn delete_hard_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
    ) -> Result<u64, LocalStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE entity = ?1 AND is_deleted = 1 AND is_dirty = 0 AND deleted_at < ?2
            "#,
        )
        .bind(entity.collection())
        .bind(cutoff.as_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn load_pull_cursor(
        &self,
        entity: EntityType,
    ) -> Result<Option<PullCursor>, LocalStoreError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT updated_at, record_id FROM pull_cursors WHERE entity = ?1")
                .bind(entity.collection())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(updated_at, id)| {
            let id = RecordId::new(id.clone()).map_err(|e| LocalStoreError::Corrupt {
                entity,
                id,
                reason: e.to_string(),
            })?;
            Ok(PullCursor::new(Timestamp::from_millis(updated_at), id))
        })
        .transpose()
    }

    async fn save_pull_cursor(
        &self,
        entity: EntityType,
        cursor: &PullCursor,
    ) -> Result<(), LocalStoreError> {
        sqlx::query(
            r#"
            INSERT INTO pull_cursors (entity, updated_at, record_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(entity) DO UPDATE SET updated_at = ?2, record_id = ?3
            "#,
        )
        .bind(entity.collection())
        .bind(cursor.updated_at.as_millis())
        .bind(cursor.id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_push_failure(
        &self,
        entity: EntityType,
        id: &RecordId,
        error: &str,
        max_failures: u32,
        now: Timestamp,
    ) -> Result<bool, LocalStoreError> {
        let quarantined_at: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            UPDATE records
            SET push_failures = push_failures + 1,
                last_push_error = ?3,
                quarantined_at = CASE
                    WHEN push_failures + 1 >= ?4 THEN ?5
                    ELSE quarantined_at
                END
            WHERE entity = ?1 AND id = ?2
            RETURNING quarantined_at
            "#,
        )
        .bind(entity.collection())
        .bind(id.as_str())
        .bind(error)
        .bind(i64::from(max_failures))
        .bind(now.as_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(quarantined_at.flatten().is_some())
    }

    async fn list_quarantined(
        &self,
        entity: EntityType,
    ) -> Result<Vec<QuarantinedRecord>, LocalStoreError> {
        let rows: Vec<(String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT id, push_failures, last_push_error, quarantined_at
            FROM records
            WHERE entity = ?1 AND quarantined_at IS NOT NULL
            ORDER BY quarantined_at ASC, id ASC
            "#,
        )
        .bind(entity.collection())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, failures, last_error, quarantined_at)| {
                let id = RecordId::new(id.clone()).map_err(|e| LocalStoreError::Corrupt {
                    entity,
                    id,
                    reason: e.to_string(),
                })?;
                Ok(QuarantinedRecord {
                    id,
                    failures: u32::try_from(failures).unwrap_or(u32::MAX),
                    last_error,
                    quarantined_at: Timestamp::from_millis(quarantined_at),
                })
            })
            .collect()
    }

    async fn release_quarantine(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<bool, LocalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET quarantined_at = NULL, push_failures = 0, last_push_error = NULL
            WHERE entity = ?1 AND id = ?2 AND quarantined_at IS NOT NULL
            "#,
        )
        .bind(entity.collection())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_dirty(&self, entity: EntityType) -> Result<u64, LocalStoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE entity = ?1 AND is_dirty = 1")
                .bind(entity.collection())
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    version: i64,
    updated_at: i64,
    created_at: i64,
    is_dirty: bool,
    is_deleted: bool,
    deleted_at: Option<i64>,
    fields: String,
}

impl RecordRow {
    fn into_record(self, entity: EntityType) -> Result<SyncedRecord, LocalStoreError> {
        let corrupt = |id: &str, reason: String| LocalStoreError::Corrupt {
            entity,
            id: id.to_string(),
            reason,
        };

        let id = RecordId::new(self.id.clone()).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let fields = serde_json::from_str(&self.fields)
            .map_err(|e| corrupt(&self.id, format!("fields: {e}")))?;
        let version =
            u64::try_from(self.version).map_err(|_| corrupt(&self.id, "negative version".into()))?;

        Ok(SyncedRecord {
            id,
            version,
            updated_at: Timestamp::from_millis(self.updated_at),
            created_at: Timestamp::from_millis(self.created_at),
            is_dirty: self.is_dirty,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at.map(Timestamp::from_millis),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesync_types::Fields;
    use serde_json::json;

    const ENTITY: EntityType = EntityType::CaseRecord;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn record(name: &str, updated_at: i64, is_dirty: bool) -> SyncedRecord {
        let mut record = SyncedRecord::new_local(
            id(name),
            json!({"name": name}).as_object().cloned().unwrap(),
            Timestamp::from_millis(updated_at),
        );
        record.is_dirty = is_dirty;
        record
    }

    #[tokio::test]
    async fn dirty_batch_is_ordered_and_limited() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store
            .upsert_all(
                ENTITY,
                &[
                    record("c", 30, true),
                    record("a", 10, true),
                    record("b", 20, false),
                    record("d", 10, true),
                ],
            )
            .await
            .unwrap();

        let batch = store.load_dirty_batch(ENTITY, 2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(batch[0].fields["name"], json!("a"));
        assert_eq!(store.count_dirty(ENTITY).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn entity_types_are_isolated() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store
            .upsert_one(EntityType::Event, &record("e1", 10, true))
            .await
            .unwrap();

        assert!(store.load_dirty_batch(ENTITY, 10).await.unwrap().is_empty());
        assert_eq!(store.load_dirty_batch(EntityType::Event, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_batch_pushed_cleans_and_stamps() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store
            .upsert_all(ENTITY, &[record("a", 10, true), record("b", 10, true)])
            .await
            .unwrap();

        let cleaned = store
            .mark_batch_pushed(ENTITY, &[PushedRecord::of(&record("a", 10, true))], 4, Timestamp::from_millis(99))
            .await
            .unwrap();
        assert_eq!(cleaned, 1);

        let a = store.get(ENTITY, &id("a")).await.unwrap().unwrap();
        assert!(!a.is_dirty);
        assert_eq!(a.version, 4);
        assert_eq!(a.updated_at, Timestamp::from_millis(99));
        assert_eq!(a.created_at, Timestamp::from_millis(10));
        assert!(store.get(ENTITY, &id("b")).await.unwrap().unwrap().is_dirty);
    }

    #[tokio::test]
    async fn mark_batch_pushed_keeps_later_edit_dirty() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        let loaded = record("a", 10, true);
        store.upsert_one(ENTITY, &loaded).await.unwrap();

        let mut edited = loaded.clone();
        edited.edit(
            json!({"name": "edited"}).as_object().cloned().unwrap(),
            Timestamp::from_millis(20),
        );
        store.upsert_one(ENTITY, &edited).await.unwrap();

        let cleaned = store
            .mark_batch_pushed(ENTITY, &[PushedRecord::of(&loaded)], 1, Timestamp::from_millis(15))
            .await
            .unwrap();
        assert_eq!(cleaned, 0);

        let a = store.get(ENTITY, &id("a")).await.unwrap().unwrap();
        assert!(a.is_dirty);
        assert_eq!(a.version, 1);
        assert_eq!(a.updated_at, Timestamp::from_millis(20));
        assert_eq!(a.fields["name"], json!("edited"));
        assert_eq!(store.load_dirty_batch(ENTITY, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn apply_pulled_guards_on_row_state() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        let seen = record("a", 10, true);
        store.upsert_one(ENTITY, &seen).await.unwrap();
        let mut taken = record("b", 10, false);
        taken.version = 1;
        store.upsert_one(ENTITY, &taken).await.unwrap();

        let mut edited = seen.clone();
        edited.edit(Fields::new(), Timestamp::from_millis(30));
        store.upsert_one(ENTITY, &edited).await.unwrap();

        let mut incoming_a = record("a", 40, false);
        incoming_a.version = 2;
        let mut incoming_b = record("b", 40, false);
        incoming_b.version = 2;
        let mut incoming_c = record("c", 40, false);
        incoming_c.version = 2;

        let changed = store
            .apply_pulled(
                ENTITY,
                &[
                    (incoming_a, RowState::of(Some(&seen))),
                    (incoming_b, RowState::of(Some(&taken))),
                    (incoming_c.clone(), RowState::Absent),
                    (incoming_c, RowState::Absent),
                ],
            )
            .await
            .unwrap();
        assert_eq!(changed, vec![id("a"), id("c")]);

        let a = store.get(ENTITY, &id("a")).await.unwrap().unwrap();
        assert!(a.is_dirty);
        assert_eq!(a.updated_at, Timestamp::from_millis(30));
        let b = store.get(ENTITY, &id("b")).await.unwrap().unwrap();
        assert_eq!(b.version, 2);
        assert_eq!(b.created_at, Timestamp::from_millis(10));
        assert_eq!(store.get(ENTITY, &id("c")).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store.upsert_one(ENTITY, &record("a", 10, true)).await.unwrap();

        let mut newer = record("a", 50, false);
        newer.created_at = Timestamp::from_millis(40);
        newer.version = 2;
        store.upsert_one(ENTITY, &newer).await.unwrap();

        let stored = store.get(ENTITY, &id("a")).await.unwrap().unwrap();
        assert_eq!(stored.created_at, Timestamp::from_millis(10));
        assert_eq!(stored.version, 2);
        assert!(!stored.is_dirty);
    }

    #[tokio::test]
    async fn find_returns_only_existing() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store
            .upsert_all(ENTITY, &[record("a", 1, false), record("b", 2, true)])
            .await
            .unwrap();

        let found = store
            .find(ENTITY, &[id("a"), id("b"), id("zz")])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[&id("b")].is_dirty);
        assert!(store.find(ENTITY, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_hard_before_spares_dirty_and_recent() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        let mut old_clean = record("old", 1, false);
        old_clean.soft_delete(Timestamp::from_millis(100));
        old_clean.is_dirty = false;
        let mut old_dirty = record("pending", 1, false);
        old_dirty.soft_delete(Timestamp::from_millis(100));
        let mut recent = record("recent", 1, false);
        recent.soft_delete(Timestamp::from_millis(900));
        recent.is_dirty = false;
        let live = record("live", 1, false);

        store
            .upsert_all(ENTITY, &[old_clean, old_dirty, recent, live])
            .await
            .unwrap();

        let purged = store
            .delete_hard_before(ENTITY, Timestamp::from_millis(500))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let left = store
            .find(ENTITY, &[id("old"), id("pending"), id("recent"), id("live")])
            .await
            .unwrap();
        assert!(!left.contains_key(&id("old")));
        assert_eq!(left.len(), 3);
    }

    #[tokio::test]
    async fn pull_cursor_round_trips() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        assert!(store.load_pull_cursor(ENTITY).await.unwrap().is_none());

        let cursor = PullCursor::new(Timestamp::from_millis(77), id("r9"));
        store.save_pull_cursor(ENTITY, &cursor).await.unwrap();
        let next = PullCursor::new(Timestamp::from_millis(80), id("r1"));
        store.save_pull_cursor(ENTITY, &next).await.unwrap();

        assert_eq!(store.load_pull_cursor(ENTITY).await.unwrap(), Some(next));
        assert!(store
            .load_pull_cursor(EntityType::Event)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn repeated_failures_quarantine_until_released() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store.upsert_one(ENTITY, &record("poison", 1, true)).await.unwrap();
        let now = Timestamp::from_millis(1_000);

        assert!(!store
            .record_push_failure(ENTITY, &id("poison"), "denied", 2, now)
            .await
            .unwrap());
        assert!(store
            .record_push_failure(ENTITY, &id("poison"), "denied again", 2, now)
            .await
            .unwrap());

        assert!(store.load_dirty_batch(ENTITY, 10).await.unwrap().is_empty());
        let quarantined = store.list_quarantined(ENTITY).await.unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].failures, 2);
        assert_eq!(quarantined[0].last_error.as_deref(), Some("denied again"));

        assert!(store.release_quarantine(ENTITY, &id("poison")).await.unwrap());
        assert!(!store.release_quarantine(ENTITY, &id("poison")).await.unwrap());
        assert_eq!(store.load_dirty_batch(ENTITY, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clean_upsert_clears_quarantine() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store.upsert_one(ENTITY, &record("q", 1, true)).await.unwrap();
        store
            .record_push_failure(ENTITY, &id("q"), "denied", 1, Timestamp::from_millis(5))
            .await
            .unwrap();

        store.upsert_one(ENTITY, &record("q", 9, false)).await.unwrap();
        assert!(store.list_quarantined(ENTITY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_on_unknown_record_is_ignored() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        let quarantined = store
            .record_push_failure(ENTITY, &id("ghost"), "x", 1, Timestamp::from_millis(1))
            .await
            .unwrap();
        assert!(!quarantined);
    }

    #[tokio::test]
    async fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");
        {
            let store = SqliteLocalStore::new(&path).await.unwrap();
            store.upsert_one(ENTITY, &record("kept", 1, true)).await.unwrap();
        }

        let store = SqliteLocalStore::new(&path).await.unwrap();
        let batch = store.load_dirty_batch(ENTITY, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].fields, Fields::from_iter([("name".to_string(), json!("kept"))]));
    }

    #[tokio::test]
    async fn path_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases #1 ?mode=memory.db");
        {
            let store = SqliteLocalStore::new(&path).await.unwrap();
            store.upsert_one(ENTITY, &record("kept", 1, true)).await.unwrap();
        }
        assert!(path.exists());

        let store = SqliteLocalStore::new(&path).await.unwrap();
        assert_eq!(store.count_dirty(ENTITY).await.unwrap(), 1);
    }
}
