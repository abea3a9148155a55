//! SQLite task queue backend.

use super::{NewTask, Schedule, TaskQueue, TaskRecord, TaskState};
use crate::error::QueueError;
use crate::task::TaskKind;
use async_trait::async_trait;
use casesync_types::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const TASK_COLUMNS: &str =
    "name, kind, interval_ms, requires_network, next_run_at, attempt, state, generation, last_error";

/// SQLite-based task queue.
///
/// Uses WAL mode so the daemon and the `enqueue` command can share the
/// database file.
#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    /// Open (or create) a queue in the database at `path`.
    pub async fn new(path: &Path) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let queue = Self { pool };
        queue.run_migrations().await?;
        Ok(queue)
    }

    /// Create an in-memory queue (for testing).
    pub async fn in_memory() -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let queue = Self { pool };
        queue.run_migrations().await?;
        Ok(queue)
    }

    async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                name TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                interval_ms INTEGER,
                requires_network INTEGER NOT NULL,
                next_run_at INTEGER NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                generation INTEGER NOT NULL DEFAULT 1,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(state, next_run_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn upsert(&self, task: NewTask) -> Result<TaskRecord, QueueError> {
        let name = task.kind.name();
        let kind = serde_json::to_string(&task.kind)?;

        let sql = match task.schedule {
            Schedule::Once => format!(
                r#"
                INSERT INTO tasks (name, kind, interval_ms, requires_network, next_run_at, state)
                VALUES (?1, ?2, ?3, ?4, ?5, 'queued')
                ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    interval_ms = NULL,
                    requires_network = excluded.requires_network,
                    next_run_at = excluded.next_run_at,
                    attempt = 0,
                    state = 'queued',
                    generation = tasks.generation + 1,
                    last_error = NULL
                RETURNING {TASK_COLUMNS}
                "#
            ),
            Schedule::Periodic { .. } => format!(
                r#"
                INSERT INTO tasks (name, kind, interval_ms, requires_network, next_run_at, state)
                VALUES (?1, ?2, ?3, ?4, ?5, 'queued')
                ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    interval_ms = excluded.interval_ms,
                    requires_network = excluded.requires_network
                RETURNING {TASK_COLUMNS}
                "#
            ),
        };

        let interval_ms = match task.schedule {
            Schedule::Once => None,
            Schedule::Periodic { interval } => Some(i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)),
        };

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(&name)
            .bind(kind)
            .bind(interval_ms)
            .bind(task.kind.requires_network())
            .bind(task.run_at.as_millis())
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn due(&self, now: Timestamp, limit: usize) -> Result<Vec<TaskRecord>, QueueError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE state = 'queued' AND next_run_at <= ?1
            ORDER BY next_run_at ASC, name ASC
            LIMIT ?2
            "#
        ))
        .bind(now.as_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn next_due_at(&self) -> Result<Option<Timestamp>, QueueError> {
        let next: Option<i64> =
            sqlx::query_scalar("SELECT MIN(next_run_at) FROM tasks WHERE state = 'queued'")
                .fetch_one(&self.pool)
                .await?;
        Ok(next.map(Timestamp::from_millis))
    }

    async fn mark_running(&self, name: &str, generation: u64) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET state = 'running'
            WHERE name = ?1 AND generation = ?2 AND state = 'queued'
            "#,
        )
        .bind(name)
        .bind(generation as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, name: &str, generation: u64) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM tasks WHERE name = ?1 AND generation = ?2")
            .bind(name)
            .bind(generation as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        name: &str,
        generation: u64,
        next_run_at: Timestamp,
        last_error: Option<&str>,
    ) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE tasks SET state = 'queued', attempt = 0, next_run_at = ?3, last_error = ?4
            WHERE name = ?1 AND generation = ?2
            "#,
        )
        .bind(name)
        .bind(generation as i64)
        .bind(next_run_at.as_millis())
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry(
        &self,
        name: &str,
        generation: u64,
        next_run_at: Timestamp,
        error: &str,
    ) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE tasks SET state = 'queued', attempt = attempt + 1, next_run_at = ?3, last_error = ?4
            WHERE name = ?1 AND generation = ?2
            "#,
        )
        .bind(name)
        .bind(generation as i64)
        .bind(next_run_at.as_millis())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, name: &str, generation: u64, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE tasks SET state = 'failed', last_error = ?3
            WHERE name = ?1 AND generation = ?2
            "#,
        )
        .bind(name)
        .bind(generation as i64)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM tasks WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, name: &str) -> Result<Option<TaskRecord>, QueueError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE name = ?1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, QueueError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn requeue_running(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("UPDATE tasks SET state = 'queued' WHERE state = 'running'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLx.
#[derive(sqlx::FromRow)]
struct TaskRow {
    name: String,
    kind: String,
    interval_ms: Option<i64>,
    requires_network: bool,
    next_run_at: i64,
    attempt: i64,
    state: String,
    generation: i64,
    last_error: Option<String>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = QueueError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let kind: TaskKind = serde_json::from_str(&row.kind)?;
        let state = TaskState::parse(&row.state).ok_or_else(|| QueueError::Corrupt {
            name: row.name.clone(),
            reason: format!("unknown state {:?}", row.state),
        })?;
        let schedule = match row.interval_ms {
            None => Schedule::Once,
            Some(ms) => Schedule::Periodic {
                interval: Duration::from_millis(u64::try_from(ms).unwrap_or(0)),
            },
        };

        Ok(TaskRecord {
            name: row.name,
            kind,
            schedule,
            requires_network: row.requires_network,
            next_run_at: Timestamp::from_millis(row.next_run_at),
            attempt: u32::try_from(row.attempt).unwrap_or(u32::MAX),
            state,
            generation: row.generation as u64,
            last_error: row.last_error,
        })
    }
}
