//! SQLite-backed persistence for production use.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{OrchError, OrchResult};
use crate::store::JobStore;
use crate::submission::{JobId, JobSubmission};

/// SQLite-based job store.
///
/// Provides crash-recoverable storage with ACID guarantees. Submissions are
/// stored as JSON rows keyed by job id; the scheduled index is a separate
/// table sorted by fire time (unix seconds, floating point).
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new(path: impl AsRef<Path>) -> OrchResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create a new in-memory SQLite store (for tests).
    pub fn in_memory() -> OrchResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> OrchResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchError::Database(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                provider TEXT NOT NULL,
                device TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                job_id TEXT PRIMARY KEY,
                fire_at REAL NOT NULL,
                FOREIGN KEY (job_id) REFERENCES jobs(id)
            );

            CREATE INDEX IF NOT EXISTS idx_scheduled_fire_at ON scheduled_jobs(fire_at);
            "#,
        )?;
        Ok(())
    }

    fn load_rows(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> OrchResult<Vec<JobSubmission>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchError::Database(e.to_string()))?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next()? {
            let data: String = row.get(0)?;
            jobs.push(serde_json::from_str(&data)?);
        }
        Ok(jobs)
    }
}

fn unix_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn put(&self, submission: &JobSubmission) -> OrchResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchError::Database(e.to_string()))?;
        let data = serde_json::to_string(submission)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO jobs (id, status, provider, device, data, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                submission.id.to_string(),
                submission.status.name(),
                submission.request.provider,
                submission.request.device,
                data,
                submission.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> OrchResult<Option<JobSubmission>> {
        let jobs = self.load_rows(
            "SELECT data FROM jobs WHERE id = ?1",
            rusqlite::params![job_id.to_string()],
        )?;
        Ok(jobs.into_iter().next())
    }

    async fn add_scheduled(&self, job_id: &JobId, fire_at: DateTime<Utc>) -> OrchResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchError::Database(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO scheduled_jobs (job_id, fire_at) VALUES (?1, ?2)",
            rusqlite::params![job_id.to_string(), unix_seconds(fire_at)],
        )?;
        Ok(())
    }

    async fn remove_scheduled(&self, job_id: &JobId) -> OrchResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| OrchError::Database(e.to_string()))?;
        conn.execute(
            "DELETE FROM scheduled_jobs WHERE job_id = ?1",
            rusqlite::params![job_id.to_string()],
        )?;
        Ok(())
    }

    async fn scheduled_due(&self, now: DateTime<Utc>) -> OrchResult<Vec<JobSubmission>> {
        self.load_rows(
            r#"
            SELECT jobs.data FROM jobs
            JOIN scheduled_jobs ON scheduled_jobs.job_id = jobs.id
            WHERE scheduled_jobs.fire_at <= ?1
            ORDER BY scheduled_jobs.fire_at ASC
            "#,
            rusqlite::params![unix_seconds(now)],
        )
    }

    async fn list_scheduled(&self) -> OrchResult<Vec<JobSubmission>> {
        self.load_rows(
            r#"
            SELECT jobs.data FROM jobs
            JOIN scheduled_jobs ON scheduled_jobs.job_id = jobs.id
            ORDER BY scheduled_jobs.fire_at ASC
            "#,
            rusqlite::params![],
        )
    }

    async fn load_all(&self) -> OrchResult<Vec<JobSubmission>> {
        self.load_rows(
            "SELECT data FROM jobs ORDER BY created_at ASC",
            rusqlite::params![],
        )
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{JobRequest, JobStatus, SubmitOptions};
    use nexar_hal::Task;

    fn make_submission() -> JobSubmission {
        let request = JobRequest::new(
            Task::Circuit(serde_json::json!({"n": 2})),
            "local",
            "local_sim",
        );
        JobSubmission::new(request, &SubmitOptions::default())
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let sub = make_submission();

        store.put(&sub).await.unwrap();
        let loaded = store.get(&sub.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, sub.id);
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.request.device, "local_sim");

        assert!(store.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let mut sub = make_submission();

        store.put(&sub).await.unwrap();
        sub.status = JobStatus::Queued;
        store.put(&sub).await.unwrap();

        let loaded = store.get(&sub.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_index() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let mut early = make_submission();
        early.scheduled_time = Some(now - chrono::Duration::seconds(5));
        let mut late = make_submission();
        late.scheduled_time = Some(now + chrono::Duration::seconds(3600));

        for sub in [&early, &late] {
            store.put(sub).await.unwrap();
            store
                .add_scheduled(&sub.id, sub.scheduled_time.unwrap())
                .await
                .unwrap();
        }

        let due = store.scheduled_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);

        assert_eq!(store.list_scheduled().await.unwrap().len(), 2);

        store.remove_scheduled(&early.id).await.unwrap();
        assert!(store.scheduled_due(now).await.unwrap().is_empty());
        assert_eq!(store.list_scheduled().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_recovers_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let sub = make_submission();
        {
            let store = SqliteStore::new(&path).unwrap();
            store.put(&sub).await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert!(store.is_durable());
        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, sub.id);
    }
}
