use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use nbv_core::{now_unix, JobKey, JobStatus, JobUid, ObjectMeta, ValidationJob};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::traits::{merge_applied, JobStore, StoreError};

/// Local-mode job store: one row per job, spec and status as JSON documents.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

const COLUMNS: &str = "namespace, name, uid, generation, labels_json, spec_json, status_json";

impl SqliteJobStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory sqlite db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch(include_str!("../migrations/0001_init.sql")).context("apply migrations")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn row_to_job(r: &Row<'_>) -> rusqlite::Result<(String, String, String, i64, String, String, String)> {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
    }

    fn decode((namespace, name, uid, generation, labels, spec, status): (String, String, String, i64, String, String, String)) -> Result<ValidationJob> {
        let key = JobKey::new(namespace.clone(), name.clone());
        let spec = serde_json::from_str(&spec).with_context(|| format!("decode spec of {key}"))?;
        let status = serde_json::from_str(&status).with_context(|| format!("decode status of {key}"))?;
        let labels = serde_json::from_str(&labels).unwrap_or_default();
        let mut job = ValidationJob::new(key, spec);
        job.metadata = ObjectMeta { name, namespace, uid: Some(JobUid::from_str(uid)), generation, labels };
        job.status = status;
        Ok(job)
    }

    fn fetch(conn: &Connection, key: &JobKey) -> Result<Option<ValidationJob>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM validation_jobs WHERE namespace = ?1 AND name = ?2"),
                params![key.namespace, key.name],
                Self::row_to_job,
            )
            .optional()?;
        row.map(Self::decode).transpose()
    }
}

impl JobStore for SqliteJobStore {
    fn list(&self, namespace: Option<&str>) -> Result<Vec<ValidationJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM validation_jobs WHERE ?1 IS NULL OR namespace = ?1 ORDER BY namespace, name"
        ))?;
        let rows = stmt.query_map(params![namespace], Self::row_to_job)?;
        let mut jobs = vec![];
        for row in rows {
            jobs.push(Self::decode(row?)?);
        }
        Ok(jobs)
    }

    fn get(&self, key: &JobKey) -> Result<Option<ValidationJob>> {
        let conn = self.lock()?;
        Self::fetch(&conn, key)
    }

    fn update_status(&self, key: &JobKey, status: &JobStatus) -> Result<()> {
        let conn = self.lock()?;
        let status_json = serde_json::to_string(status)?;
        let changed = conn.execute(
            "UPDATE validation_jobs SET status_json = ?1, phase = ?2, updated_at = ?3 WHERE namespace = ?4 AND name = ?5",
            params![status_json, status.phase.to_string(), now_unix(), key.namespace, key.name],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(key.clone()).into());
        }
        Ok(())
    }

    fn apply(&self, job: ValidationJob) -> Result<ValidationJob> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let key = job.key();
        let merged = merge_applied(Self::fetch(&tx, &key)?, job);
        let uid = merged.metadata.uid.as_ref().map(|u| u.as_str().to_string()).unwrap_or_default();
        let now = now_unix();
        tx.execute(
            "INSERT INTO validation_jobs(namespace, name, uid, generation, labels_json, spec_json, status_json, phase, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(namespace, name) DO UPDATE SET
               generation = excluded.generation, labels_json = excluded.labels_json,
               spec_json = excluded.spec_json, updated_at = excluded.updated_at",
            params![
                key.namespace,
                key.name,
                uid,
                merged.metadata.generation,
                serde_json::to_string(&merged.metadata.labels)?,
                serde_json::to_string(&merged.spec)?,
                serde_json::to_string(&merged.status)?,
                merged.status.phase.to_string(),
                now
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    fn delete(&self, key: &JobKey) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM validation_jobs WHERE namespace = ?1 AND name = ?2", params![key.namespace, key.name])?;
        Ok(n > 0)
    }
}
