//! Download record read/write operations.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::LibraryDb;
use super::DownloadStore;
use crate::clock::unix_timestamp;
use crate::download::{Download, DownloadStatus};

const COLUMNS: &str = r#"
    id, track_id, status, priority, progress, speed, eta,
    source_peer, source_filename, error_message, retry_count, max_retries,
    created_at, started_at, completed_at, updated_at
"#;

fn row_to_download(row: &SqliteRow) -> Download {
    let status: String = row.get("status");
    let progress: i64 = row.get("progress");
    let speed: Option<i64> = row.get("speed");
    let eta: Option<i64> = row.get("eta");
    let retry_count: i64 = row.get("retry_count");
    let max_retries: i64 = row.get("max_retries");
    Download {
        id: row.get("id"),
        track_id: row.get("track_id"),
        status: DownloadStatus::from_str(&status),
        priority: row.get::<i64, _>("priority") as i32,
        progress: progress.clamp(0, 100) as u8,
        speed: speed.map(|v| v.max(0) as u64),
        eta: eta.map(|v| v.max(0) as u64),
        source_peer: row.get("source_peer"),
        source_filename: row.get("source_filename"),
        error_message: row.get("error_message"),
        retry_count: retry_count.max(0) as u32,
        max_retries: max_retries.max(0) as u32,
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl DownloadStore for LibraryDb {
    async fn save(&self, d: &Download) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (
                id, track_id, status, priority, progress, speed, eta,
                source_peer, source_filename, error_message, retry_count, max_retries,
                created_at, started_at, completed_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                track_id = excluded.track_id,
                status = excluded.status,
                priority = excluded.priority,
                progress = excluded.progress,
                speed = excluded.speed,
                eta = excluded.eta,
                source_peer = excluded.source_peer,
                source_filename = excluded.source_filename,
                error_message = excluded.error_message,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&d.id)
        .bind(&d.track_id)
        .bind(d.status.as_str())
        .bind(d.priority as i64)
        .bind(d.progress as i64)
        .bind(d.speed.map(|v| v as i64))
        .bind(d.eta.map(|v| v as i64))
        .bind(&d.source_peer)
        .bind(&d.source_filename)
        .bind(&d.error_message)
        .bind(d.retry_count as i64)
        .bind(d.max_retries as i64)
        .bind(d.created_at)
        .bind(d.started_at)
        .bind(d.completed_at)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Download>> {
        let sql = format!("SELECT {COLUMNS} FROM downloads WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_download))
    }

    async fn list_by_status(&self, status: DownloadStatus) -> Result<Vec<Download>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM downloads WHERE status = ?1 \
             ORDER BY priority DESC, created_at ASC, rowid ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_download).collect())
    }
}

impl LibraryDb {
    /// All downloads, newest first (CLI `status`).
    pub async fn list_downloads(&self) -> Result<Vec<Download>> {
        let sql = format!("SELECT {COLUMNS} FROM downloads ORDER BY created_at DESC, rowid DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_download).collect())
    }

    /// Normalize any download left in an active state (e.g. after a crash) to `pending`.
    /// Call before scheduling so stranded downloads are picked up again.
    /// Returns the number of downloads reset.
    pub async fn recover_active_downloads(&self) -> Result<u64> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE downloads
            SET status = 'pending',
                progress = 0,
                speed = NULL,
                eta = NULL,
                source_peer = NULL,
                source_filename = NULL,
                updated_at = ?1
            WHERE status IN ('searching', 'downloading', 'processing')
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
