//! Track rows: the catalog the CLI registers artist/title pairs in.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;

use super::db::LibraryDb;
use crate::catalog::TrackCatalog;
use crate::clock::unix_timestamp;
use crate::matching::WantedTrack;

impl LibraryDb {
    /// Insert a track and return its new id.
    pub async fn add_track(&self, track: &WantedTrack) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO tracks (id, artist, title, album, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(&track.artist)
        .bind(&track.title)
        .bind(&track.album)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_track(&self, id: &str) -> Result<Option<WantedTrack>> {
        let row = sqlx::query("SELECT artist, title, album FROM tracks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| WantedTrack {
            artist: row.get("artist"),
            title: row.get("title"),
            album: row.get("album"),
        }))
    }
}

#[async_trait]
impl TrackCatalog for LibraryDb {
    async fn lookup(&self, track_id: &str) -> Result<Option<WantedTrack>> {
        self.get_track(track_id).await
    }
}
