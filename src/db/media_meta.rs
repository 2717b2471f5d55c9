//! Per-media key/value metadata store.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

/// Keys of the per-media metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i64)]
pub enum MetadataKey {
    Title = 0,
    ArtworkUrl = 1,
    ShowName = 2,
    Episode = 3,
    Album = 4,
    Genre = 5,
    Date = 6,
    AlbumArtist = 7,
    Artist = 8,
    TrackNumber = 9,
    DiscNumber = 10,
    DiscTotal = 11,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS MediaMetadata(
            id_media INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            type INTEGER,
            value TEXT,
            PRIMARY KEY(id_media, type)
        )",
    ]
}

pub struct MediaMetadataRepository {
    pool: SqlitePool,
}

impl MediaMetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(&self, media_id: i64, key: MetadataKey, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO MediaMetadata(id_media, type, value) VALUES(?, ?, ?)
             ON CONFLICT(id_media, type) DO UPDATE SET value = excluded.value",
        )
        .bind(media_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn get(&self, media_id: i64, key: MetadataKey) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM MediaMetadata WHERE id_media = ? AND type = ?")
            .bind(media_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn unset(&self, media_id: i64, key: MetadataKey) -> Result<()> {
        sqlx::query("DELETE FROM MediaMetadata WHERE id_media = ? AND type = ?")
            .bind(media_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
