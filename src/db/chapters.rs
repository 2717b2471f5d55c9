//! Chapter records.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChapterRecord {
    pub id_chapter: i64,
    pub media_id: i64,
    /// Start offset in milliseconds.
    pub offset_ms: i64,
    pub duration: i64,
    pub name: Option<String>,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Chapter(
            id_chapter INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            offset_ms INTEGER NOT NULL,
            duration INTEGER NOT NULL DEFAULT 0,
            name TEXT
        )",
        "CREATE INDEX IF NOT EXISTS chapter_media_idx ON Chapter(media_id)",
    ]
}

pub struct ChapterRepository {
    pool: SqlitePool,
}

impl ChapterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add(
        &self,
        media_id: i64,
        offset_ms: i64,
        duration: i64,
        name: Option<&str>,
    ) -> Result<ChapterRecord> {
        let res = sqlx::query(
            "INSERT INTO Chapter(media_id, offset_ms, duration, name) VALUES(?, ?, ?, ?)",
        )
        .bind(media_id)
        .bind(offset_ms)
        .bind(duration)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query_as("SELECT * FROM Chapter WHERE id_chapter = ?")
            .bind(res.last_insert_rowid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or(Error::NotFound)
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Vec<ChapterRecord>> {
        sqlx::query_as("SELECT * FROM Chapter WHERE media_id = ? ORDER BY offset_ms")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}
