//! Movie records: the subtype row for media classified as movies.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovieRecord {
    pub id_movie: i64,
    pub media_id: i64,
    pub summary: Option<String>,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Movie(
            id_movie INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            summary TEXT
        )",
        "CREATE INDEX IF NOT EXISTS movie_media_idx ON Movie(media_id)",
    ]
}

pub struct MovieRepository {
    pool: SqlitePool,
}

impl MovieRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, media_id: i64) -> Result<MovieRecord> {
        let res = sqlx::query("INSERT INTO Movie(media_id) VALUES(?)")
            .bind(media_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        sqlx::query_as("SELECT * FROM Movie WHERE id_movie = ?")
            .bind(res.last_insert_rowid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or(Error::NotFound)
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Option<MovieRecord>> {
        sqlx::query_as("SELECT * FROM Movie WHERE media_id = ?")
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}
