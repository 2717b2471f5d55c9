//! Bookmark records: named positions inside a media. `(media_id, time)` is
//! unique; bookmarks follow their media on deletion.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookmarkRecord {
    pub id_bookmark: i64,
    pub media_id: i64,
    pub time: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub creation_date: i64,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Bookmark(
            id_bookmark INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            time INTEGER,
            name TEXT,
            description TEXT,
            creation_date INTEGER,
            UNIQUE(media_id, time) ON CONFLICT FAIL
        )",
    ]
}

pub struct BookmarkRepository {
    pool: SqlitePool,
}

impl BookmarkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, media_id: i64, time: i64) -> Result<BookmarkRecord> {
        let res = sqlx::query(
            "INSERT INTO Bookmark(media_id, time, creation_date) VALUES(?, ?, ?)",
        )
        .bind(media_id)
        .bind(time)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<BookmarkRecord>> {
        sqlx::query_as("SELECT * FROM Bookmark WHERE id_bookmark = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Vec<BookmarkRecord>> {
        sqlx::query_as("SELECT * FROM Bookmark WHERE media_id = ? ORDER BY time")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn set_name(&self, id: i64, name: &str) -> Result<()> {
        sqlx::query("UPDATE Bookmark SET name = ? WHERE id_bookmark = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_description(&self, id: i64, description: &str) -> Result<()> {
        sqlx::query("UPDATE Bookmark SET description = ? WHERE id_bookmark = ?")
            .bind(description)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Move a bookmark to another time; fails with a unique-constraint
    /// error if one already exists there.
    pub async fn move_to(&self, id: i64, time: i64) -> Result<()> {
        sqlx::query("UPDATE Bookmark SET time = ? WHERE id_bookmark = ?")
            .bind(time)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Bookmark WHERE id_bookmark = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_for_media(&self, media_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM Bookmark WHERE media_id = ?")
            .bind(media_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
