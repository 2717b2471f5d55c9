//! Label records and their media relation.
//!
//! The media FTS row carries a space-separated list of label names so text
//! search reaches labels; the link/unlink triggers keep it in sync.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LabelRecord {
    pub id_label: i64,
    pub name: String,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Label(
            id_label INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE ON CONFLICT FAIL
        )",
        "CREATE TABLE IF NOT EXISTS LabelMediaRelation(
            label_id INTEGER REFERENCES Label(id_label) ON DELETE CASCADE,
            media_id INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            PRIMARY KEY(label_id, media_id)
        )",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS label_fts_on_link
         AFTER INSERT ON LabelMediaRelation
         BEGIN
            UPDATE MediaFts SET labels = TRIM(labels || ' ' ||
                (SELECT name FROM Label WHERE id_label = new.label_id))
            WHERE rowid = new.media_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS label_fts_on_unlink
         AFTER DELETE ON LabelMediaRelation
         BEGIN
            UPDATE MediaFts SET labels = TRIM(REPLACE(' ' || labels || ' ',
                ' ' || (SELECT name FROM Label WHERE id_label = old.label_id) || ' ', ' '))
            WHERE rowid = old.media_id;
         END",
    ]
}

pub struct LabelRepository {
    pool: SqlitePool,
}

impl LabelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<LabelRecord> {
        let res = sqlx::query("INSERT INTO Label(name) VALUES(?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<LabelRecord>> {
        sqlx::query_as("SELECT * FROM Label WHERE id_label = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<LabelRecord>> {
        sqlx::query_as("SELECT * FROM Label WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn attach(&self, label_id: i64, media_id: i64) -> Result<bool> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO LabelMediaRelation(label_id, media_id) VALUES(?, ?)",
        )
        .bind(label_id)
        .bind(media_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn detach(&self, label_id: i64, media_id: i64) -> Result<bool> {
        let res =
            sqlx::query("DELETE FROM LabelMediaRelation WHERE label_id = ? AND media_id = ?")
                .bind(label_id)
                .bind(media_id)
                .execute(&self.pool)
                .await
                .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Vec<LabelRecord>> {
        sqlx::query_as(
            "SELECT l.* FROM Label l
             INNER JOIN LabelMediaRelation lmr ON lmr.label_id = l.id_label
             WHERE lmr.media_id = ?
             ORDER BY l.name",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        // Unlink first so the FTS triggers see each relation go away.
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let media_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT media_id FROM LabelMediaRelation WHERE label_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        for (media_id,) in media_ids {
            sqlx::query("DELETE FROM LabelMediaRelation WHERE label_id = ? AND media_id = ?")
                .bind(id)
                .bind(media_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        }
        let res = sqlx::query("DELETE FROM Label WHERE id_label = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }
}
