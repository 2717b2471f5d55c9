//! Playlist records and the position-contiguity machinery.
//!
//! Member positions always form `0..N-1` within a playlist; every mutation
//! reestablishes that in the same transaction. The same media may appear at
//! several distinct positions. Playlists imported from a file carry the
//! backing file id and are read-only.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlaylistRecord {
    pub id_playlist: i64,
    pub name: String,
    pub file_id: Option<i64>,
    pub creation_date: i64,
    pub is_read_only: bool,
    pub nb_media: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlaylistItem {
    pub media_id: i64,
    pub position: i64,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Playlist(
            id_playlist INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE,
            file_id INTEGER REFERENCES File(id_file) ON DELETE CASCADE,
            creation_date INTEGER,
            is_read_only BOOLEAN NOT NULL DEFAULT 0,
            nb_media INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS PlaylistMediaRelation(
            playlist_id INTEGER REFERENCES Playlist(id_playlist) ON DELETE CASCADE,
            media_id INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            position INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS playlist_position_idx
            ON PlaylistMediaRelation(playlist_id, position)",
        "CREATE VIRTUAL TABLE IF NOT EXISTS PlaylistFts USING fts5(name)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS playlist_fts_insert
         AFTER INSERT ON Playlist
         BEGIN
            INSERT INTO PlaylistFts(rowid, name) VALUES(new.id_playlist, new.name);
         END",
        "CREATE TRIGGER IF NOT EXISTS playlist_fts_delete
         AFTER DELETE ON Playlist
         BEGIN
            DELETE FROM PlaylistFts WHERE rowid = old.id_playlist;
         END",
        "CREATE TRIGGER IF NOT EXISTS playlist_relation_added
         AFTER INSERT ON PlaylistMediaRelation
         BEGIN
            UPDATE Playlist SET nb_media = nb_media + 1
                WHERE id_playlist = new.playlist_id;
            UPDATE Media SET nb_playlists = nb_playlists + 1
                WHERE id_media = new.media_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS playlist_relation_removed
         AFTER DELETE ON PlaylistMediaRelation
         BEGIN
            UPDATE Playlist SET nb_media = nb_media - 1
                WHERE id_playlist = old.playlist_id;
            UPDATE Media SET nb_playlists = nb_playlists - 1
                WHERE id_media = old.media_id;
         END",
    ]
}

pub struct PlaylistRepository {
    pool: SqlitePool,
}

impl PlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<PlaylistRecord> {
        self.create_inner(name, None, false).await
    }

    /// Create a playlist backed by an imported playlist file; such
    /// playlists are read-only for the host.
    pub async fn create_from_file(&self, name: &str, file_id: i64) -> Result<PlaylistRecord> {
        self.create_inner(name, Some(file_id), true).await
    }

    async fn create_inner(
        &self,
        name: &str,
        file_id: Option<i64>,
        read_only: bool,
    ) -> Result<PlaylistRecord> {
        let res = sqlx::query(
            "INSERT INTO Playlist(name, file_id, creation_date, is_read_only)
             VALUES(?, ?, ?, ?)",
        )
        .bind(name)
        .bind(file_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(read_only)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<PlaylistRecord>> {
        sqlx::query_as("SELECT * FROM Playlist WHERE id_playlist = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_file(&self, file_id: i64) -> Result<Option<PlaylistRecord>> {
        sqlx::query_as("SELECT * FROM Playlist WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Delete a playlist. Pending link tasks targeting it are removed by
    /// trigger so a deleted playlist is never resurrected.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Playlist WHERE id_playlist = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_name(&self, id: i64, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        sqlx::query("UPDATE Playlist SET name = ? WHERE id_playlist = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        sqlx::query("UPDATE PlaylistFts SET name = ? WHERE rowid = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)
    }

    async fn member_count(tx: &mut Transaction<'_, Sqlite>, playlist_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM PlaylistMediaRelation WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::from_sqlx)
    }

    /// Append a media at the end.
    pub async fn append(&self, playlist_id: i64, media_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let count = Self::member_count(&mut tx, playlist_id).await?;
        sqlx::query(
            "INSERT INTO PlaylistMediaRelation(playlist_id, media_id, position)
             VALUES(?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(media_id)
        .bind(count)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(true)
    }

    /// Insert a media at `position`, clamped into `[0, N]`; members at or
    /// after the position shift up by one.
    pub async fn add_at(&self, playlist_id: i64, media_id: i64, position: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let count = Self::member_count(&mut tx, playlist_id).await?;
        let position = position.clamp(0, count);
        sqlx::query(
            "UPDATE PlaylistMediaRelation SET position = position + 1
             WHERE playlist_id = ? AND position >= ?",
        )
        .bind(playlist_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query(
            "INSERT INTO PlaylistMediaRelation(playlist_id, media_id, position)
             VALUES(?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(media_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(true)
    }

    /// Move the member at `from` to `to` (clamped to the last position),
    /// keeping positions contiguous.
    pub async fn move_media(&self, playlist_id: i64, from: i64, to: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let count = Self::member_count(&mut tx, playlist_id).await?;
        if count == 0 || from < 0 || from >= count {
            return Ok(false);
        }
        let to = to.clamp(0, count - 1);
        if from == to {
            return Ok(true);
        }
        let media_id: Option<i64> = sqlx::query_scalar(
            "SELECT media_id FROM PlaylistMediaRelation
             WHERE playlist_id = ? AND position = ?",
        )
        .bind(playlist_id)
        .bind(from)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        let Some(media_id) = media_id else {
            return Ok(false);
        };
        // Pull the moved row out of the way, close the gap, open a new one.
        sqlx::query(
            "DELETE FROM PlaylistMediaRelation
             WHERE playlist_id = ? AND position = ?",
        )
        .bind(playlist_id)
        .bind(from)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query(
            "UPDATE PlaylistMediaRelation SET position = position - 1
             WHERE playlist_id = ? AND position > ?",
        )
        .bind(playlist_id)
        .bind(from)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query(
            "UPDATE PlaylistMediaRelation SET position = position + 1
             WHERE playlist_id = ? AND position >= ?",
        )
        .bind(playlist_id)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query(
            "INSERT INTO PlaylistMediaRelation(playlist_id, media_id, position)
             VALUES(?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(media_id)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(true)
    }

    /// Remove the member at `position`; later members shift down.
    pub async fn remove_at(&self, playlist_id: i64, position: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let res = sqlx::query(
            "DELETE FROM PlaylistMediaRelation
             WHERE playlist_id = ? AND position = ?",
        )
        .bind(playlist_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        if res.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE PlaylistMediaRelation SET position = position - 1
             WHERE playlist_id = ? AND position > ?",
        )
        .bind(playlist_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(true)
    }

    /// Members in position order.
    pub async fn items(&self, playlist_id: i64) -> Result<Vec<PlaylistItem>> {
        sqlx::query_as(
            "SELECT media_id, position FROM PlaylistMediaRelation
             WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    pub fn media(&self, playlist_id: i64, params: &QueryParameters) -> Query<super::media::MediaRecord> {
        let mut body = String::from(
            "FROM Media m
             INNER JOIN PlaylistMediaRelation pmr ON pmr.media_id = m.id_media
             WHERE pmr.playlist_id = ?",
        );
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            "ORDER BY pmr.position ASC",
            vec![BindValue::Int(playlist_id)],
        )
    }

    pub fn listing(&self, params: &QueryParameters) -> Query<PlaylistRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::InsertionDate => {
                format!("ORDER BY p.creation_date {direction}, p.id_playlist ASC")
            }
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY p.name {direction}, p.id_playlist ASC")
            }
            other => {
                warn!(?other, "Unsupported playlist sort, falling back to Default");
                "ORDER BY p.name ASC, p.id_playlist ASC".to_string()
            }
        };
        Query::new(
            self.pool.clone(),
            "p.*",
            "FROM Playlist p",
            order_by,
            Vec::new(),
        )
    }

    pub fn search(&self, pattern: &str) -> Query<PlaylistRecord> {
        Query::new(
            self.pool.clone(),
            "p.*",
            "FROM Playlist p WHERE p.id_playlist IN
                (SELECT rowid FROM PlaylistFts WHERE PlaylistFts MATCH ?)",
            "ORDER BY p.name ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }

    pub async fn all(&self) -> Result<Vec<PlaylistRecord>> {
        sqlx::query_as("SELECT * FROM Playlist ORDER BY id_playlist")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}
