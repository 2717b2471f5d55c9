//! Thumbnail records and the linking table.
//!
//! Thumbnails are shared across entities through `ThumbnailLinking`; the
//! `shared_counter` is maintained by triggers and a row whose counter drops
//! to zero is deleted by trigger. The copy-on-write protocol for shared
//! rows lives in [`crate::thumbnails`]; this module only provides the
//! storage primitives.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum ThumbnailOrigin {
    UserProvided = 0,
    CoverFile = 1,
    Media = 2,
    AlbumArtist = 3,
    Artist = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i64)]
pub enum ThumbnailSizeType {
    Thumbnail = 0,
    Banner = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum ThumbnailStatus {
    Missing = 0,
    Available = 1,
    Failure = 2,
    Crash = 3,
    Persistent = 4,
}

/// Entity kinds a thumbnail can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum ThumbnailedEntity {
    Media = 0,
    Album = 1,
    Artist = 2,
    Genre = 3,
    Playlist = 4,
    Show = 5,
    MediaGroup = 6,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThumbnailRecord {
    pub id_thumbnail: i64,
    pub mrl: String,
    pub origin: ThumbnailOrigin,
    pub size_type: ThumbnailSizeType,
    pub is_owned: bool,
    pub status: ThumbnailStatus,
    pub nb_attempts: i64,
    pub shared_counter: i64,
    pub file_size: i64,
}

impl ThumbnailRecord {
    pub fn is_shared(&self) -> bool {
        self.shared_counter > 1
    }
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Thumbnail(
            id_thumbnail INTEGER PRIMARY KEY AUTOINCREMENT,
            mrl TEXT,
            origin INTEGER NOT NULL,
            size_type INTEGER NOT NULL DEFAULT 0,
            is_owned BOOLEAN NOT NULL DEFAULT 0,
            status INTEGER NOT NULL DEFAULT 1,
            nb_attempts INTEGER NOT NULL DEFAULT 0,
            shared_counter INTEGER NOT NULL DEFAULT 0,
            file_size INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS ThumbnailLinking(
            entity_id INTEGER,
            entity_type INTEGER,
            size_type INTEGER,
            thumbnail_id INTEGER REFERENCES Thumbnail(id_thumbnail),
            PRIMARY KEY(entity_id, entity_type, size_type)
        )",
        "CREATE INDEX IF NOT EXISTS thumbnail_link_id_idx ON ThumbnailLinking(thumbnail_id)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS thumbnail_link_counter_inc
         AFTER INSERT ON ThumbnailLinking
         BEGIN
            UPDATE Thumbnail SET shared_counter = shared_counter + 1
                WHERE id_thumbnail = new.thumbnail_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS thumbnail_link_counter_dec
         AFTER DELETE ON ThumbnailLinking
         BEGIN
            UPDATE Thumbnail SET shared_counter = shared_counter - 1
                WHERE id_thumbnail = old.thumbnail_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS thumbnail_link_counter_swap
         AFTER UPDATE OF thumbnail_id ON ThumbnailLinking
         WHEN old.thumbnail_id != new.thumbnail_id
         BEGIN
            UPDATE Thumbnail SET shared_counter = shared_counter - 1
                WHERE id_thumbnail = old.thumbnail_id;
            UPDATE Thumbnail SET shared_counter = shared_counter + 1
                WHERE id_thumbnail = new.thumbnail_id;
         END",
        // Unreferenced thumbnails disappear; deleting the backing file when
        // owned is the manager's job and happens before the last unlink.
        "CREATE TRIGGER IF NOT EXISTS thumbnail_delete_unreferenced
         AFTER UPDATE OF shared_counter ON Thumbnail
         WHEN new.shared_counter = 0 AND old.shared_counter > 0
         BEGIN
            DELETE FROM Thumbnail WHERE id_thumbnail = new.id_thumbnail;
         END",
    ]
}

pub struct ThumbnailRepository {
    pool: SqlitePool,
}

impl ThumbnailRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        mrl: &str,
        origin: ThumbnailOrigin,
        size_type: ThumbnailSizeType,
        is_owned: bool,
        status: ThumbnailStatus,
    ) -> Result<ThumbnailRecord> {
        let res = sqlx::query(
            "INSERT INTO Thumbnail(mrl, origin, size_type, is_owned, status)
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(mrl)
        .bind(origin)
        .bind(size_type)
        .bind(is_owned)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<ThumbnailRecord>> {
        sqlx::query_as("SELECT * FROM Thumbnail WHERE id_thumbnail = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// A reusable row with the same MRL and size, if one exists.
    pub async fn by_mrl(
        &self,
        mrl: &str,
        size_type: ThumbnailSizeType,
    ) -> Result<Option<ThumbnailRecord>> {
        sqlx::query_as("SELECT * FROM Thumbnail WHERE mrl = ? AND size_type = ?")
            .bind(mrl)
            .bind(size_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// The thumbnail currently linked to an entity for a size, if any.
    pub async fn for_entity(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
    ) -> Result<Option<ThumbnailRecord>> {
        sqlx::query_as(
            "SELECT t.* FROM Thumbnail t
             INNER JOIN ThumbnailLinking l ON l.thumbnail_id = t.id_thumbnail
             WHERE l.entity_id = ? AND l.entity_type = ? AND l.size_type = ?",
        )
        .bind(entity_id)
        .bind(entity)
        .bind(size_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    /// Link an entity to a thumbnail, replacing any previous link for the
    /// same size. The counters follow through triggers.
    pub async fn link(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
        thumbnail_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ThumbnailLinking(entity_id, entity_type, size_type, thumbnail_id)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(entity_id, entity_type, size_type)
                DO UPDATE SET thumbnail_id = excluded.thumbnail_id",
        )
        .bind(entity_id)
        .bind(entity)
        .bind(size_type)
        .bind(thumbnail_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Remove the entity's link for a size. Returns the previously linked
    /// thumbnail id, if any.
    pub async fn unlink(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
    ) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let previous: Option<i64> = sqlx::query_scalar(
            "SELECT thumbnail_id FROM ThumbnailLinking
             WHERE entity_id = ? AND entity_type = ? AND size_type = ?",
        )
        .bind(entity_id)
        .bind(entity)
        .bind(size_type)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query(
            "DELETE FROM ThumbnailLinking
             WHERE entity_id = ? AND entity_type = ? AND size_type = ?",
        )
        .bind(entity_id)
        .bind(entity)
        .bind(size_type)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(previous)
    }

    /// In-place update of an unshared row.
    pub async fn update(
        &self,
        id: i64,
        mrl: &str,
        origin: ThumbnailOrigin,
        is_owned: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE Thumbnail SET mrl = ?, origin = ?, is_owned = ?, status = ?
             WHERE id_thumbnail = ?",
        )
        .bind(mrl)
        .bind(origin)
        .bind(is_owned)
        .bind(ThumbnailStatus::Available)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_status(&self, id: i64, status: ThumbnailStatus) -> Result<()> {
        sqlx::query(
            "UPDATE Thumbnail SET status = ?, nb_attempts = nb_attempts + 1
             WHERE id_thumbnail = ?",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// MRLs of owned thumbnails that only user-provided linkings keep
    /// alive; fetched before a flush so the files can be unlinked on disk.
    pub async fn user_provided_owned_mrls(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT mrl FROM Thumbnail WHERE origin = 0 AND is_owned = 1",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(rows.into_iter().map(|(mrl,)| mrl).collect())
    }

    /// Drop every linking row whose thumbnail was provided by the user;
    /// unreferenced thumbnails are then collected by trigger.
    pub async fn flush_user_provided(&self) -> Result<()> {
        sqlx::query(
            "DELETE FROM ThumbnailLinking WHERE thumbnail_id IN
                (SELECT id_thumbnail FROM Thumbnail WHERE origin = 0)",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
