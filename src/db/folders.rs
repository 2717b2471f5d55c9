//! Folder records, ban/unban, and per-folder media counters.
//!
//! `path` is relative to the device mountpoint for removable devices and a
//! full MRL otherwise. `(device_id, path)` is unique among discoverable
//! folders; banned folders live in the parallel `BannedFolder` table so a
//! banned path can never collide with a live one.

use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FolderRecord {
    pub id_folder: i64,
    pub path: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub device_id: i64,
    pub is_removable: bool,
    pub nb_audio: i64,
    pub nb_video: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BannedFolderRecord {
    pub id_folder: i64,
    pub path: String,
    pub device_id: i64,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Folder(
            id_folder INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT,
            name TEXT COLLATE NOCASE,
            parent_id INTEGER REFERENCES Folder(id_folder) ON DELETE CASCADE,
            device_id INTEGER REFERENCES Device(id_device) ON DELETE CASCADE,
            is_removable BOOLEAN,
            nb_audio INTEGER NOT NULL DEFAULT 0,
            nb_video INTEGER NOT NULL DEFAULT 0,
            UNIQUE(path, device_id) ON CONFLICT FAIL
        )",
        "CREATE TABLE IF NOT EXISTS BannedFolder(
            id_folder INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT,
            device_id INTEGER REFERENCES Device(id_device) ON DELETE CASCADE,
            UNIQUE(path, device_id) ON CONFLICT FAIL
        )",
        "CREATE INDEX IF NOT EXISTS folder_device_id_idx ON Folder(device_id)",
        "CREATE INDEX IF NOT EXISTS parent_folder_id_idx ON Folder(parent_id)",
        "CREATE VIRTUAL TABLE IF NOT EXISTS FolderFts USING fts5(name)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS folder_fts_insert
         AFTER INSERT ON Folder
         BEGIN
            INSERT INTO FolderFts(rowid, name) VALUES(new.id_folder, new.name);
         END",
        "CREATE TRIGGER IF NOT EXISTS folder_fts_delete
         AFTER DELETE ON Folder
         BEGIN
            DELETE FROM FolderFts WHERE rowid = old.id_folder;
         END",
        // Per-folder media counters. Media type: 1 = video, 2 = audio.
        "CREATE TRIGGER IF NOT EXISTS folder_media_added
         AFTER INSERT ON Media
         WHEN new.folder_id IS NOT NULL
         BEGIN
            UPDATE Folder SET nb_audio = nb_audio + 1
                WHERE id_folder = new.folder_id AND new.type = 2;
            UPDATE Folder SET nb_video = nb_video + 1
                WHERE id_folder = new.folder_id AND new.type = 1;
         END",
        "CREATE TRIGGER IF NOT EXISTS folder_media_removed
         AFTER DELETE ON Media
         WHEN old.folder_id IS NOT NULL
         BEGIN
            UPDATE Folder SET nb_audio = nb_audio - 1
                WHERE id_folder = old.folder_id AND old.type = 2;
            UPDATE Folder SET nb_video = nb_video - 1
                WHERE id_folder = old.folder_id AND old.type = 1;
         END",
        "CREATE TRIGGER IF NOT EXISTS folder_media_type_changed
         AFTER UPDATE OF type ON Media
         WHEN new.folder_id IS NOT NULL AND old.type != new.type
         BEGIN
            UPDATE Folder SET nb_audio = nb_audio - 1
                WHERE id_folder = new.folder_id AND old.type = 2;
            UPDATE Folder SET nb_video = nb_video - 1
                WHERE id_folder = new.folder_id AND old.type = 1;
            UPDATE Folder SET nb_audio = nb_audio + 1
                WHERE id_folder = new.folder_id AND new.type = 2;
            UPDATE Folder SET nb_video = nb_video + 1
                WHERE id_folder = new.folder_id AND new.type = 1;
         END",
    ]
}

pub struct FolderRepository {
    pool: SqlitePool,
}

impl FolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        path: &str,
        name: &str,
        parent_id: Option<i64>,
        device_id: i64,
        is_removable: bool,
    ) -> Result<FolderRecord> {
        let res = sqlx::query(
            "INSERT INTO Folder(path, name, parent_id, device_id, is_removable)
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(path)
        .bind(name)
        .bind(parent_id)
        .bind(device_id)
        .bind(is_removable)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<FolderRecord>> {
        sqlx::query_as("SELECT * FROM Folder WHERE id_folder = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_path(&self, device_id: i64, path: &str) -> Result<Option<FolderRecord>> {
        sqlx::query_as("SELECT * FROM Folder WHERE device_id = ? AND path = ?")
            .bind(device_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Folders with no parent: the entry points.
    pub async fn roots(&self) -> Result<Vec<FolderRecord>> {
        sqlx::query_as("SELECT * FROM Folder WHERE parent_id IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn children(&self, id: i64) -> Result<Vec<FolderRecord>> {
        sqlx::query_as("SELECT * FROM Folder WHERE parent_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// True when the folder's device is currently present.
    pub async fn is_present(&self, id: i64) -> Result<bool> {
        let present: Option<bool> = sqlx::query_scalar(
            "SELECT d.is_present FROM Device d
             INNER JOIN Folder f ON f.device_id = d.id_device
             WHERE f.id_folder = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(present.unwrap_or(false))
    }

    /// Delete the folder row; children, files, media and tasks follow
    /// through foreign keys and triggers.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Folder WHERE id_folder = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    /// Move a folder to the banned table, pruning its subtree from
    /// discovery, in one transaction.
    pub async fn ban(&self, device_id: i64, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id_folder FROM Folder WHERE device_id = ? AND path = ?")
                .bind(device_id)
                .bind(path)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        if let Some((id,)) = existing {
            sqlx::query("DELETE FROM Folder WHERE id_folder = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        }
        let res = sqlx::query(
            "INSERT INTO BannedFolder(path, device_id) VALUES(?, ?)
             ON CONFLICT(path, device_id) DO NOTHING",
        )
        .bind(path)
        .bind(device_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    /// Remove the ban. Pruned rows are not recreated; a subsequent reload
    /// rediscovers them.
    pub async fn unban(&self, device_id: i64, path: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM BannedFolder WHERE device_id = ? AND path = ?")
            .bind(device_id)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn is_banned(&self, device_id: i64, path: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id_folder FROM BannedFolder WHERE device_id = ? AND path = ?")
                .bind(device_id)
                .bind(path)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from_sqlx)?;
        Ok(row.is_some())
    }

    pub async fn banned(&self) -> Result<Vec<BannedFolderRecord>> {
        sqlx::query_as("SELECT * FROM BannedFolder")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Listing for the host. Supports Alpha, NbAudio, NbVideo and NbMedia
    /// sorts; anything else degrades to Alpha.
    pub fn listing(&self, params: &QueryParameters) -> Query<FolderRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::NbAudio => format!("ORDER BY f.nb_audio {direction}"),
            SortingCriteria::NbVideo => format!("ORDER BY f.nb_video {direction}"),
            SortingCriteria::NbMedia => {
                format!("ORDER BY (f.nb_audio + f.nb_video) {direction}")
            }
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY f.name {direction}, f.id_folder {direction}")
            }
            other => {
                tracing::warn!(?other, "Unsupported folder sort, falling back to Default");
                "ORDER BY f.name ASC, f.id_folder ASC".to_string()
            }
        };
        let mut body = String::from("FROM Folder f");
        if !params.include_missing {
            body.push_str(
                " INNER JOIN Device d ON d.id_device = f.device_id WHERE d.is_present = 1",
            );
        }
        Query::new(self.pool.clone(), "f.*", body, order_by, Vec::<BindValue>::new())
    }

    pub fn search(&self, pattern: &str) -> Query<FolderRecord> {
        Query::new(
            self.pool.clone(),
            "f.*",
            "FROM Folder f WHERE f.id_folder IN
                (SELECT rowid FROM FolderFts WHERE FolderFts MATCH ?)",
            "ORDER BY f.name ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }
}
