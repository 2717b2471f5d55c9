//! File records.
//!
//! A file of type `Main` owns its media's lifecycle: the deletion trigger
//! cascades from the main file to the media row, which in turn cascades to
//! tracks, bookmarks and relations.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum FileType {
    Unknown = 0,
    /// The file backing the media's main content.
    Main = 1,
    Part = 2,
    Soundtrack = 3,
    Subtitles = 4,
    Playlist = 5,
    Disc = 6,
    Cache = 7,
}

impl FileType {
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => FileType::Main,
            2 => FileType::Part,
            3 => FileType::Soundtrack,
            4 => FileType::Subtitles,
            5 => FileType::Playlist,
            6 => FileType::Disc,
            7 => FileType::Cache,
            _ => FileType::Unknown,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    pub id_file: i64,
    pub media_id: Option<i64>,
    pub playlist_id: Option<i64>,
    pub mrl: String,
    pub file_type: FileType,
    pub last_modification_date: i64,
    pub size: i64,
    pub folder_id: Option<i64>,
    pub is_removable: bool,
    pub is_external: bool,
    pub is_network: bool,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS File(
            id_file INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            playlist_id INTEGER REFERENCES Playlist(id_playlist) ON DELETE CASCADE,
            mrl TEXT,
            file_type INTEGER,
            last_modification_date INTEGER,
            size INTEGER NOT NULL DEFAULT 0,
            folder_id INTEGER REFERENCES Folder(id_folder) ON DELETE CASCADE,
            is_removable BOOLEAN,
            is_external BOOLEAN NOT NULL DEFAULT 0,
            is_network BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE(mrl, folder_id) ON CONFLICT FAIL
        )",
        "CREATE INDEX IF NOT EXISTS file_media_id_idx ON File(media_id)",
        "CREATE INDEX IF NOT EXISTS file_folder_id_idx ON File(folder_id)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        // A media's lifetime is bound to its main file.
        "CREATE TRIGGER IF NOT EXISTS cascade_file_deletion
         AFTER DELETE ON File
         WHEN old.file_type = 1 AND old.media_id IS NOT NULL
         BEGIN
            DELETE FROM Media WHERE id_media = old.media_id;
         END",
    ]
}

pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        media_id: Option<i64>,
        playlist_id: Option<i64>,
        mrl: &str,
        file_type: FileType,
        folder_id: Option<i64>,
        last_modification_date: i64,
        size: i64,
        is_removable: bool,
        is_network: bool,
    ) -> Result<FileRecord> {
        let res = sqlx::query(
            "INSERT INTO File(media_id, playlist_id, mrl, file_type,
                              last_modification_date, size, folder_id,
                              is_removable, is_external, is_network)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(media_id)
        .bind(playlist_id)
        .bind(mrl)
        .bind(file_type)
        .bind(last_modification_date)
        .bind(size)
        .bind(folder_id)
        .bind(is_removable)
        .bind(is_network)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Insert a file for an externally provided media (a stream or a file
    /// outside any entry point): no folder, no device.
    pub async fn create_external(
        &self,
        media_id: i64,
        mrl: &str,
        file_type: FileType,
    ) -> Result<FileRecord> {
        let res = sqlx::query(
            "INSERT INTO File(media_id, mrl, file_type, last_modification_date, size,
                              is_removable, is_external, is_network)
             VALUES(?, ?, ?, 0, 0, 0, 1, ?)",
        )
        .bind(media_id)
        .bind(mrl)
        .bind(file_type)
        .bind(mrl.starts_with("http://") || mrl.starts_with("https://"))
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        sqlx::query_as("SELECT * FROM File WHERE id_file = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_mrl(&self, mrl: &str) -> Result<Option<FileRecord>> {
        sqlx::query_as("SELECT * FROM File WHERE mrl = ?")
            .bind(mrl)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_folder(&self, folder_id: i64) -> Result<Vec<FileRecord>> {
        sqlx::query_as("SELECT * FROM File WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Vec<FileRecord>> {
        sqlx::query_as("SELECT * FROM File WHERE media_id = ?")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn main_file(&self, media_id: i64) -> Result<Option<FileRecord>> {
        sqlx::query_as("SELECT * FROM File WHERE media_id = ? AND file_type = 1")
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn set_media_id(&self, id: i64, media_id: i64) -> Result<()> {
        sqlx::query("UPDATE File SET media_id = ? WHERE id_file = ?")
            .bind(media_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_playlist_id(&self, id: i64, playlist_id: i64) -> Result<()> {
        sqlx::query("UPDATE File SET playlist_id = ? WHERE id_file = ?")
            .bind(playlist_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn update_modification(&self, id: i64, date: i64, size: i64) -> Result<()> {
        sqlx::query("UPDATE File SET last_modification_date = ?, size = ? WHERE id_file = ?")
            .bind(date)
            .bind(size)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Delete the file row; a main file takes its media along through the
    /// deletion trigger.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM File WHERE id_file = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }
}
