//! Persistent parser tasks.
//!
//! A task is one unit of parsing work: create an entity from a new file,
//! refresh a changed one, link a playlist member, or restore a backup
//! entry. Tasks are unique per `(mrl, type, link_to_id, link_to_type,
//! link_extra)` so duplicate discoveries fail with a unique-constraint
//! error and become no-ops at the call site.

use sqlx::SqlitePool;

use crate::db::files::FileType;
use crate::error::{Error, Result};

/// How many times a task may be retried before being given up on.
pub const MAX_NB_RETRIES: i64 = 1;

/// Parser step bitset persisted in `Task.step`.
pub mod step {
    pub const NONE: i64 = 0;
    pub const METADATA_EXTRACTION: i64 = 1;
    pub const METADATA_ANALYSIS: i64 = 2;
    pub const LINKING: i64 = 4;
    pub const THUMBNAILER: i64 = 8;
    /// The steps whose completion is persisted; a task carrying them all is
    /// done.
    pub const COMPLETED: i64 = METADATA_ANALYSIS | LINKING;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum TaskType {
    Creation = 0,
    Link = 1,
    Refresh = 2,
    Restore = 3,
}

/// What a link task's target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum LinkType {
    NoLink = 0,
    Playlist = 1,
    Media = 2,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRecord {
    pub id_task: i64,
    pub step: i64,
    pub retry_count: i64,
    pub task_type: TaskType,
    pub mrl: String,
    pub file_type: FileType,
    pub file_id: Option<i64>,
    pub parent_folder_id: Option<i64>,
    pub link_to_id: i64,
    pub link_to_type: LinkType,
    pub link_extra: i64,
}

impl TaskRecord {
    pub fn is_step_completed(&self, step: i64) -> bool {
        self.step & step == step
    }

    pub fn is_completed(&self) -> bool {
        self.step & step::COMPLETED == step::COMPLETED
    }
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Task(
            id_task INTEGER PRIMARY KEY AUTOINCREMENT,
            step INTEGER NOT NULL DEFAULT 0,
            retry_count INTEGER NOT NULL DEFAULT 0,
            task_type INTEGER NOT NULL,
            mrl TEXT,
            file_type INTEGER NOT NULL DEFAULT 0,
            file_id INTEGER REFERENCES File(id_file) ON DELETE CASCADE,
            parent_folder_id INTEGER REFERENCES Folder(id_folder) ON DELETE CASCADE,
            link_to_id INTEGER NOT NULL DEFAULT 0,
            link_to_type INTEGER NOT NULL DEFAULT 0,
            link_extra INTEGER NOT NULL DEFAULT 0,
            UNIQUE(mrl, task_type, link_to_id, link_to_type, link_extra) ON CONFLICT FAIL
        )",
        "CREATE INDEX IF NOT EXISTS task_parent_folder_idx ON Task(parent_folder_id)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        // Never resurrect links into a deleted playlist.
        "CREATE TRIGGER IF NOT EXISTS delete_playlist_linking_tasks
         AFTER DELETE ON Playlist
         BEGIN
            DELETE FROM Task
                WHERE link_to_type = 1 AND link_to_id = old.id_playlist AND task_type = 1;
         END",
    ]
}

pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Task for a newly discovered file.
    pub async fn create(
        &self,
        mrl: &str,
        file_type: FileType,
        parent_folder_id: i64,
    ) -> Result<TaskRecord> {
        let res = sqlx::query(
            "INSERT INTO Task(task_type, mrl, file_type, parent_folder_id)
             VALUES(?, ?, ?, ?)",
        )
        .bind(TaskType::Creation)
        .bind(mrl)
        .bind(file_type)
        .bind(parent_folder_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Task refreshing a known file whose modification date changed.
    pub async fn create_refresh(
        &self,
        mrl: &str,
        file_id: i64,
        file_type: FileType,
        parent_folder_id: i64,
    ) -> Result<TaskRecord> {
        let res = sqlx::query(
            "INSERT INTO Task(task_type, mrl, file_type, file_id, parent_folder_id)
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(TaskType::Refresh)
        .bind(mrl)
        .bind(file_type)
        .bind(file_id)
        .bind(parent_folder_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Task linking an entity (by MRL) to a parent playlist or media.
    pub async fn create_link(
        &self,
        mrl: &str,
        file_type: FileType,
        link_to_id: i64,
        link_to_type: LinkType,
        link_extra: i64,
    ) -> Result<TaskRecord> {
        let res = sqlx::query(
            "INSERT INTO Task(task_type, mrl, file_type, link_to_id, link_to_type, link_extra)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(TaskType::Link)
        .bind(mrl)
        .bind(file_type)
        .bind(link_to_id)
        .bind(link_to_type)
        .bind(link_extra)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Task replaying a playlist entry from a backup.
    pub async fn create_restore(&self, mrl: &str, file_type: FileType) -> Result<TaskRecord> {
        let res = sqlx::query("INSERT INTO Task(task_type, mrl, file_type) VALUES(?, ?, ?)")
            .bind(TaskType::Restore)
            .bind(mrl)
            .bind(file_type)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<TaskRecord>> {
        sqlx::query_as("SELECT * FROM Task WHERE id_task = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Every restorable task: uncompleted, retries left, and either not
    /// tied to a file or tied to one whose device is present. Ordered by
    /// parent folder so tasks of one directory stay together.
    pub async fn fetch_uncompleted(&self) -> Result<Vec<TaskRecord>> {
        sqlx::query_as(
            "SELECT t.* FROM Task t
             LEFT JOIN File f ON f.id_file = t.file_id
             LEFT JOIN Folder fol ON fol.id_folder = f.folder_id
             LEFT JOIN Device d ON d.id_device = fol.device_id
             WHERE t.step & ? != ?
               AND t.retry_count <= ?
               AND (d.is_present != 0 OR t.file_id IS NULL)
             ORDER BY t.parent_folder_id",
        )
        .bind(step::COMPLETED)
        .bind(step::COMPLETED)
        .bind(MAX_NB_RETRIES)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    pub async fn pending_for_playlist(&self, playlist_id: i64) -> Result<Vec<TaskRecord>> {
        sqlx::query_as(
            "SELECT * FROM Task WHERE task_type = 1 AND link_to_type = 1 AND link_to_id = ?",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    /// Persist completion of `step_flag` (OR'd into the bitset).
    pub async fn save_step(&self, id: i64, step_flag: i64) -> Result<()> {
        sqlx::query("UPDATE Task SET step = step | ? WHERE id_task = ?")
            .bind(step_flag)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_file_id(&self, id: i64, file_id: i64) -> Result<()> {
        sqlx::query("UPDATE Task SET file_id = ? WHERE id_task = ?")
            .bind(file_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn increment_retry_count(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE Task SET retry_count = retry_count + 1 WHERE id_task = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Undo one retry increment without resetting the counter; the
    /// extraction step uses this so an extract/analyze crash loop still
    /// exhausts the retry budget.
    pub async fn decrement_retry_count(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE Task SET retry_count = MAX(retry_count - 1, 0) WHERE id_task = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn reset_retry_count(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE Task SET retry_count = 0 WHERE id_task = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn destroy(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Task WHERE id_task = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    /// Remove every pending task. Used by the forced rescan.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM Task")
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
