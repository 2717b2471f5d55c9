//! Album records.
//!
//! Track counts, present-track counts and cumulated duration are derived
//! and maintained by triggers on the media table; an album that loses its
//! last track is deleted by trigger as well.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlbumRecord {
    pub id_album: i64,
    pub title: String,
    pub artist_id: Option<i64>,
    pub release_year: Option<i64>,
    pub short_summary: Option<String>,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
    pub nb_discs: i64,
    pub duration: i64,
    pub is_favorite: bool,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Album(
            id_album INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT COLLATE NOCASE,
            artist_id INTEGER REFERENCES Artist(id_artist) ON DELETE SET NULL,
            release_year INTEGER,
            short_summary TEXT,
            nb_tracks INTEGER NOT NULL DEFAULT 0,
            nb_present_tracks INTEGER NOT NULL DEFAULT 0,
            nb_discs INTEGER NOT NULL DEFAULT 1,
            duration INTEGER NOT NULL DEFAULT 0,
            is_favorite BOOLEAN NOT NULL DEFAULT 0
        )",
        "CREATE INDEX IF NOT EXISTS album_artist_id_idx ON Album(artist_id)",
        "CREATE VIRTUAL TABLE IF NOT EXISTS AlbumFts USING fts5(title)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS album_fts_insert
         AFTER INSERT ON Album
         BEGIN
            INSERT INTO AlbumFts(rowid, title) VALUES(new.id_album, new.title);
         END",
        "CREATE TRIGGER IF NOT EXISTS album_fts_delete
         AFTER DELETE ON Album
         BEGIN
            DELETE FROM AlbumFts WHERE rowid = old.id_album;
         END",
        // Track attach/detach: the media row's album_id is the single
        // source of truth, the counters follow it.
        "CREATE TRIGGER IF NOT EXISTS album_track_attached
         AFTER UPDATE OF album_id ON Media
         WHEN new.album_id IS NOT NULL AND IFNULL(old.album_id, -1) != new.album_id
         BEGIN
            UPDATE Album SET
                nb_tracks = nb_tracks + 1,
                nb_present_tracks = nb_present_tracks + new.is_present,
                duration = duration + MAX(new.duration, 0)
            WHERE id_album = new.album_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS album_track_detached
         AFTER UPDATE OF album_id ON Media
         WHEN old.album_id IS NOT NULL AND IFNULL(new.album_id, -1) != old.album_id
         BEGIN
            UPDATE Album SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present,
                duration = duration - MAX(old.duration, 0)
            WHERE id_album = old.album_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS album_track_deleted
         AFTER DELETE ON Media
         WHEN old.album_id IS NOT NULL
         BEGIN
            UPDATE Album SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present,
                duration = duration - MAX(old.duration, 0)
            WHERE id_album = old.album_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS album_track_presence
         AFTER UPDATE OF is_present ON Media
         WHEN new.album_id IS NOT NULL AND old.is_present != new.is_present
         BEGIN
            UPDATE Album SET
                nb_present_tracks = nb_present_tracks + (new.is_present - old.is_present)
            WHERE id_album = new.album_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS album_delete_empty
         AFTER UPDATE OF nb_tracks ON Album
         WHEN new.nb_tracks = 0
         BEGIN
            DELETE FROM Album WHERE id_album = new.id_album;
         END",
    ]
}

pub struct AlbumRepository {
    pool: SqlitePool,
}

impl AlbumRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, title: &str, artist_id: Option<i64>) -> Result<AlbumRecord> {
        let res = sqlx::query("INSERT INTO Album(title, artist_id) VALUES(?, ?)")
            .bind(title)
            .bind(artist_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<AlbumRecord>> {
        sqlx::query_as("SELECT * FROM Album WHERE id_album = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Fetch an album by title and album artist, the key the analysis
    /// service deduplicates on.
    pub async fn by_title_and_artist(
        &self,
        title: &str,
        artist_id: i64,
    ) -> Result<Option<AlbumRecord>> {
        sqlx::query_as("SELECT * FROM Album WHERE title = ? AND artist_id = ?")
            .bind(title)
            .bind(artist_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn set_release_year(&self, id: i64, year: i64) -> Result<()> {
        sqlx::query("UPDATE Album SET release_year = ? WHERE id_album = ?")
            .bind(year)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn update_nb_discs(&self, id: i64, nb_discs: i64) -> Result<()> {
        sqlx::query("UPDATE Album SET nb_discs = MAX(nb_discs, ?) WHERE id_album = ?")
            .bind(nb_discs)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Albums listing. Default order is release year descending then title
    /// ascending.
    pub fn listing(&self, params: &QueryParameters) -> Query<AlbumRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::Alpha => format!("ORDER BY a.title {direction}, a.id_album ASC"),
            SortingCriteria::Duration => {
                format!("ORDER BY a.duration {direction}, a.id_album ASC")
            }
            SortingCriteria::ReleaseDate => {
                format!("ORDER BY a.release_year {direction}, a.title ASC, a.id_album ASC")
            }
            SortingCriteria::Artist => format!(
                "ORDER BY (SELECT name FROM Artist WHERE id_artist = a.artist_id) {direction},
                 a.title ASC, a.id_album ASC"
            ),
            SortingCriteria::Default => {
                "ORDER BY a.release_year DESC, a.title ASC, a.id_album ASC".to_string()
            }
            other => {
                warn!(?other, "Unsupported album sort, falling back to Default");
                "ORDER BY a.release_year DESC, a.title ASC, a.id_album ASC".to_string()
            }
        };
        let mut body = String::from("FROM Album a WHERE 1");
        if !params.include_missing {
            body.push_str(" AND a.nb_present_tracks > 0");
        }
        Query::new(self.pool.clone(), "a.*", body, order_by, Vec::new())
    }

    pub fn by_artist(&self, artist_id: i64, params: &QueryParameters) -> Query<AlbumRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::Alpha => format!("ORDER BY a.title {direction}, a.id_album ASC"),
            _ => format!("ORDER BY a.release_year {direction}, a.title ASC, a.id_album ASC"),
        };
        let mut body = String::from("FROM Album a WHERE a.artist_id = ?");
        if !params.include_missing {
            body.push_str(" AND a.nb_present_tracks > 0");
        }
        Query::new(
            self.pool.clone(),
            "a.*",
            body,
            order_by,
            vec![BindValue::Int(artist_id)],
        )
    }

    pub fn search(&self, pattern: &str) -> Query<AlbumRecord> {
        Query::new(
            self.pool.clone(),
            "a.*",
            "FROM Album a WHERE a.id_album IN
                (SELECT rowid FROM AlbumFts WHERE AlbumFts MATCH ?)",
            "ORDER BY a.title ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Album WHERE id_album = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }
}
