//! Artist records.
//!
//! Two distinguished rows are seeded at schema creation: the unknown
//! artist (id 1) collects tracks with no artist tag, the various-artists
//! row (id 2) fronts compilation albums. Neither is ever auto-deleted.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

/// Reserved id for the unknown artist.
pub const UNKNOWN_ARTIST_ID: i64 = 1;
/// Reserved id for the various-artists placeholder.
pub const VARIOUS_ARTIST_ID: i64 = 2;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtistRecord {
    pub id_artist: i64,
    pub name: Option<String>,
    pub shortbio: Option<String>,
    pub nb_albums: i64,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
    pub is_favorite: bool,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Artist(
            id_artist INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE UNIQUE ON CONFLICT FAIL,
            shortbio TEXT,
            nb_albums INTEGER NOT NULL DEFAULT 0,
            nb_tracks INTEGER NOT NULL DEFAULT 0,
            nb_present_tracks INTEGER NOT NULL DEFAULT 0,
            is_favorite BOOLEAN NOT NULL DEFAULT 0
        )",
        "CREATE VIRTUAL TABLE IF NOT EXISTS ArtistFts USING fts5(name)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS artist_fts_insert
         AFTER INSERT ON Artist
         WHEN new.name IS NOT NULL
         BEGIN
            INSERT INTO ArtistFts(rowid, name) VALUES(new.id_artist, new.name);
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_fts_delete
         AFTER DELETE ON Artist
         BEGIN
            DELETE FROM ArtistFts WHERE rowid = old.id_artist;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_album_added
         AFTER INSERT ON Album
         WHEN new.artist_id IS NOT NULL
         BEGIN
            UPDATE Artist SET nb_albums = nb_albums + 1 WHERE id_artist = new.artist_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_album_removed
         AFTER DELETE ON Album
         WHEN old.artist_id IS NOT NULL
         BEGIN
            UPDATE Artist SET nb_albums = nb_albums - 1 WHERE id_artist = old.artist_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_track_attached
         AFTER UPDATE OF artist_id ON Media
         WHEN new.artist_id IS NOT NULL AND IFNULL(old.artist_id, -1) != new.artist_id
         BEGIN
            UPDATE Artist SET
                nb_tracks = nb_tracks + 1,
                nb_present_tracks = nb_present_tracks + new.is_present
            WHERE id_artist = new.artist_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_track_detached
         AFTER UPDATE OF artist_id ON Media
         WHEN old.artist_id IS NOT NULL AND IFNULL(new.artist_id, -1) != old.artist_id
         BEGIN
            UPDATE Artist SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present
            WHERE id_artist = old.artist_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_track_deleted
         AFTER DELETE ON Media
         WHEN old.artist_id IS NOT NULL
         BEGIN
            UPDATE Artist SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present
            WHERE id_artist = old.artist_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS artist_track_presence
         AFTER UPDATE OF is_present ON Media
         WHEN new.artist_id IS NOT NULL AND old.is_present != new.is_present
         BEGIN
            UPDATE Artist SET
                nb_present_tracks = nb_present_tracks + (new.is_present - old.is_present)
            WHERE id_artist = new.artist_id;
         END",
        // The distinguished rows (ids 1 and 2) survive even when empty.
        "CREATE TRIGGER IF NOT EXISTS artist_delete_empty
         AFTER UPDATE OF nb_albums, nb_tracks ON Artist
         WHEN new.nb_albums = 0 AND new.nb_tracks = 0 AND new.id_artist > 2
         BEGIN
            DELETE FROM Artist WHERE id_artist = new.id_artist;
         END",
    ]
}

/// Insert the unknown/various artist placeholders on a fresh database.
pub(crate) async fn seed_known_artists(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    sqlx::query("INSERT INTO Artist(id_artist, name) VALUES(?, NULL)")
        .bind(UNKNOWN_ARTIST_ID)
        .execute(&mut **tx)
        .await
        .map_err(Error::from_sqlx)?;
    sqlx::query("INSERT INTO Artist(id_artist, name) VALUES(?, NULL)")
        .bind(VARIOUS_ARTIST_ID)
        .execute(&mut **tx)
        .await
        .map_err(Error::from_sqlx)?;
    Ok(())
}

pub struct ArtistRepository {
    pool: SqlitePool,
}

impl ArtistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<ArtistRecord> {
        let res = sqlx::query("INSERT INTO Artist(name) VALUES(?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<ArtistRecord>> {
        sqlx::query_as("SELECT * FROM Artist WHERE id_artist = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<ArtistRecord>> {
        sqlx::query_as("SELECT * FROM Artist WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Fetch-or-create by name, the analysis service's entry path.
    pub async fn obtain(&self, name: &str) -> Result<ArtistRecord> {
        if let Some(existing) = self.by_name(name).await? {
            return Ok(existing);
        }
        match self.create(name).await {
            Ok(created) => Ok(created),
            // Lost a race with another task inserting the same name.
            Err(e) if e.is_unique_violation() => {
                self.by_name(name).await?.ok_or(Error::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Artists with at least one track. `include_missing` widens the
    /// listing to artists whose tracks are all on absent devices.
    pub fn listing(&self, params: &QueryParameters) -> Query<ArtistRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::NbAlbum => {
                format!("ORDER BY a.nb_albums {direction}, a.name ASC, a.id_artist ASC")
            }
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY a.name {direction}, a.id_artist ASC")
            }
            other => {
                warn!(?other, "Unsupported artist sort, falling back to Default");
                "ORDER BY a.name ASC, a.id_artist ASC".to_string()
            }
        };
        let mut body =
            String::from("FROM Artist a WHERE a.id_artist > 2 AND a.nb_tracks > 0");
        if !params.include_missing {
            body.push_str(" AND a.nb_present_tracks > 0");
        }
        Query::new(self.pool.clone(), "a.*", body, order_by, Vec::new())
    }

    pub fn search(&self, pattern: &str) -> Query<ArtistRecord> {
        Query::new(
            self.pool.clone(),
            "a.*",
            "FROM Artist a WHERE a.id_artist IN
                (SELECT rowid FROM ArtistFts WHERE ArtistFts MATCH ?)",
            "ORDER BY a.name ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Artist WHERE id_artist = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }
}
