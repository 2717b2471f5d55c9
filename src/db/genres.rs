//! Genre records. Names are unique, case-insensitive; a genre disappears
//! with its last track.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenreRecord {
    pub id_genre: i64,
    pub name: String,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Genre(
            id_genre INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE UNIQUE ON CONFLICT FAIL,
            nb_tracks INTEGER NOT NULL DEFAULT 0,
            nb_present_tracks INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE VIRTUAL TABLE IF NOT EXISTS GenreFts USING fts5(name)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS genre_fts_insert
         AFTER INSERT ON Genre
         BEGIN
            INSERT INTO GenreFts(rowid, name) VALUES(new.id_genre, new.name);
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_fts_delete
         AFTER DELETE ON Genre
         BEGIN
            DELETE FROM GenreFts WHERE rowid = old.id_genre;
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_track_attached
         AFTER UPDATE OF genre_id ON Media
         WHEN new.genre_id IS NOT NULL AND IFNULL(old.genre_id, -1) != new.genre_id
         BEGIN
            UPDATE Genre SET
                nb_tracks = nb_tracks + 1,
                nb_present_tracks = nb_present_tracks + new.is_present
            WHERE id_genre = new.genre_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_track_detached
         AFTER UPDATE OF genre_id ON Media
         WHEN old.genre_id IS NOT NULL AND IFNULL(new.genre_id, -1) != old.genre_id
         BEGIN
            UPDATE Genre SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present
            WHERE id_genre = old.genre_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_track_deleted
         AFTER DELETE ON Media
         WHEN old.genre_id IS NOT NULL
         BEGIN
            UPDATE Genre SET
                nb_tracks = nb_tracks - 1,
                nb_present_tracks = nb_present_tracks - old.is_present
            WHERE id_genre = old.genre_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_track_presence
         AFTER UPDATE OF is_present ON Media
         WHEN new.genre_id IS NOT NULL AND old.is_present != new.is_present
         BEGIN
            UPDATE Genre SET
                nb_present_tracks = nb_present_tracks + (new.is_present - old.is_present)
            WHERE id_genre = new.genre_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS genre_delete_empty
         AFTER UPDATE OF nb_tracks ON Genre
         WHEN new.nb_tracks = 0
         BEGIN
            DELETE FROM Genre WHERE id_genre = new.id_genre;
         END",
    ]
}

pub struct GenreRepository {
    pool: SqlitePool,
}

impl GenreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<GenreRecord>> {
        sqlx::query_as("SELECT * FROM Genre WHERE id_genre = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<GenreRecord>> {
        sqlx::query_as("SELECT * FROM Genre WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn obtain(&self, name: &str) -> Result<GenreRecord> {
        if let Some(existing) = self.by_name(name).await? {
            return Ok(existing);
        }
        let res = sqlx::query("INSERT INTO Genre(name) VALUES(?)")
            .bind(name)
            .execute(&self.pool)
            .await;
        match res {
            Ok(r) => self
                .by_id(r.last_insert_rowid())
                .await?
                .ok_or(Error::NotFound),
            Err(e) => {
                let e = Error::from_sqlx(e);
                if e.is_unique_violation() {
                    self.by_name(name).await?.ok_or(Error::NotFound)
                } else {
                    Err(e)
                }
            }
        }
    }

    pub fn listing(&self, params: &QueryParameters) -> Query<GenreRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY g.name {direction}, g.id_genre ASC")
            }
            other => {
                warn!(?other, "Unsupported genre sort, falling back to Default");
                "ORDER BY g.name ASC, g.id_genre ASC".to_string()
            }
        };
        let mut body = String::from("FROM Genre g WHERE g.nb_tracks > 0");
        if !params.include_missing {
            body.push_str(" AND g.nb_present_tracks > 0");
        }
        Query::new(self.pool.clone(), "g.*", body, order_by, Vec::new())
    }

    pub fn search(&self, pattern: &str) -> Query<GenreRecord> {
        Query::new(
            self.pool.clone(),
            "g.*",
            "FROM Genre g WHERE g.id_genre IN
                (SELECT rowid FROM GenreFts WHERE GenreFts MATCH ?)",
            "ORDER BY g.name ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }
}
