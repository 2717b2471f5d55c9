//! Show and show-episode records.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShowRecord {
    pub id_show: i64,
    pub title: String,
    pub release_date: Option<i64>,
    pub short_summary: Option<String>,
    pub nb_episodes: i64,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShowEpisodeRecord {
    pub id_episode: i64,
    pub media_id: i64,
    pub show_id: i64,
    pub episode_number: i64,
    pub season_number: i64,
    pub episode_summary: Option<String>,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Show(
            id_show INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT COLLATE NOCASE,
            release_date INTEGER,
            short_summary TEXT,
            nb_episodes INTEGER NOT NULL DEFAULT 0,
            is_favorite BOOLEAN NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS ShowEpisode(
            id_episode INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            show_id INTEGER REFERENCES Show(id_show) ON DELETE CASCADE,
            episode_number INTEGER,
            season_number INTEGER,
            episode_summary TEXT
        )",
        "CREATE INDEX IF NOT EXISTS show_episode_media_idx ON ShowEpisode(media_id)",
        "CREATE VIRTUAL TABLE IF NOT EXISTS ShowFts USING fts5(title)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS show_fts_insert
         AFTER INSERT ON Show
         BEGIN
            INSERT INTO ShowFts(rowid, title) VALUES(new.id_show, new.title);
         END",
        "CREATE TRIGGER IF NOT EXISTS show_fts_delete
         AFTER DELETE ON Show
         BEGIN
            DELETE FROM ShowFts WHERE rowid = old.id_show;
         END",
        "CREATE TRIGGER IF NOT EXISTS show_episode_added
         AFTER INSERT ON ShowEpisode
         BEGIN
            UPDATE Show SET nb_episodes = nb_episodes + 1 WHERE id_show = new.show_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS show_episode_removed
         AFTER DELETE ON ShowEpisode
         BEGIN
            UPDATE Show SET nb_episodes = nb_episodes - 1 WHERE id_show = old.show_id;
         END",
    ]
}

pub struct ShowRepository {
    pool: SqlitePool,
}

impl ShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, title: &str) -> Result<ShowRecord> {
        let res = sqlx::query("INSERT INTO Show(title) VALUES(?)")
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<ShowRecord>> {
        sqlx::query_as("SELECT * FROM Show WHERE id_show = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_title(&self, title: &str) -> Result<Option<ShowRecord>> {
        sqlx::query_as("SELECT * FROM Show WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn obtain(&self, title: &str) -> Result<ShowRecord> {
        if let Some(show) = self.by_title(title).await? {
            return Ok(show);
        }
        self.create(title).await
    }

    pub async fn add_episode(
        &self,
        show_id: i64,
        media_id: i64,
        season_number: i64,
        episode_number: i64,
    ) -> Result<ShowEpisodeRecord> {
        let res = sqlx::query(
            "INSERT INTO ShowEpisode(media_id, show_id, season_number, episode_number)
             VALUES(?, ?, ?, ?)",
        )
        .bind(media_id)
        .bind(show_id)
        .bind(season_number)
        .bind(episode_number)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query_as("SELECT * FROM ShowEpisode WHERE id_episode = ?")
            .bind(res.last_insert_rowid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or(Error::NotFound)
    }

    pub async fn episode_for_media(&self, media_id: i64) -> Result<Option<ShowEpisodeRecord>> {
        sqlx::query_as("SELECT * FROM ShowEpisode WHERE media_id = ?")
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Episodes of one show, in season/episode order.
    pub fn episodes(&self, show_id: i64, params: &QueryParameters) -> Query<super::media::MediaRecord> {
        let mut body = String::from(
            "FROM Media m
             INNER JOIN ShowEpisode ep ON ep.media_id = m.id_media
             WHERE ep.show_id = ?",
        );
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            "ORDER BY ep.season_number ASC, ep.episode_number ASC",
            vec![BindValue::Int(show_id)],
        )
    }

    pub fn listing(&self, params: &QueryParameters) -> Query<ShowRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::ReleaseDate => {
                format!("ORDER BY s.release_date {direction}, s.id_show ASC")
            }
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY s.title {direction}, s.id_show ASC")
            }
            other => {
                warn!(?other, "Unsupported show sort, falling back to Default");
                "ORDER BY s.title ASC, s.id_show ASC".to_string()
            }
        };
        Query::new(
            self.pool.clone(),
            "s.*",
            "FROM Show s WHERE s.nb_episodes > 0",
            order_by,
            Vec::new(),
        )
    }

    pub fn search(&self, pattern: &str) -> Query<ShowRecord> {
        Query::new(
            self.pool.clone(),
            "s.*",
            "FROM Show s WHERE s.id_show IN
                (SELECT rowid FROM ShowFts WHERE ShowFts MATCH ?)",
            "ORDER BY s.title ASC",
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }
}
