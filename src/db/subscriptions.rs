//! Subscription records and their cached-media relation.
//!
//! A subscription groups media the host wants kept available offline. The
//! cache worker consults the per-subscription quota (`max_cached_size`,
//! -1 meaning "inherit the global quota") and the accounted `cached_size`.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub id_subscription: i64,
    pub name: String,
    pub max_cached_size: i64,
    pub cached_size: i64,
    pub new_media_notification: bool,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Subscription(
            id_subscription INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE,
            max_cached_size INTEGER NOT NULL DEFAULT -1,
            cached_size INTEGER NOT NULL DEFAULT 0,
            new_media_notification BOOLEAN NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS SubscriptionMediaRelation(
            subscription_id INTEGER REFERENCES Subscription(id_subscription) ON DELETE CASCADE,
            media_id INTEGER REFERENCES Media(id_media) ON DELETE CASCADE,
            PRIMARY KEY(subscription_id, media_id)
        )",
    ]
}

pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<SubscriptionRecord> {
        let res = sqlx::query("INSERT INTO Subscription(name) VALUES(?)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<SubscriptionRecord>> {
        sqlx::query_as("SELECT * FROM Subscription WHERE id_subscription = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn all(&self) -> Result<Vec<SubscriptionRecord>> {
        sqlx::query_as("SELECT * FROM Subscription ORDER BY id_subscription")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn add_media(&self, subscription_id: i64, media_id: i64) -> Result<bool> {
        let res = sqlx::query(
            "INSERT OR IGNORE INTO SubscriptionMediaRelation(subscription_id, media_id)
             VALUES(?, ?)",
        )
        .bind(subscription_id)
        .bind(media_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn media_ids(&self, subscription_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT media_id FROM SubscriptionMediaRelation WHERE subscription_id = ?",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Option<SubscriptionRecord>> {
        sqlx::query_as(
            "SELECT s.* FROM Subscription s
             INNER JOIN SubscriptionMediaRelation smr
                ON smr.subscription_id = s.id_subscription
             WHERE smr.media_id = ?",
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    pub async fn set_max_cached_size(&self, id: i64, size: i64) -> Result<()> {
        sqlx::query("UPDATE Subscription SET max_cached_size = ? WHERE id_subscription = ?")
            .bind(size)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn add_cached_size(&self, id: i64, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE Subscription SET cached_size = MAX(cached_size + ?, 0)
             WHERE id_subscription = ?",
        )
        .bind(delta)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Subscription WHERE id_subscription = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }
}
