//! The single-row settings table carrying the database model version.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

pub(crate) fn schema() -> &'static [&'static str] {
    &["CREATE TABLE IF NOT EXISTS Settings(db_model_version INTEGER NOT NULL)"]
}

pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn db_model_version(&self) -> Result<u32> {
        let version: i64 = sqlx::query_scalar("SELECT db_model_version FROM Settings")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(version as u32)
    }

    pub async fn set_db_model_version(&self, version: u32) -> Result<()> {
        sqlx::query("UPDATE Settings SET db_model_version = ?")
            .bind(version as i64)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
