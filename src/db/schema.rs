//! Schema creation, versioning and migration.
//!
//! Every entity module owns its `CREATE TABLE` text and trigger text; this
//! module executes them in dependency order, seeds the distinguished rows,
//! and records the model version in `Settings`. Migration steps are ordered
//! functions from version N to N+1; a database carrying a higher version
//! than this build understands is refused.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{Error, Result};

use super::{
    albums, artists, bookmarks, chapters, devices, files, folders, genres, groups, labels, media,
    media_meta, movies, playlists, settings, shows, subscriptions, tasks, thumbnails, tracks,
};

/// Current database model version.
pub const DB_MODEL_VERSION: u32 = 23;

fn tables() -> Vec<&'static str> {
    let mut stmts = Vec::new();
    stmts.extend_from_slice(devices::schema());
    stmts.extend_from_slice(folders::schema());
    stmts.extend_from_slice(artists::schema());
    stmts.extend_from_slice(genres::schema());
    stmts.extend_from_slice(albums::schema());
    stmts.extend_from_slice(groups::schema());
    stmts.extend_from_slice(media::schema());
    stmts.extend_from_slice(shows::schema());
    stmts.extend_from_slice(movies::schema());
    stmts.extend_from_slice(playlists::schema());
    stmts.extend_from_slice(files::schema());
    stmts.extend_from_slice(labels::schema());
    stmts.extend_from_slice(bookmarks::schema());
    stmts.extend_from_slice(thumbnails::schema());
    stmts.extend_from_slice(subscriptions::schema());
    stmts.extend_from_slice(tracks::schema());
    stmts.extend_from_slice(chapters::schema());
    stmts.extend_from_slice(media_meta::schema());
    stmts.extend_from_slice(tasks::schema());
    stmts.extend_from_slice(settings::schema());
    stmts
}

fn triggers() -> Vec<&'static str> {
    let mut stmts = Vec::new();
    stmts.extend_from_slice(devices::triggers());
    stmts.extend_from_slice(folders::triggers());
    stmts.extend_from_slice(artists::triggers());
    stmts.extend_from_slice(genres::triggers());
    stmts.extend_from_slice(albums::triggers());
    stmts.extend_from_slice(groups::triggers());
    stmts.extend_from_slice(media::triggers());
    stmts.extend_from_slice(shows::triggers());
    stmts.extend_from_slice(playlists::triggers());
    stmts.extend_from_slice(files::triggers());
    stmts.extend_from_slice(labels::triggers());
    stmts.extend_from_slice(thumbnails::triggers());
    stmts.extend_from_slice(tasks::triggers());
    stmts
}

/// Create any missing table, trigger or index, seed the distinguished
/// artist rows, and return the model version found (or just written).
pub async fn ensure_schema(pool: &SqlitePool) -> Result<u32> {
    let fresh = !table_exists(pool, "Settings").await?;

    let mut tx = pool.begin().await.map_err(Error::from_sqlx)?;
    for stmt in tables() {
        sqlx::query(stmt)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
    }
    for stmt in triggers() {
        sqlx::query(stmt)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
    }

    if fresh {
        sqlx::query("INSERT INTO Settings(db_model_version) VALUES(?)")
            .bind(DB_MODEL_VERSION as i64)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        artists::seed_known_artists(&mut tx).await?;
    }
    tx.commit().await.map_err(Error::from_sqlx)?;

    let version: i64 = sqlx::query_scalar("SELECT db_model_version FROM Settings")
        .fetch_one(pool)
        .await
        .map_err(Error::from_sqlx)?;
    let version = version as u32;
    if version > DB_MODEL_VERSION {
        return Err(Error::UnsupportedModel {
            found: version,
            supported: DB_MODEL_VERSION,
        });
    }
    Ok(version)
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .map_err(Error::from_sqlx)?;
    Ok(row.is_some())
}

/// Run every migration step from `from` up to [`DB_MODEL_VERSION`]. Each
/// step runs in its own transaction and bumps the stored version, so an
/// interrupted migration resumes where it stopped.
pub async fn migrate(pool: &SqlitePool, from: u32) -> Result<()> {
    let mut version = from;
    while version < DB_MODEL_VERSION {
        let mut tx = pool.begin().await.map_err(Error::from_sqlx)?;
        match version {
            22 => {
                // Thumbnails gained a generation status; pre-existing rows
                // all point at generated artifacts.
                sqlx::query(
                    "ALTER TABLE Thumbnail ADD COLUMN status INTEGER NOT NULL DEFAULT 1",
                )
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
            }
            v => {
                return Err(Error::Other(
                    format!("no migration step from model version {v}").into(),
                ))
            }
        }
        version += 1;
        sqlx::query("UPDATE Settings SET db_model_version = ?")
            .bind(version as i64)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        info!(version, "Migration step applied");
    }
    Ok(())
}
