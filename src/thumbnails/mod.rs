//! Thumbnail manager: sharing and copy-on-write.
//!
//! Thumbnails are deduplicated across entities through the linking table.
//! A row referenced by more than one entity is shared; a mutation aimed at
//! a single referrer must never touch the shared row in place, it creates
//! a fresh row and relinks only that referrer.

pub mod worker;

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::db::thumbnails::{
    ThumbnailOrigin, ThumbnailRecord, ThumbnailSizeType, ThumbnailStatus, ThumbnailedEntity,
};
use crate::db::Database;
use crate::error::Result;
use crate::mrl;

pub struct ThumbnailManager {
    db: Database,
    thumbnail_dir: PathBuf,
}

impl ThumbnailManager {
    pub fn new(db: Database, thumbnail_dir: PathBuf) -> Self {
        Self { db, thumbnail_dir }
    }

    pub fn thumbnail_dir(&self) -> &PathBuf {
        &self.thumbnail_dir
    }

    /// True if `mrl` points into the managed thumbnail directory.
    fn is_owned_mrl(&self, thumbnail_mrl: &str) -> bool {
        mrl::to_path(thumbnail_mrl)
            .map(|p| p.starts_with(&self.thumbnail_dir))
            .unwrap_or(false)
    }

    pub async fn thumbnail(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
    ) -> Result<Option<ThumbnailRecord>> {
        self.db.thumbnails().for_entity(entity, entity_id, size_type).await
    }

    /// Assign a thumbnail to an entity, honoring the copy-on-write
    /// protocol for shared rows.
    pub async fn set_thumbnail(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
        new_mrl: &str,
        origin: ThumbnailOrigin,
    ) -> Result<ThumbnailRecord> {
        let is_owned = self.is_owned_mrl(new_mrl);
        let repo = self.db.thumbnails();
        let current = repo.for_entity(entity, entity_id, size_type).await?;

        match current {
            None => {
                // Reuse an identical row if one exists, insert otherwise.
                let row = match repo.by_mrl(new_mrl, size_type).await? {
                    Some(existing) => existing,
                    None => {
                        repo.insert(new_mrl, origin, size_type, is_owned, ThumbnailStatus::Available)
                            .await?
                    }
                };
                repo.link(entity, entity_id, size_type, row.id_thumbnail).await?;
                Ok(row)
            }
            Some(current) if current.is_shared() => {
                // Copy-on-write: the other referrers keep the old row.
                debug!(
                    thumbnail_id = current.id_thumbnail,
                    "Thumbnail is shared, creating a private copy"
                );
                let row = repo
                    .insert(new_mrl, origin, size_type, is_owned, ThumbnailStatus::Available)
                    .await?;
                repo.link(entity, entity_id, size_type, row.id_thumbnail).await?;
                Ok(row)
            }
            Some(current) => {
                let was_owned = current.is_owned;
                let old_mrl = current.mrl.clone();
                repo.update(current.id_thumbnail, new_mrl, origin, is_owned).await?;
                if was_owned && old_mrl != new_mrl {
                    self.discard_artifact(&old_mrl);
                }
                repo.by_id(current.id_thumbnail).await?.ok_or(crate::error::Error::NotFound)
            }
        }
    }

    /// Drop an entity's thumbnail link. When the last referrer goes away
    /// the row is collected and, if the artifact was ours, the file too.
    pub async fn remove_thumbnail(
        &self,
        entity: ThumbnailedEntity,
        entity_id: i64,
        size_type: ThumbnailSizeType,
    ) -> Result<bool> {
        let repo = self.db.thumbnails();
        let Some(current) = repo.for_entity(entity, entity_id, size_type).await? else {
            return Ok(false);
        };
        let last_referrer = current.shared_counter <= 1;
        repo.unlink(entity, entity_id, size_type).await?;
        if last_referrer && current.is_owned {
            self.discard_artifact(&current.mrl);
        }
        Ok(true)
    }

    /// Remove every user-provided thumbnail link and garbage-collect the
    /// artifacts that belonged to the library.
    pub async fn flush_user_provided(&self) -> Result<()> {
        let owned = self.db.thumbnails().user_provided_owned_mrls().await?;
        self.db.thumbnails().flush_user_provided().await?;
        for thumbnail_mrl in owned {
            // Only delete artifacts whose row was actually collected.
            let still_referenced = self
                .db
                .thumbnails()
                .by_mrl(&thumbnail_mrl, ThumbnailSizeType::Thumbnail)
                .await?
                .is_some()
                || self
                    .db
                    .thumbnails()
                    .by_mrl(&thumbnail_mrl, ThumbnailSizeType::Banner)
                    .await?
                    .is_some();
            if !still_referenced {
                self.discard_artifact(&thumbnail_mrl);
            }
        }
        Ok(())
    }

    fn discard_artifact(&self, thumbnail_mrl: &str) {
        let Ok(path) = mrl::to_path(thumbnail_mrl) else {
            return;
        };
        if !path.starts_with(&self.thumbnail_dir) {
            return;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to delete thumbnail artifact");
            }
        }
    }
}
