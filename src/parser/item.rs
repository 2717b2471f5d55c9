//! Runtime parsing item.
//!
//! An [`Item`] is the in-memory companion of a persistent task row: it
//! accumulates what extraction learned (metadata keys, tracks, duration,
//! sub-items) and carries the linked database entities across services.
//! Restored tasks re-resolve their entities before re-entering the chain,
//! since a device may have moved its mountpoint in the meantime.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::files::{FileRecord, FileType};
use crate::db::folders::FolderRecord;
use crate::db::media::MediaRecord;
use crate::db::media_meta::MetadataKey;
use crate::db::tasks::{TaskRecord, TaskType};
use crate::db::tracks::ProbedTrack;
use crate::db::Database;
use crate::error::Result;
use crate::fs::holder::FsHolder;
use crate::fs::FsFile;

/// A sub-item discovered during extraction, to be persisted as a link
/// task after analysis (e.g. one playlist entry).
#[derive(Debug, Clone)]
pub struct LinkedItem {
    pub mrl: String,
    pub file_type: FileType,
    /// Contextual extra, e.g. the position within the parent playlist.
    pub link_extra: i64,
}

pub struct Item {
    pub task: TaskRecord,
    /// Metadata keys read from the container.
    pub metadata: HashMap<MetadataKey, String>,
    pub tracks: Vec<ProbedTrack>,
    /// Duration in milliseconds; -1 while unknown.
    pub duration: i64,
    pub linked_items: Vec<LinkedItem>,

    // Entities resolved from the database, populated lazily.
    pub file: Option<FileRecord>,
    pub folder: Option<FolderRecord>,
    pub media: Option<MediaRecord>,
    pub fs_file: Option<Arc<dyn FsFile>>,

    /// Index of the next service in the parser chain.
    pub current_service: usize,
}

impl Item {
    pub fn new(task: TaskRecord) -> Self {
        Self {
            task,
            metadata: HashMap::new(),
            tracks: Vec::new(),
            duration: -1,
            linked_items: Vec::new(),
            file: None,
            folder: None,
            media: None,
            fs_file: None,
            current_service: 0,
        }
    }

    pub fn mrl(&self) -> &str {
        &self.task.mrl
    }

    pub fn meta(&self, key: MetadataKey) -> Option<&str> {
        self.metadata.get(&key).map(|s| s.as_str())
    }

    pub fn set_meta(&mut self, key: MetadataKey, value: impl Into<String>) {
        self.metadata.insert(key, value.into());
    }

    /// Record a sub-item reference; the analysis service persists one link
    /// task per entry once the parent entity exists.
    pub fn create_linked_item(&mut self, mrl: String, file_type: FileType, link_extra: i64) {
        self.linked_items.push(LinkedItem {
            mrl,
            file_type,
            link_extra,
        });
    }

    /// Re-resolve the entities a restored task points at: the folder, the
    /// file row, the media, and the file as seen on the filesystem right
    /// now (its MRL may have changed if the device moved). Link tasks only
    /// carry MRLs and ids and skip restoration.
    ///
    /// Returns false when the task cannot be restored and should be
    /// skipped.
    pub async fn restore_linked_entities(
        &mut self,
        db: &Database,
        fs_holder: &Arc<FsHolder>,
    ) -> Result<bool> {
        if self.task.task_type == TaskType::Link {
            return Ok(true);
        }
        if let Some(folder_id) = self.task.parent_folder_id {
            self.folder = db.folders().by_id(folder_id).await?;
            if self.folder.is_none() {
                return Ok(false);
            }
        }
        if let Some(file_id) = self.task.file_id {
            self.file = db.files().by_id(file_id).await?;
            if self.file.is_none() {
                return Ok(false);
            }
        }
        // Rebuild the file's current MRL from its folder.
        let file_mrl = match (&self.folder, &self.file) {
            (Some(folder), Some(file)) if file.is_removable => {
                let folder_mrl =
                    crate::discoverer::crawler::folder_mrl(db, fs_holder, folder).await?;
                format!("{}{}", folder_mrl, file.mrl)
            }
            (_, Some(file)) => file.mrl.clone(),
            _ => self.task.mrl.clone(),
        };
        let factory = match fs_holder.fs_factory_for_mrl(&file_mrl).await {
            Some(factory) => factory,
            None => return Ok(false),
        };
        match factory.file(&file_mrl) {
            Ok(fs_file) => self.fs_file = Some(fs_file),
            Err(_) => return Ok(false),
        }
        self.task.mrl = file_mrl;
        if let Some(file) = &self.file {
            if let Some(media_id) = file.media_id {
                self.media = db.media().by_id(media_id).await?;
            }
        }
        Ok(true)
    }
}
