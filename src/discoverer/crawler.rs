//! Filesystem crawler.
//!
//! Walks an entry point through the fs abstraction, reconciles what it
//! sees with the folder/file tables, and emits parser tasks for new or
//! changed files. The interrupt probe is polled at every directory
//! boundary so a long crawl aborts cleanly, keeping what it already
//! committed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::callbacks::LibraryCallbacks;
use crate::db::files::FileType;
use crate::db::folders::FolderRecord;
use crate::db::tasks::TaskRecord;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fs::holder::FsHolder;
use crate::fs::{FsDirectory, FsFile};
use crate::mrl;

use super::probe::{InterruptProbe, Probe};

/// Audio containers the library imports.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aiff", "ape", "flac", "m4a", "mka", "mp3", "mpc", "oga", "ogg", "opus", "wav", "wma",
    "wv",
];

/// Video containers the library imports.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "avi", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ts", "webm", "wmv",
];

/// Playlist formats routed through the linking service.
pub const PLAYLIST_EXTENSIONS: &[&str] = &["asx", "b4s", "m3u", "m3u8", "pls", "wpl", "xspf"];

/// Classify a file by extension; anything else is skipped by discovery.
pub fn file_type_for_extension(extension: Option<&str>) -> FileType {
    match extension {
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext) || VIDEO_EXTENSIONS.contains(&ext) => {
            FileType::Main
        }
        Some(ext) if PLAYLIST_EXTENSIONS.contains(&ext) => FileType::Playlist,
        _ => FileType::Unknown,
    }
}

/// Walks entry points and produces parser tasks.
pub struct FsCrawler {
    db: Database,
    fs_holder: Arc<FsHolder>,
    task_sink: mpsc::UnboundedSender<TaskRecord>,
    callbacks: Arc<dyn LibraryCallbacks>,
    discover_no_media: bool,
}

impl FsCrawler {
    pub fn new(
        db: Database,
        fs_holder: Arc<FsHolder>,
        task_sink: mpsc::UnboundedSender<TaskRecord>,
        callbacks: Arc<dyn LibraryCallbacks>,
        discover_no_media: bool,
    ) -> Self {
        Self {
            db,
            fs_holder,
            task_sink,
            callbacks,
            discover_no_media,
        }
    }

    /// Discover a new entry point: create or fetch its root folder, then
    /// crawl.
    pub async fn discover(&self, entry_mrl: &str, interrupt: &dyn InterruptProbe) -> Result<()> {
        let probe = super::probe::CrawlerProbe::new(self.discover_no_media);
        let (root_dir, root_folder) = self.resolve_root(entry_mrl).await?;
        self.crawl(root_dir, root_folder, &probe, interrupt).await
    }

    /// Reload one entry point, or all of them.
    pub async fn reload(
        &self,
        entry_mrl: Option<&str>,
        interrupt: &dyn InterruptProbe,
    ) -> Result<()> {
        let probe = super::probe::CrawlerProbe::new(self.discover_no_media);
        let roots = match entry_mrl {
            // Reloading a single file goes through the targeted path probe,
            // which forces a refresh of just that file.
            Some(entry)
                if file_type_for_extension(mrl::extension(entry).as_deref())
                    != FileType::Unknown =>
            {
                return self.reload_path(entry, interrupt).await;
            }
            Some(entry) => {
                let (dir, folder) = self.resolve_root(entry).await?;
                vec![(dir, folder)]
            }
            None => {
                let mut roots = Vec::new();
                for folder in self.db.folders().roots().await? {
                    match self.open_folder(&folder).await {
                        Ok(dir) => roots.push((dir, folder)),
                        Err(e) => {
                            debug!(path = %folder.path, error = %e, "Skipping unreachable root")
                        }
                    }
                }
                roots
            }
        };
        for (dir, folder) in roots {
            if interrupt.is_interrupted() {
                break;
            }
            self.crawl(dir, folder, &probe, interrupt).await?;
        }
        Ok(())
    }

    /// Rescan a single path, treating its files as new.
    pub async fn reload_path(&self, target_mrl: &str, interrupt: &dyn InterruptProbe) -> Result<()> {
        let entry = mrl::directory(target_mrl)?;
        let probe = super::probe::PathProbe::new(target_mrl);
        let (dir, folder) = self.resolve_root(&entry).await?;
        self.crawl(dir, folder, &probe, interrupt).await
    }

    /// Resolve the MRL to a directory and its (created if needed) folder
    /// row, inserting the device row on first sighting.
    async fn resolve_root(
        &self,
        entry_mrl: &str,
    ) -> Result<(Arc<dyn FsDirectory>, FolderRecord)> {
        let factory = self
            .fs_holder
            .fs_factory_for_mrl(entry_mrl)
            .await
            .ok_or_else(|| Error::BadMrl(entry_mrl.to_string()))?;
        let dir = factory.directory(entry_mrl)?;
        let device_fs = dir
            .device()
            .ok_or_else(|| Error::DeviceRemoved {
                mrl: entry_mrl.to_string(),
            })?;
        let uuid = device_fs.uuid();
        let scheme = device_fs.scheme();
        let device = match self.db.devices().by_uuid(&uuid, &scheme).await? {
            Some(device) => device,
            None => {
                self.db
                    .devices()
                    .create(&uuid, &scheme, device_fs.is_removable(), device_fs.is_network())
                    .await?
            }
        };
        let path = folder_path(&dir.mrl(), device_fs.is_removable(), &device_fs.mountpoints());
        let folder = match self.db.folders().by_path(device.id_device, &path).await? {
            Some(folder) => folder,
            None => {
                self.db
                    .folders()
                    .create(&path, &dir.name(), None, device.id_device, device_fs.is_removable())
                    .await?
            }
        };
        Ok((dir, folder))
    }

    async fn open_folder(&self, folder: &FolderRecord) -> Result<Arc<dyn FsDirectory>> {
        let folder_mrl = self.folder_mrl(folder).await?;
        let factory = self
            .fs_holder
            .fs_factory_for_mrl(&folder_mrl)
            .await
            .ok_or_else(|| Error::BadMrl(folder_mrl.clone()))?;
        factory.directory(&folder_mrl)
    }

    /// Rebuild a folder's MRL through the shared helper.
    pub async fn folder_mrl(&self, folder: &FolderRecord) -> Result<String> {
        folder_mrl(&self.db, &self.fs_holder, folder).await
    }

    /// Walk one directory level, then recurse. Commits per directory so an
    /// interrupted crawl keeps completed directories.
    async fn crawl(
        &self,
        dir: Arc<dyn FsDirectory>,
        folder: FolderRecord,
        probe: &dyn Probe,
        interrupt: &dyn InterruptProbe,
    ) -> Result<()> {
        // One level at a time, depth-first; the stack keeps the crawl
        // iterative so interruption is a plain early return.
        let mut stack: Vec<(Arc<dyn FsDirectory>, FolderRecord)> = vec![(dir, folder)];
        while let Some((dir, folder)) = stack.pop() {
            if interrupt.is_interrupted() {
                info!(mrl = %dir.mrl(), "Discovery interrupted, committing partial crawl");
                return Ok(());
            }
            if !probe.proceed_on_directory(dir.as_ref()) || probe.is_hidden(dir.as_ref()) {
                continue;
            }
            self.callbacks.on_discovery_progress(&dir.mrl());
            self.crawl_files(dir.as_ref(), &folder, probe).await?;
            self.crawl_subfolders(dir.as_ref(), &folder, probe, &mut stack)
                .await?;
        }
        Ok(())
    }

    async fn crawl_files(
        &self,
        dir: &dyn FsDirectory,
        folder: &FolderRecord,
        probe: &dyn Probe,
    ) -> Result<()> {
        let known = self.db.files().by_folder(folder.id_folder).await?;
        let mut known_by_mrl: HashMap<String, _> =
            known.into_iter().map(|f| (f.mrl.clone(), f)).collect();

        for file in dir.files()? {
            if probe.stop_file_discovery() {
                break;
            }
            if !probe.proceed_on_file(file.as_ref()) {
                continue;
            }
            let extension = file.extension();
            let file_type = file_type_for_extension(extension.as_deref());
            if file_type == FileType::Unknown {
                continue;
            }
            // File rows are keyed by a device-relative name on removable
            // storage; task rows always carry the full MRL.
            let stored_mrl = self.stored_file_mrl(folder, &file);
            match known_by_mrl.remove(&stored_mrl) {
                None => {
                    self.queue_creation_task(&file.mrl(), file_type, folder.id_folder)
                        .await;
                }
                Some(existing) => {
                    if probe.force_file_refresh()
                        || existing.last_modification_date != file.last_modification_date()
                    {
                        debug!(mrl = %file.mrl(), "File changed on disk, queuing refresh");
                        self.queue_refresh_task(&file.mrl(), &existing).await;
                    }
                }
            }
        }

        if probe.delete_unseen_files() {
            for (gone_mrl, record) in known_by_mrl {
                debug!(mrl = %gone_mrl, "File vanished from disk, deleting");
                self.db.files().delete(record.id_file).await?;
            }
        }
        Ok(())
    }

    async fn crawl_subfolders(
        &self,
        dir: &dyn FsDirectory,
        folder: &FolderRecord,
        probe: &dyn Probe,
        stack: &mut Vec<(Arc<dyn FsDirectory>, FolderRecord)>,
    ) -> Result<()> {
        let known = self.db.folders().children(folder.id_folder).await?;
        let mut known_by_path: HashMap<String, _> =
            known.into_iter().map(|f| (f.path.clone(), f)).collect();

        for subdir in dir.dirs()? {
            let device_fs = subdir.device();
            let removable = device_fs.as_ref().map(|d| d.is_removable()).unwrap_or(false);
            let mountpoints = device_fs
                .as_ref()
                .map(|d| d.mountpoints())
                .unwrap_or_default();
            let path = folder_path(&subdir.mrl(), removable, &mountpoints);
            if self.db.folders().is_banned(folder.device_id, &path).await? {
                debug!(path = %path, "Skipping banned folder");
                continue;
            }
            let child = match known_by_path.remove(&path) {
                Some(child) => child,
                None => {
                    self.db
                        .folders()
                        .create(
                            &path,
                            &subdir.name(),
                            Some(folder.id_folder),
                            folder.device_id,
                            folder.is_removable,
                        )
                        .await?
                }
            };
            stack.push((subdir, child));
        }

        if probe.delete_unseen_folders() {
            for (gone_path, record) in known_by_path {
                debug!(path = %gone_path, "Folder vanished from disk, deleting");
                self.db.folders().delete(record.id_folder).await?;
            }
        }
        Ok(())
    }

    /// MRL stored on the file row: relative name for removable devices,
    /// full MRL otherwise.
    fn stored_file_mrl(&self, folder: &FolderRecord, file: &Arc<dyn FsFile>) -> String {
        if folder.is_removable {
            file.name()
        } else {
            file.mrl()
        }
    }

    async fn queue_creation_task(&self, file_mrl: &str, file_type: FileType, folder_id: i64) {
        match self.db.tasks().create(file_mrl, file_type, folder_id).await {
            Ok(task) => {
                let _ = self.task_sink.send(task);
            }
            // A previous discovery already queued it.
            Err(e) if e.is_unique_violation() => {
                debug!(mrl = %file_mrl, "Task already pending, skipping")
            }
            Err(e) => warn!(mrl = %file_mrl, error = %e, "Failed to create parser task"),
        }
    }

    async fn queue_refresh_task(&self, file_mrl: &str, file: &crate::db::files::FileRecord) {
        let Some(folder_id) = file.folder_id else {
            return;
        };
        match self
            .db
            .tasks()
            .create_refresh(file_mrl, file.id_file, file.file_type, folder_id)
            .await
        {
            Ok(task) => {
                let _ = self.task_sink.send(task);
            }
            Err(e) if e.is_unique_violation() => {
                debug!(mrl = %file_mrl, "Refresh already pending, skipping")
            }
            Err(e) => warn!(mrl = %file_mrl, error = %e, "Failed to create refresh task"),
        }
    }
}

/// Rebuild a folder's MRL: removable folders store a device-relative path
/// and need the device's current mountpoint prepended.
pub async fn folder_mrl(
    db: &Database,
    fs_holder: &Arc<FsHolder>,
    folder: &FolderRecord,
) -> Result<String> {
    if !folder.is_removable {
        return Ok(folder.path.clone());
    }
    let device = db
        .devices()
        .by_id(folder.device_id)
        .await?
        .ok_or(Error::NotFound)?;
    let factory = fs_holder
        .fs_factory_for_mrl(&device.scheme)
        .await
        .ok_or_else(|| Error::BadMrl(device.scheme.clone()))?;
    let fs_device = factory.device(&device.uuid).ok_or(Error::DeviceRemoved {
        mrl: folder.path.clone(),
    })?;
    let mountpoint = fs_device
        .mountpoints()
        .into_iter()
        .next()
        .ok_or(Error::DeviceRemoved {
            mrl: folder.path.clone(),
        })?;
    Ok(format!(
        "{}/{}",
        mountpoint.trim_end_matches('/'),
        folder.path
    ))
}

/// The `Folder.path` value for a directory: relative to the mountpoint on
/// removable devices, the full MRL otherwise.
fn folder_path(dir_mrl: &str, is_removable: bool, mountpoints: &[String]) -> String {
    if is_removable {
        for mountpoint in mountpoints {
            if let Some(relative) = mrl::relative_to(mountpoint, dir_mrl) {
                return relative;
            }
        }
    }
    dir_mrl.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_classification() {
        assert_eq!(file_type_for_extension(Some("flac")), FileType::Main);
        assert_eq!(file_type_for_extension(Some("mkv")), FileType::Main);
        assert_eq!(file_type_for_extension(Some("m3u")), FileType::Playlist);
        assert_eq!(file_type_for_extension(Some("txt")), FileType::Unknown);
        assert_eq!(file_type_for_extension(None), FileType::Unknown);
    }

    #[test]
    fn removable_folder_paths_are_relative() {
        let mountpoints = vec!["file:///mnt/usb/".to_string()];
        assert_eq!(
            folder_path("file:///mnt/usb/music/", true, &mountpoints),
            "music/"
        );
        assert_eq!(
            folder_path("file:///mnt/usb/music/", false, &mountpoints),
            "file:///mnt/usb/music/"
        );
    }
}
