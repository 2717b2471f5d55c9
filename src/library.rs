//! The `MediaLibrary` facade.
//!
//! A single handle owns the database, the filesystem holder, the parser
//! chain, the discoverer and the auxiliary workers, and exposes the whole
//! query/mutation surface to the host. Lifecycle is initialize (`new`) →
//! `start` → `stop`; nothing is global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache_worker::{CacheWorker, Cacher};
use crate::callbacks::{HistoryType, LibraryCallbacks};
use crate::config::LibraryConfig;
use crate::db::files::FileType;
use crate::db::media::{ImportType, MediaRecord, MediaType, ProgressResult};
use crate::db::tasks::TaskRecord;
use crate::db::thumbnails::{ThumbnailOrigin, ThumbnailRecord, ThumbnailSizeType, ThumbnailedEntity};
use crate::db::Database;
use crate::discoverer::{DiscovererWorker, FsCrawler};
use crate::error::{Error, Result};
use crate::fs::holder::FsHolder;
use crate::fs::local::LocalFsFactory;
use crate::fs::FilesystemFactory;
use crate::parser::analysis::AnalysisService;
use crate::parser::extraction::{ExtractionService, LoftyProbe, MetadataProbe};
use crate::parser::link::LinkingService;
use crate::parser::{Parser, ParserService};
use crate::query::{Query, QueryParameters};
use crate::swmr::SwmrLock;
use crate::fs::holder::FsHolderCallback;
use crate::thumbnails::worker::{Thumbnailer, ThumbnailerWorker};
use crate::thumbnails::ThumbnailManager;

/// Reloads a device's entry points when it comes back, so interrupted
/// discoveries finish and new content gets picked up.
struct DeviceReloadCallback {
    discoverer: Arc<DiscovererWorker>,
}

impl FsHolderCallback for DeviceReloadCallback {
    fn on_device_reappearing(&self, device_id: i64) {
        self.discoverer.reload_device(device_id);
    }

    fn on_device_disappearing(&self, _device_id: i64) {}
}

pub struct MediaLibrary {
    config: LibraryConfig,
    db: Database,
    callbacks: Arc<dyn LibraryCallbacks>,
    fs_holder: Arc<FsHolder>,
    local_factory: Arc<LocalFsFactory>,
    parser: Arc<Parser>,
    discoverer: Arc<DiscovererWorker>,
    thumbnail_manager: Arc<ThumbnailManager>,
    thumbnailer_worker: Mutex<Option<Arc<ThumbnailerWorker>>>,
    cache_worker: Mutex<Option<Arc<CacheWorker>>>,
    task_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskRecord>>>,
    forward_handle: Mutex<Option<JoinHandle<()>>>,
    swmr: SwmrLock,
    started: AtomicBool,
}

impl MediaLibrary {
    /// Open the database, create or migrate the schema, and build every
    /// component. Workers exist but are not running until [`start`].
    pub async fn new(
        config: LibraryConfig,
        callbacks: Arc<dyn LibraryCallbacks>,
    ) -> Result<Arc<Self>> {
        Self::with_probe(config, callbacks, Arc::new(LoftyProbe)).await
    }

    /// Same as [`new`] with a caller-supplied metadata probe. Tests use
    /// this to drive the pipeline without real media containers.
    pub async fn with_probe(
        config: LibraryConfig,
        callbacks: Arc<dyn LibraryCallbacks>,
        probe: Arc<dyn MetadataProbe>,
    ) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.workspace_dir)
            .and_then(|_| std::fs::create_dir_all(config.thumbnail_dir()))
            .and_then(|_| std::fs::create_dir_all(config.cache_dir()))
            .and_then(|_| std::fs::create_dir_all(config.playlist_backup_dir()))
            .map_err(|e| crate::error::io_error(config.workspace_dir.display().to_string(), e))?;

        let db = Database::open(&config.database_path).await?;
        db.prepare().await?;

        let fs_holder = FsHolder::new(db.clone());
        let local_factory = Arc::new(LocalFsFactory::new());

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let crawler = FsCrawler::new(
            db.clone(),
            fs_holder.clone(),
            task_tx.clone(),
            callbacks.clone(),
            config.discover_no_media,
        );

        let services: Vec<Arc<dyn ParserService>> = vec![
            Arc::new(ExtractionService::new(probe)),
            Arc::new(AnalysisService::new(db.clone(), task_tx.clone())),
            Arc::new(LinkingService::new(db.clone())),
        ];
        let parser = Parser::new(db.clone(), fs_holder.clone(), callbacks.clone(), services);

        let discoverer =
            DiscovererWorker::start(db.clone(), fs_holder.clone(), crawler, callbacks.clone());

        let thumbnail_manager =
            Arc::new(ThumbnailManager::new(db.clone(), config.thumbnail_dir()));

        Ok(Arc::new(Self {
            config,
            db,
            callbacks,
            fs_holder,
            local_factory,
            parser,
            discoverer,
            thumbnail_manager,
            thumbnailer_worker: Mutex::new(None),
            cache_worker: Mutex::new(None),
            task_rx: Mutex::new(Some(task_rx)),
            forward_handle: Mutex::new(None),
            swmr: SwmrLock::new(),
            started: AtomicBool::new(false),
        }))
    }

    /// Start background processing. The optional capabilities enable the
    /// thumbnailer and subscription-cache workers.
    pub async fn start(
        self: &Arc<Self>,
        thumbnailer: Option<Arc<dyn Thumbnailer>>,
        cacher: Option<Arc<dyn Cacher>>,
    ) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        info!(db = %self.config.database_path.display(), "Starting media library");

        let factory: Arc<dyn FilesystemFactory> = self.local_factory.clone();
        self.fs_holder.add_fs_factory(factory).await;
        self.fs_holder
            .register_device_lister(crate::fs::local::SCHEME, self.local_factory.clone())
            .await;
        if self.config.network_discovery {
            self.fs_holder.set_network_enabled(true).await?;
        }
        self.fs_holder.start_fs_factories_and_refresh().await?;

        // Newly persisted tasks (discoverer, analysis sub-items) flow into
        // the parser chain.
        let parser = self.parser.clone();
        let mut task_rx = self
            .task_rx
            .lock()
            .take()
            .ok_or(Error::Other("library already started once".into()))?;
        *self.forward_handle.lock() = Some(tokio::spawn(async move {
            while let Some(task) = task_rx.recv().await {
                parser.parse(task);
            }
        }));

        self.parser.start().await;
        self.fs_holder
            .register_callback(Arc::new(DeviceReloadCallback {
                discoverer: self.discoverer.clone(),
            }));

        if let Some(thumbnailer) = thumbnailer {
            *self.thumbnailer_worker.lock() = Some(ThumbnailerWorker::start(
                self.db.clone(),
                self.thumbnail_manager.clone(),
                thumbnailer,
                self.callbacks.clone(),
            ));
        }
        if let Some(cacher) = cacher {
            *self.cache_worker.lock() = Some(CacheWorker::start(
                self.db.clone(),
                cacher,
                self.config.cache_dir(),
                self.config.cache_quota,
                self.callbacks.clone(),
            ));
        }
        Ok(())
    }

    /// Stop every worker: signal them all, then join them all.
    pub async fn stop(&self) {
        if self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        info!("Stopping media library");
        self.discoverer.stop().await;
        self.parser.stop().await;
        let thumbnailer = self.thumbnailer_worker.lock().take();
        if let Some(worker) = thumbnailer {
            worker.stop().await;
        }
        let cache = self.cache_worker.lock().take();
        if let Some(worker) = cache {
            worker.stop().await;
        }
        if let Some(handle) = self.forward_handle.lock().take() {
            handle.abort();
        }
        self.fs_holder.stop_network_fs_factories().await;
        self.db.close().await;
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// The local factory, exposed so hosts and tests can declare
    /// removable devices.
    pub fn local_fs_factory(&self) -> &Arc<LocalFsFactory> {
        &self.local_factory
    }

    pub fn fs_holder(&self) -> &Arc<FsHolder> {
        &self.fs_holder
    }

    pub fn thumbnail_manager(&self) -> &Arc<ThumbnailManager> {
        &self.thumbnail_manager
    }

    pub fn is_parser_idle(&self) -> bool {
        self.parser.is_idle()
    }

    // ------------------------------------------------------------------
    // Discovery and entry points
    // ------------------------------------------------------------------

    pub fn discover(&self, entry_point: &str) {
        self.discoverer.discover(entry_point);
    }

    pub fn reload(&self) {
        self.discoverer.reload();
    }

    pub fn reload_entry_point(&self, entry_point: &str) {
        self.discoverer.reload_entry_point(entry_point);
    }

    pub fn remove_entry_point(&self, entry_point: &str) {
        self.discoverer.remove(entry_point);
    }

    pub fn ban_folder(&self, entry_point: &str) {
        self.discoverer.ban(entry_point);
    }

    pub fn unban_folder(&self, entry_point: &str) {
        self.discoverer.unban(entry_point);
    }

    pub async fn entry_points(&self) -> Result<Vec<String>> {
        let roots = self.db.folders().roots().await?;
        let mut entry_points = Vec::with_capacity(roots.len());
        for root in roots {
            entry_points
                .push(crate::discoverer::crawler::folder_mrl(&self.db, &self.fs_holder, &root).await?);
        }
        Ok(entry_points)
    }

    pub async fn set_network_enabled(&self, enabled: bool) -> Result<bool> {
        let holder = self.fs_holder.clone();
        holder.set_network_enabled(enabled).await
    }

    pub fn is_network_enabled(&self) -> bool {
        self.fs_holder.is_network_enabled()
    }

    /// Pause background parsing (the discoverer keeps queueing tasks).
    pub fn pause_background_operations(&self) {
        self.parser.pause();
        if let Some(worker) = self.thumbnailer_worker.lock().as_ref() {
            worker.pause();
        }
        if let Some(worker) = self.cache_worker.lock().as_ref() {
            worker.pause();
        }
    }

    pub fn resume_background_operations(&self) {
        self.parser.resume();
        if let Some(worker) = self.thumbnailer_worker.lock().as_ref() {
            worker.resume();
        }
        if let Some(worker) = self.cache_worker.lock().as_ref() {
            worker.resume();
        }
    }

    /// Flush the parser and replay every uncompleted task. Maintenance
    /// takes priority access over ordinary queries for the duration of
    /// the flush.
    pub async fn force_rescan(&self) -> Result<()> {
        self.callbacks.on_rescan_started();
        let _priority = self.swmr.acquire_priority_access();
        self.parser.flush().await;
        self.parser.rescan().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    pub async fn media(&self, id: i64) -> Result<Option<MediaRecord>> {
        self.db.media().by_id(id).await
    }

    pub async fn media_by_mrl(&self, mrl: &str) -> Result<Option<MediaRecord>> {
        self.db.media().by_mrl(mrl).await
    }

    pub fn audio_files(&self, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().listing(MediaType::Audio, params)
    }

    pub fn video_files(&self, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().listing(MediaType::Video, params)
    }

    pub fn media_listing(&self, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().all_media(params)
    }

    pub fn search_media(&self, pattern: &str, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().search(pattern, params)
    }

    /// Register a media living outside any entry point.
    pub async fn add_external_media(&self, mrl: &str) -> Result<MediaRecord> {
        self.add_external(mrl, ImportType::External).await
    }

    /// Register a network stream.
    pub async fn add_stream(&self, mrl: &str) -> Result<MediaRecord> {
        self.add_external(mrl, ImportType::Stream).await
    }

    async fn add_external(&self, mrl: &str, import_type: ImportType) -> Result<MediaRecord> {
        if let Some(existing) = self.db.media().by_mrl(mrl).await? {
            return Ok(existing);
        }
        let filename = crate::mrl::file_name(mrl);
        let media = self
            .db
            .media()
            .create_external(&filename, &filename, import_type)
            .await?;
        self.db
            .files()
            .create_external(media.id_media, mrl, FileType::Main)
            .await?;
        self.callbacks.on_media_added(&[media.id_media]);
        Ok(media)
    }

    pub async fn convert_to_external(&self, media_id: i64) -> Result<()> {
        self.db.media().convert_to_external(media_id).await?;
        self.callbacks.on_media_modified(&[media_id]);
        Ok(())
    }

    pub async fn delete_media(&self, media_id: i64) -> Result<bool> {
        let deleted = self.db.media().delete(media_id).await?;
        if deleted {
            self.callbacks.on_media_deleted(&[media_id]);
        }
        Ok(deleted)
    }

    pub async fn set_media_favorite(&self, media_id: i64, favorite: bool) -> Result<()> {
        self.db.media().set_favorite(media_id, favorite).await?;
        self.callbacks.on_media_modified(&[media_id]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Playback progress and history
    // ------------------------------------------------------------------

    pub async fn set_last_position(&self, media_id: i64, position: f64) -> Result<ProgressResult> {
        let Some(media) = self.db.media().by_id(media_id).await? else {
            return Ok(ProgressResult::Error);
        };
        let result = self.db.media().set_last_position(&media, position).await?;
        self.notify_history(&media);
        Ok(result)
    }

    pub async fn set_last_time(&self, media_id: i64, time_ms: i64) -> Result<ProgressResult> {
        let Some(media) = self.db.media().by_id(media_id).await? else {
            return Ok(ProgressResult::Error);
        };
        let result = self.db.media().set_last_time(&media, time_ms).await?;
        self.notify_history(&media);
        Ok(result)
    }

    fn notify_history(&self, media: &MediaRecord) {
        let history_type = if media.is_stream() {
            HistoryType::Network
        } else {
            HistoryType::Media
        };
        self.callbacks.on_history_changed(history_type);
    }

    pub fn history(&self, history_type: HistoryType) -> Query<MediaRecord> {
        self.db.media().history(history_type == HistoryType::Network)
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.db.media().clear_history().await?;
        self.callbacks.on_history_changed(HistoryType::Media);
        self.callbacks.on_history_changed(HistoryType::Network);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn albums(&self, params: &QueryParameters) -> Query<crate::db::albums::AlbumRecord> {
        self.db.albums().listing(params)
    }

    pub fn artists(&self, params: &QueryParameters) -> Query<crate::db::artists::ArtistRecord> {
        self.db.artists().listing(params)
    }

    pub fn genres(&self, params: &QueryParameters) -> Query<crate::db::genres::GenreRecord> {
        self.db.genres().listing(params)
    }

    pub fn playlists(&self, params: &QueryParameters) -> Query<crate::db::playlists::PlaylistRecord> {
        self.db.playlists().listing(params)
    }

    pub fn shows(&self, params: &QueryParameters) -> Query<crate::db::shows::ShowRecord> {
        self.db.shows().listing(params)
    }

    pub fn media_groups(&self, params: &QueryParameters) -> Query<crate::db::groups::MediaGroupRecord> {
        self.db.media_groups().listing(params)
    }

    pub fn folders(&self, params: &QueryParameters) -> Query<crate::db::folders::FolderRecord> {
        self.db.folders().listing(params)
    }

    pub fn album_tracks(&self, album_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().album_tracks(album_id, params)
    }

    pub fn show_episodes(&self, show_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.shows().episodes(show_id, params)
    }

    pub fn search_albums(&self, pattern: &str) -> Query<crate::db::albums::AlbumRecord> {
        self.db.albums().search(pattern)
    }

    pub fn search_artists(&self, pattern: &str) -> Query<crate::db::artists::ArtistRecord> {
        self.db.artists().search(pattern)
    }

    pub fn search_genres(&self, pattern: &str) -> Query<crate::db::genres::GenreRecord> {
        self.db.genres().search(pattern)
    }

    pub fn search_playlists(&self, pattern: &str) -> Query<crate::db::playlists::PlaylistRecord> {
        self.db.playlists().search(pattern)
    }

    pub fn search_shows(&self, pattern: &str) -> Query<crate::db::shows::ShowRecord> {
        self.db.shows().search(pattern)
    }

    pub fn search_folders(&self, pattern: &str) -> Query<crate::db::folders::FolderRecord> {
        self.db.folders().search(pattern)
    }

    // ------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------

    pub async fn create_playlist(&self, name: &str) -> Result<crate::db::playlists::PlaylistRecord> {
        let playlist = self.db.playlists().create(name).await?;
        self.callbacks.on_playlists_added(&[playlist.id_playlist]);
        Ok(playlist)
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<bool> {
        let deleted = self.db.playlists().delete(playlist_id).await?;
        if deleted {
            self.callbacks.on_playlists_deleted(&[playlist_id]);
        }
        Ok(deleted)
    }

    async fn writable_playlist(&self, playlist_id: i64) -> Result<()> {
        match self.db.playlists().by_id(playlist_id).await? {
            None => Err(Error::NotFound),
            Some(playlist) if playlist.is_read_only => {
                Err(Error::Other("playlist is read-only".into()))
            }
            Some(_) => Ok(()),
        }
    }

    pub async fn playlist_append(&self, playlist_id: i64, media_id: i64) -> Result<bool> {
        self.writable_playlist(playlist_id).await?;
        let appended = self.db.playlists().append(playlist_id, media_id).await?;
        self.callbacks.on_playlists_modified(&[playlist_id]);
        Ok(appended)
    }

    pub async fn playlist_add_at(
        &self,
        playlist_id: i64,
        media_id: i64,
        position: i64,
    ) -> Result<bool> {
        self.writable_playlist(playlist_id).await?;
        let added = self.db.playlists().add_at(playlist_id, media_id, position).await?;
        self.callbacks.on_playlists_modified(&[playlist_id]);
        Ok(added)
    }

    pub async fn playlist_move(&self, playlist_id: i64, from: i64, to: i64) -> Result<bool> {
        self.writable_playlist(playlist_id).await?;
        let moved = self.db.playlists().move_media(playlist_id, from, to).await?;
        self.callbacks.on_playlists_modified(&[playlist_id]);
        Ok(moved)
    }

    pub async fn playlist_remove_at(&self, playlist_id: i64, position: i64) -> Result<bool> {
        self.writable_playlist(playlist_id).await?;
        let removed = self.db.playlists().remove_at(playlist_id, position).await?;
        self.callbacks.on_playlists_modified(&[playlist_id]);
        Ok(removed)
    }

    pub fn playlist_media(&self, playlist_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.playlists().media(playlist_id, params)
    }

    /// Export every playlist as an m3u8-style backup file named by id,
    /// with the playlist name as a comment header.
    pub async fn backup_playlists(&self) -> Result<()> {
        let dir = self.config.playlist_backup_dir();
        for playlist in self.db.playlists().all().await? {
            let mut content = format!("# {}\n", playlist.name);
            for item in self.db.playlists().items(playlist.id_playlist).await? {
                if let Some(file) = self.db.files().main_file(item.media_id).await? {
                    content.push_str(&file.mrl);
                    content.push('\n');
                }
            }
            let path = dir.join(format!("{}.m3u8", playlist.id_playlist));
            std::fs::write(&path, content)
                .map_err(|e| crate::error::io_error(path.display().to_string(), e))?;
        }
        Ok(())
    }

    /// Drop every content row (media, playlists, albums, tasks, ...) while
    /// keeping devices and settings. Maintenance holds priority access for
    /// the duration.
    pub async fn clear_database(&self) -> Result<()> {
        let _priority = self.swmr.acquire_priority_access();
        self.parser.flush().await;
        self.db.clear_content().await?;
        self.parser.resume();
        Ok(())
    }

    /// Replay playlist backups as restore tasks.
    pub async fn restore_playlists(&self) -> Result<()> {
        let dir = self.config.playlist_backup_dir();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| crate::error::io_error(dir.display().to_string(), e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("m3u8") {
                continue;
            }
            let backup_mrl = crate::mrl::from_path(&path);
            match self.db.tasks().create_restore(&backup_mrl, FileType::Playlist).await {
                Ok(task) => self.parser.parse(task),
                Err(e) if e.is_unique_violation() => {}
                Err(e) => error!(mrl = %backup_mrl, error = %e, "Failed to queue restore task"),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub async fn create_media_group(
        &self,
        name: &str,
    ) -> Result<crate::db::groups::MediaGroupRecord> {
        let group = self.db.media_groups().create(name, false).await?;
        self.callbacks.on_media_groups_added(&[group.id_group]);
        Ok(group)
    }

    pub async fn add_to_group(&self, media_id: i64, group_id: i64) -> Result<()> {
        let Some(group) = self.db.media_groups().by_id(group_id).await? else {
            return Err(Error::NotFound);
        };
        if group.forced_singleton {
            self.db.media_groups().clear_forced_singleton(group_id).await?;
        }
        self.db.media().set_group(media_id, Some(group_id)).await?;
        self.callbacks.on_media_groups_modified(&[group_id]);
        Ok(())
    }

    /// Detach a media from its group; an emptied group is collected by
    /// trigger.
    pub async fn remove_from_group(&self, media_id: i64) -> Result<()> {
        let Some(media) = self.db.media().by_id(media_id).await? else {
            return Err(Error::NotFound);
        };
        self.db.media().set_group(media_id, None).await?;
        if let Some(group_id) = media.group_id {
            self.callbacks.on_media_groups_modified(&[group_id]);
        }
        Ok(())
    }

    pub fn group_media(&self, group_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        self.db.media().in_group(group_id, params)
    }

    // ------------------------------------------------------------------
    // Labels and bookmarks
    // ------------------------------------------------------------------

    pub async fn create_label(&self, name: &str) -> Result<crate::db::labels::LabelRecord> {
        self.db.labels().create(name).await
    }

    pub async fn attach_label(&self, label_id: i64, media_id: i64) -> Result<bool> {
        let attached = self.db.labels().attach(label_id, media_id).await?;
        if attached {
            self.callbacks.on_media_modified(&[media_id]);
        }
        Ok(attached)
    }

    pub async fn detach_label(&self, label_id: i64, media_id: i64) -> Result<bool> {
        let detached = self.db.labels().detach(label_id, media_id).await?;
        if detached {
            self.callbacks.on_media_modified(&[media_id]);
        }
        Ok(detached)
    }

    pub async fn add_bookmark(
        &self,
        media_id: i64,
        time: i64,
    ) -> Result<crate::db::bookmarks::BookmarkRecord> {
        let bookmark = self.db.bookmarks().create(media_id, time).await?;
        self.callbacks.on_bookmarks_added(&[bookmark.id_bookmark]);
        Ok(bookmark)
    }

    pub async fn remove_bookmark(&self, bookmark_id: i64) -> Result<bool> {
        let removed = self.db.bookmarks().delete(bookmark_id).await?;
        if removed {
            self.callbacks.on_bookmarks_deleted(&[bookmark_id]);
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Thumbnails
    // ------------------------------------------------------------------

    pub async fn media_thumbnail(
        &self,
        media_id: i64,
        size_type: ThumbnailSizeType,
    ) -> Result<Option<ThumbnailRecord>> {
        self.thumbnail_manager
            .thumbnail(ThumbnailedEntity::Media, media_id, size_type)
            .await
    }

    /// Attach a host-provided thumbnail to a media, copy-on-write when the
    /// current one is shared.
    pub async fn set_media_thumbnail(
        &self,
        media_id: i64,
        size_type: ThumbnailSizeType,
        thumbnail_mrl: &str,
    ) -> Result<ThumbnailRecord> {
        self.thumbnail_manager
            .set_thumbnail(
                ThumbnailedEntity::Media,
                media_id,
                size_type,
                thumbnail_mrl,
                ThumbnailOrigin::UserProvided,
            )
            .await
    }

    pub fn request_thumbnail(&self, media_id: i64, size_type: ThumbnailSizeType) -> bool {
        match self.thumbnailer_worker.lock().as_ref() {
            Some(worker) => {
                worker.request(media_id, size_type);
                true
            }
            None => false,
        }
    }

    pub async fn flush_user_provided_thumbnails(&self) -> Result<()> {
        self.thumbnail_manager.flush_user_provided().await
    }

    // ------------------------------------------------------------------
    // Subscription cache
    // ------------------------------------------------------------------

    pub fn cache_media(&self, media_id: i64) -> bool {
        self.cache_worker
            .lock()
            .as_ref()
            .map(|worker| worker.cache_media(media_id))
            .unwrap_or(false)
    }

    pub fn remove_cached_media(&self, media_id: i64) -> bool {
        self.cache_worker
            .lock()
            .as_ref()
            .map(|worker| worker.remove_cached(media_id))
            .unwrap_or(false)
    }

    pub fn cache_subscriptions(&self) {
        if let Some(worker) = self.cache_worker.lock().as_ref() {
            worker.cache_subscriptions();
        }
    }

    pub async fn create_subscription(
        &self,
        name: &str,
    ) -> Result<crate::db::subscriptions::SubscriptionRecord> {
        self.db.subscriptions().create(name).await
    }

    pub async fn subscriptions(&self) -> Result<Vec<crate::db::subscriptions::SubscriptionRecord>> {
        self.db.subscriptions().all().await
    }

    pub async fn subscribe_media(&self, subscription_id: i64, media_id: i64) -> Result<bool> {
        self.db.subscriptions().add_media(subscription_id, media_id).await
    }
}
