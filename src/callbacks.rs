//! Host-facing callback surface.
//!
//! The host implements [`LibraryCallbacks`]; the library invokes it from
//! internal tasks, so implementations must not block. Every method has a
//! default no-op body so hosts only override what they consume.

/// Which history view changed after a playback progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryType {
    /// Local audio/video playback history.
    Media,
    /// Network stream playback history.
    Network,
}

#[allow(unused_variables)]
pub trait LibraryCallbacks: Send + Sync {
    // Entity lifecycle. Ids are batched by the storage layer before dispatch.
    fn on_media_added(&self, ids: &[i64]) {}
    fn on_media_modified(&self, ids: &[i64]) {}
    fn on_media_deleted(&self, ids: &[i64]) {}
    fn on_albums_added(&self, ids: &[i64]) {}
    fn on_albums_modified(&self, ids: &[i64]) {}
    fn on_albums_deleted(&self, ids: &[i64]) {}
    fn on_artists_added(&self, ids: &[i64]) {}
    fn on_artists_modified(&self, ids: &[i64]) {}
    fn on_artists_deleted(&self, ids: &[i64]) {}
    fn on_genres_added(&self, ids: &[i64]) {}
    fn on_genres_modified(&self, ids: &[i64]) {}
    fn on_genres_deleted(&self, ids: &[i64]) {}
    fn on_playlists_added(&self, ids: &[i64]) {}
    fn on_playlists_modified(&self, ids: &[i64]) {}
    fn on_playlists_deleted(&self, ids: &[i64]) {}
    fn on_media_groups_added(&self, ids: &[i64]) {}
    fn on_media_groups_modified(&self, ids: &[i64]) {}
    fn on_media_groups_deleted(&self, ids: &[i64]) {}
    fn on_bookmarks_added(&self, ids: &[i64]) {}
    fn on_bookmarks_modified(&self, ids: &[i64]) {}
    fn on_bookmarks_deleted(&self, ids: &[i64]) {}

    // Discovery.
    fn on_discovery_started(&self) {}
    fn on_discovery_progress(&self, mrl: &str) {}
    fn on_discovery_completed(&self) {}
    fn on_discovery_failed(&self, mrl: &str) {}

    // Entry points.
    fn on_entry_point_added(&self, mrl: &str, success: bool) {}
    fn on_entry_point_removed(&self, mrl: &str, success: bool) {}
    fn on_entry_point_banned(&self, mrl: &str, success: bool) {}
    fn on_entry_point_unbanned(&self, mrl: &str, success: bool) {}

    // Pipeline.
    fn on_parsing_stats_updated(&self, done: u32, scheduled: u32) {}
    fn on_background_tasks_idle_changed(&self, idle: bool) {}
    fn on_rescan_started(&self) {}

    // Thumbnails.
    fn on_media_thumbnail_ready(
        &self,
        media_id: i64,
        size_type: crate::db::thumbnails::ThumbnailSizeType,
        success: bool,
    ) {
    }

    // History.
    fn on_history_changed(&self, history_type: HistoryType) {}

    // Subscription cache.
    fn on_cache_idle_changed(&self, idle: bool) {}
    fn on_subscription_cache_updated(&self, subscription_id: i64) {}
}

/// A callbacks implementation that ignores everything. Used as the default
/// when the host does not care, and by tests.
pub struct NoopCallbacks;

impl LibraryCallbacks for NoopCallbacks {}
