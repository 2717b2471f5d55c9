//! Storage layer: connection handling and one repository per entity.
//!
//! Each entity module owns its record struct, its schema and trigger text,
//! its CRUD and its query builders. The [`Database`] wrapper owns the pool,
//! runs schema creation and migrations, and hands out repositories.

pub mod albums;
pub mod artists;
pub mod bookmarks;
pub mod chapters;
pub mod devices;
pub mod files;
pub mod folders;
pub mod genres;
pub mod groups;
pub mod labels;
pub mod media;
pub mod media_meta;
pub mod movies;
pub mod playlists;
pub mod schema;
pub mod settings;
pub mod shows;
pub mod subscriptions;
pub mod tasks;
pub mod thumbnails;
pub mod tracks;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{Error, Result};

pub use albums::AlbumRepository;
pub use artists::ArtistRepository;
pub use bookmarks::BookmarkRepository;
pub use chapters::ChapterRepository;
pub use devices::DeviceRepository;
pub use files::FileRepository;
pub use folders::FolderRepository;
pub use genres::GenreRepository;
pub use groups::MediaGroupRepository;
pub use labels::LabelRepository;
pub use media::MediaRepository;
pub use media_meta::MediaMetadataRepository;
pub use movies::MovieRepository;
pub use playlists::PlaylistRepository;
pub use settings::SettingsRepository;
pub use shows::ShowRepository;
pub use subscriptions::SubscriptionRepository;
pub use tasks::TaskRepository;
pub use thumbnails::ThumbnailRepository;
pub use tracks::TrackRepository;

/// Database wrapper providing pool access and repository constructors.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file. Foreign keys and recursive
    /// triggers are required: cleanup cascades chain through both.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("recursive_triggers", "1");
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(Self { pool })
    }

    /// Open an in-memory database. Test-oriented; a single pooled
    /// connection keeps the database alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(Error::from_sqlx)?
            .foreign_keys(true)
            .pragma("recursive_triggers", "1");
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create missing tables and triggers, then bring an older model up to
    /// the current version. A database from a newer build is a hard error.
    pub async fn prepare(&self) -> Result<()> {
        let version = schema::ensure_schema(&self.pool).await?;
        if version < schema::DB_MODEL_VERSION {
            info!(
                from = version,
                to = schema::DB_MODEL_VERSION,
                "Migrating database model"
            );
            schema::migrate(&self.pool, version).await?;
        }
        Ok(())
    }

    /// Wipe every content row, keeping devices and settings. Used before
    /// restoring from a backup.
    pub async fn clear_content(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        for table in [
            "Task",
            "PlaylistMediaRelation",
            "Playlist",
            "LabelMediaRelation",
            "Label",
            "Bookmark",
            "ThumbnailLinking",
            "Thumbnail",
            "AudioTrack",
            "VideoTrack",
            "SubtitleTrack",
            "Chapter",
            "MediaMetadata",
            "ShowEpisode",
            "Show",
            "Movie",
            "SubscriptionMediaRelation",
            "Subscription",
            "File",
            "Media",
            "BannedFolder",
            "Folder",
            "Album",
            "Genre",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        }
        // The distinguished artists survive with their counters reset.
        sqlx::query("DELETE FROM Artist WHERE id_artist > 2")
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        sqlx::query(
            "UPDATE Artist SET nb_albums = 0, nb_tracks = 0, nb_present_tracks = 0",
        )
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)
    }

    pub fn devices(&self) -> DeviceRepository {
        DeviceRepository::new(self.pool.clone())
    }

    pub fn folders(&self) -> FolderRepository {
        FolderRepository::new(self.pool.clone())
    }

    pub fn files(&self) -> FileRepository {
        FileRepository::new(self.pool.clone())
    }

    pub fn media(&self) -> MediaRepository {
        MediaRepository::new(self.pool.clone())
    }

    pub fn albums(&self) -> AlbumRepository {
        AlbumRepository::new(self.pool.clone())
    }

    pub fn artists(&self) -> ArtistRepository {
        ArtistRepository::new(self.pool.clone())
    }

    pub fn genres(&self) -> GenreRepository {
        GenreRepository::new(self.pool.clone())
    }

    pub fn playlists(&self) -> PlaylistRepository {
        PlaylistRepository::new(self.pool.clone())
    }

    pub fn shows(&self) -> ShowRepository {
        ShowRepository::new(self.pool.clone())
    }

    pub fn movies(&self) -> MovieRepository {
        MovieRepository::new(self.pool.clone())
    }

    pub fn media_groups(&self) -> MediaGroupRepository {
        MediaGroupRepository::new(self.pool.clone())
    }

    pub fn labels(&self) -> LabelRepository {
        LabelRepository::new(self.pool.clone())
    }

    pub fn bookmarks(&self) -> BookmarkRepository {
        BookmarkRepository::new(self.pool.clone())
    }

    pub fn thumbnails(&self) -> ThumbnailRepository {
        ThumbnailRepository::new(self.pool.clone())
    }

    pub fn subscriptions(&self) -> SubscriptionRepository {
        SubscriptionRepository::new(self.pool.clone())
    }

    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.pool.clone())
    }

    pub fn tracks(&self) -> TrackRepository {
        TrackRepository::new(self.pool.clone())
    }

    pub fn chapters(&self) -> ChapterRepository {
        ChapterRepository::new(self.pool.clone())
    }

    pub fn media_metadata(&self) -> MediaMetadataRepository {
        MediaMetadataRepository::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }
}
