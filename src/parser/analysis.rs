//! Metadata analysis service.
//!
//! Second step of the chain and the only one writing entity rows: it
//! creates or updates the media, file, album, artist, genre and show rows
//! from what extraction gathered, attaches tracks, and persists one link
//! task per sub-item so the linking service can resolve playlist members.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::db::artists::UNKNOWN_ARTIST_ID;
use crate::db::files::FileType;
use crate::db::folders::FolderRecord;
use crate::db::media::{MediaRecord, MediaSubtype, MediaType};
use crate::db::media_meta::MetadataKey;
use crate::db::tasks::{step, LinkType, TaskRecord, TaskType};
use crate::db::Database;
use crate::error::Result;
use crate::mrl;

use super::item::Item;
use super::{ParserService, Status};

pub struct AnalysisService {
    db: Database,
    /// Newly persisted link tasks go back to the parser through here.
    task_sink: mpsc::UnboundedSender<TaskRecord>,
}

impl AnalysisService {
    pub fn new(db: Database, task_sink: mpsc::UnboundedSender<TaskRecord>) -> Self {
        Self { db, task_sink }
    }

    async fn parent_folder(&self, item: &Item) -> Result<Option<FolderRecord>> {
        match item.task.parent_folder_id {
            Some(folder_id) => self.db.folders().by_id(folder_id).await,
            None => Ok(None),
        }
    }

    /// The MRL value stored on the file row: just the file name for
    /// removable devices, the full MRL otherwise.
    fn stored_mrl(item: &Item, folder: &FolderRecord) -> String {
        if folder.is_removable {
            mrl::file_name(item.mrl())
        } else {
            item.mrl().to_string()
        }
    }

    async fn run_creation(&self, item: &mut Item) -> Result<Status> {
        let Some(folder) = self.parent_folder(item).await? else {
            warn!(mrl = %item.mrl(), "Parent folder vanished, discarding task");
            return Ok(Status::Discarded);
        };
        if item.task.file_type == FileType::Playlist {
            return self.create_playlist(item, &folder).await;
        }
        self.create_media(item, &folder).await
    }

    async fn create_media(&self, item: &mut Item, folder: &FolderRecord) -> Result<Status> {
        let extension = mrl::extension(item.mrl()).unwrap_or_default();
        let media_type = if crate::discoverer::crawler::AUDIO_EXTENSIONS
            .contains(&extension.as_str())
        {
            MediaType::Audio
        } else {
            MediaType::Video
        };
        let filename = mrl::file_name(item.mrl());
        let title = item
            .meta(MetadataKey::Title)
            .map(|s| s.to_string())
            .unwrap_or_else(|| stem(&filename));

        let stored_mrl = Self::stored_mrl(item, folder);
        let media = match self.db.files().by_mrl(&stored_mrl).await? {
            // The file already landed in a previous, interrupted pass.
            Some(existing) => match existing.media_id {
                Some(media_id) => self
                    .db
                    .media()
                    .by_id(media_id)
                    .await?
                    .ok_or(crate::error::Error::NotFound)?,
                None => return Ok(Status::Discarded),
            },
            None => {
                let media = self
                    .db
                    .media()
                    .create(media_type, &title, &filename, folder.id_folder, folder.device_id)
                    .await?;
                let (modification_date, size) = item
                    .fs_file
                    .as_ref()
                    .map(|f| (f.last_modification_date(), f.size()))
                    .unwrap_or((0, 0));
                let file = self
                    .db
                    .files()
                    .create(
                        Some(media.id_media),
                        None,
                        &stored_mrl,
                        FileType::Main,
                        Some(folder.id_folder),
                        modification_date,
                        size,
                        folder.is_removable,
                        false,
                    )
                    .await?;
                self.db.tasks().set_file_id(item.task.id_task, file.id_file).await?;
                item.task.file_id = Some(file.id_file);
                item.file = Some(file);
                media
            }
        };

        self.apply_metadata(item, &media).await?;
        item.media = self.db.media().by_id(media.id_media).await?;
        Ok(Status::Success)
    }

    /// Apply extracted metadata onto the media row: duration, tracks,
    /// title, and the album/artist/genre linkage for audio.
    async fn apply_metadata(&self, item: &Item, media: &MediaRecord) -> Result<()> {
        let media_id = media.id_media;
        if item.duration > 0 {
            self.db.media().set_duration(media_id, item.duration).await?;
        }
        if !item.tracks.is_empty() {
            self.db.tracks().replace_for_media(media_id, &item.tracks).await?;
        }
        if let Some(title) = item.meta(MetadataKey::Title) {
            self.db.media().set_title(media_id, title, false).await?;
        }
        if let Some(date) = item.meta(MetadataKey::Date) {
            if let Ok(year) = date[..date.len().min(4)].parse::<i64>() {
                self.db.media().set_release_date(media_id, year).await?;
            }
        }
        for (key, value) in &item.metadata {
            self.db.media_metadata().set(media_id, *key, value).await?;
        }

        if media.media_type == MediaType::Audio
            || mrl::extension(item.mrl())
                .map(|e| crate::discoverer::crawler::AUDIO_EXTENSIONS.contains(&e.as_str()))
                .unwrap_or(false)
        {
            self.link_album_track(item, media_id).await?;
        } else {
            self.link_show_episode(item, media_id).await?;
        }
        Ok(())
    }

    async fn link_album_track(&self, item: &Item, media_id: i64) -> Result<()> {
        let album_title = item.meta(MetadataKey::Album);
        let artist_name = item
            .meta(MetadataKey::AlbumArtist)
            .or_else(|| item.meta(MetadataKey::Artist));
        if album_title.is_none() && artist_name.is_none() {
            return Ok(());
        }
        let artist_id = match artist_name {
            Some(name) => self.db.artists().obtain(name).await?.id_artist,
            None => UNKNOWN_ARTIST_ID,
        };
        let genre_id = match item.meta(MetadataKey::Genre) {
            Some(name) => Some(self.db.genres().obtain(name).await?.id_genre),
            None => None,
        };
        let track_number = item
            .meta(MetadataKey::TrackNumber)
            .and_then(|s| s.parse::<i64>().ok());
        let disc_number = item
            .meta(MetadataKey::DiscNumber)
            .and_then(|s| s.parse::<i64>().ok());

        let album_id = match album_title {
            Some(title) => {
                let album = match self
                    .db
                    .albums()
                    .by_title_and_artist(title, artist_id)
                    .await?
                {
                    Some(album) => album,
                    None => self.db.albums().create(title, Some(artist_id)).await?,
                };
                if let Some(year) = item
                    .meta(MetadataKey::Date)
                    .and_then(|d| d[..d.len().min(4)].parse::<i64>().ok())
                {
                    self.db.albums().set_release_year(album.id_album, year).await?;
                }
                if let Some(disc) = disc_number {
                    self.db.albums().update_nb_discs(album.id_album, disc).await?;
                }
                album.id_album
            }
            None => return Ok(()),
        };

        self.db
            .media()
            .link_album_track(media_id, album_id, artist_id, genre_id, track_number, disc_number)
            .await
    }

    async fn link_show_episode(&self, item: &Item, media_id: i64) -> Result<()> {
        let (Some(show_name), Some(episode)) = (
            item.meta(MetadataKey::ShowName),
            item.meta(MetadataKey::Episode)
                .and_then(|s| s.parse::<i64>().ok()),
        ) else {
            return Ok(());
        };
        let show = self.db.shows().obtain(show_name).await?;
        self.db
            .shows()
            .add_episode(show.id_show, media_id, 1, episode)
            .await?;
        self.db
            .media()
            .set_subtype(media_id, MediaSubtype::ShowEpisode)
            .await
    }

    async fn create_playlist(&self, item: &mut Item, folder: &FolderRecord) -> Result<Status> {
        let stored_mrl = Self::stored_mrl(item, folder);
        let (modification_date, size) = item
            .fs_file
            .as_ref()
            .map(|f| (f.last_modification_date(), f.size()))
            .unwrap_or((0, 0));
        let file = match self.db.files().by_mrl(&stored_mrl).await? {
            Some(existing) => existing,
            None => {
                self.db
                    .files()
                    .create(
                        None,
                        None,
                        &stored_mrl,
                        FileType::Playlist,
                        Some(folder.id_folder),
                        modification_date,
                        size,
                        folder.is_removable,
                        false,
                    )
                    .await?
            }
        };
        let playlist = match self.db.playlists().by_file(file.id_file).await? {
            Some(existing) => existing,
            None => {
                let name = item
                    .meta(MetadataKey::Title)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| stem(&mrl::file_name(item.mrl())));
                let playlist = self.db.playlists().create_from_file(&name, file.id_file).await?;
                self.db.files().set_playlist_id(file.id_file, playlist.id_playlist).await?;
                playlist
            }
        };
        self.db.tasks().set_file_id(item.task.id_task, file.id_file).await?;
        item.task.file_id = Some(file.id_file);
        item.file = Some(file);

        // Persist one link task per playlist entry now that the parent
        // exists.
        for linked in &item.linked_items {
            match self
                .db
                .tasks()
                .create_link(
                    &linked.mrl,
                    linked.file_type,
                    playlist.id_playlist,
                    LinkType::Playlist,
                    linked.link_extra,
                )
                .await
            {
                Ok(task) => {
                    let _ = self.task_sink.send(task);
                }
                Err(e) if e.is_unique_violation() => {
                    debug!(mrl = %linked.mrl, "Link task already pending")
                }
                Err(e) => {
                    error!(mrl = %linked.mrl, error = %e, "Failed to persist link task")
                }
            }
        }
        Ok(Status::Success)
    }

    async fn run_refresh(&self, item: &mut Item) -> Result<Status> {
        let Some(file) = item.file.clone() else {
            return Ok(Status::Discarded);
        };
        if let Some(fs_file) = &item.fs_file {
            self.db
                .files()
                .update_modification(file.id_file, fs_file.last_modification_date(), fs_file.size())
                .await?;
        }
        match file.media_id {
            Some(media_id) => {
                let Some(media) = self.db.media().by_id(media_id).await? else {
                    return Ok(Status::Discarded);
                };
                self.apply_metadata(item, &media).await?;
                item.media = self.db.media().by_id(media_id).await?;
                Ok(Status::Success)
            }
            // A refreshed playlist file: reparse its members.
            None => match file.playlist_id {
                Some(_) => Ok(Status::Success),
                None => Ok(Status::Discarded),
            },
        }
    }

    /// Restore tasks recreate a playlist from a backup file; the linking
    /// service resolves the members like any imported playlist.
    async fn run_restore(&self, item: &mut Item) -> Result<Status> {
        let Ok(path) = mrl::to_path(item.mrl()) else {
            return Ok(Status::Fatal);
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(mrl = %item.mrl(), error = %e, "Failed to read playlist backup");
                return Ok(Status::Fatal);
            }
        };
        let entries = super::link::parse_playlist("m3u8", &content);
        let name = entries
            .title
            .clone()
            .unwrap_or_else(|| stem(&mrl::file_name(item.mrl())));
        let playlist = self.db.playlists().create(&name).await?;
        for (index, location) in entries.locations.iter().enumerate() {
            match self
                .db
                .tasks()
                .create_link(
                    location,
                    FileType::Main,
                    playlist.id_playlist,
                    LinkType::Playlist,
                    index as i64,
                )
                .await
            {
                Ok(task) => {
                    let _ = self.task_sink.send(task);
                }
                Err(e) if e.is_unique_violation() => {}
                Err(e) => {
                    error!(location = %location, error = %e, "Failed to persist restore link")
                }
            }
        }
        Ok(Status::Success)
    }
}

#[async_trait]
impl ParserService for AnalysisService {
    fn name(&self) -> &str {
        "metadata analysis"
    }

    fn targeted_step(&self) -> i64 {
        step::METADATA_ANALYSIS
    }

    async fn run(&self, item: &mut Item) -> Status {
        let result = match item.task.task_type {
            TaskType::Link => return Status::Success,
            TaskType::Creation => self.run_creation(item).await,
            TaskType::Refresh => self.run_refresh(item).await,
            TaskType::Restore => self.run_restore(item).await,
        };
        match result {
            Ok(status) => status,
            Err(e) => {
                error!(mrl = %item.mrl(), error = %e, "Analysis failed");
                Status::Fatal
            }
        }
    }
}

/// File name without its extension.
fn stem(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename[..idx].to_string(),
        _ => filename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_one_extension() {
        assert_eq!(stem("track.flac"), "track");
        assert_eq!(stem("archive.tar.gz"), "archive.tar");
        assert_eq!(stem("noext"), "noext");
        assert_eq!(stem(".hidden"), ".hidden");
    }
}
