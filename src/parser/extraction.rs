//! Metadata extraction service.
//!
//! First step of the chain: read the media container and populate the
//! in-memory item with metadata keys, tracks and duration. This step never
//! writes to the database, so a restart simply redoes it.
//!
//! The actual probe is a pluggable collaborator; the shipped
//! [`LoftyProbe`] reads audio tags. Playlist files are parsed here too,
//! producing one linked sub-item per entry for the linking service to
//! resolve later.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::files::FileType;
use crate::db::media_meta::MetadataKey;
use crate::db::tasks::{step, TaskType};
use crate::db::tracks::ProbedTrack;
use crate::mrl;

use super::item::Item;
use super::link;
use super::{ParserService, Status};

/// The external metadata probe: reads one container and fills the item.
pub trait MetadataProbe: Send + Sync {
    fn probe(&self, item: &mut Item) -> Status;
}

/// Tag probe for audio containers.
pub struct LoftyProbe;

impl MetadataProbe for LoftyProbe {
    fn probe(&self, item: &mut Item) -> Status {
        use lofty::prelude::*;
        use lofty::probe::Probe;

        let Ok(path) = mrl::to_path(item.mrl()) else {
            // Only local files can be probed by this backend.
            return Status::Fatal;
        };
        let tagged_file = match Probe::open(&path).and_then(|p| p.read()) {
            Ok(tagged_file) => tagged_file,
            Err(e) => {
                warn!(mrl = %item.mrl(), error = %e, "Failed to read container tags");
                return Status::Fatal;
            }
        };

        let properties = tagged_file.properties();
        item.duration = properties.duration().as_millis() as i64;
        item.tracks.push(ProbedTrack::Audio {
            codec: format!("{:?}", tagged_file.file_type()).to_lowercase(),
            bitrate: properties.audio_bitrate().unwrap_or(0) as i64,
            samplerate: properties.sample_rate().unwrap_or(0) as i64,
            nb_channels: properties.channels().unwrap_or(0) as i64,
            language: None,
        });

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            if let Some(title) = tag.title() {
                item.set_meta(MetadataKey::Title, title.to_string());
            }
            if let Some(artist) = tag.artist() {
                item.set_meta(MetadataKey::Artist, artist.to_string());
            }
            if let Some(album) = tag.album() {
                item.set_meta(MetadataKey::Album, album.to_string());
            }
            if let Some(album_artist) = tag.get_string(&lofty::tag::ItemKey::AlbumArtist) {
                item.set_meta(MetadataKey::AlbumArtist, album_artist.to_string());
            }
            if let Some(genre) = tag.genre() {
                item.set_meta(MetadataKey::Genre, genre.to_string());
            }
            if let Some(year) = tag.year() {
                item.set_meta(MetadataKey::Date, year.to_string());
            }
            if let Some(track) = tag.track() {
                item.set_meta(MetadataKey::TrackNumber, track.to_string());
            }
            if let Some(disc) = tag.disk() {
                item.set_meta(MetadataKey::DiscNumber, disc.to_string());
            }
            if let Some(disc_total) = tag.disk_total() {
                item.set_meta(MetadataKey::DiscTotal, disc_total.to_string());
            }
        }
        Status::Success
    }
}

pub struct ExtractionService {
    probe: Arc<dyn MetadataProbe>,
}

impl ExtractionService {
    pub fn new(probe: Arc<dyn MetadataProbe>) -> Self {
        Self { probe }
    }

    fn extract_playlist(&self, item: &mut Item) -> Status {
        let Ok(path) = mrl::to_path(item.mrl()) else {
            return Status::Fatal;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(mrl = %item.mrl(), error = %e, "Failed to read playlist file");
                return Status::Fatal;
            }
        };
        let extension = mrl::extension(item.mrl()).unwrap_or_default();
        let entries = link::parse_playlist(&extension, &content);
        if let Some(title) = &entries.title {
            item.set_meta(MetadataKey::Title, title.clone());
        }
        let base = item.mrl().to_string();
        for (index, location) in entries.locations.iter().enumerate() {
            match mrl::resolve(&base, location) {
                Ok(resolved) => {
                    item.create_linked_item(resolved, FileType::Main, index as i64)
                }
                Err(_) => {
                    debug!(location = %location, "Skipping unresolvable playlist entry")
                }
            }
        }
        Status::Success
    }
}

#[async_trait]
impl ParserService for ExtractionService {
    fn name(&self) -> &str {
        "metadata extraction"
    }

    fn targeted_step(&self) -> i64 {
        step::METADATA_EXTRACTION
    }

    async fn run(&self, item: &mut Item) -> Status {
        match item.task.task_type {
            // Link tasks only carry MRLs and ids; nothing to extract.
            TaskType::Link => Status::Success,
            TaskType::Restore => Status::Success,
            TaskType::Creation | TaskType::Refresh => {
                if item.task.file_type == FileType::Playlist {
                    return self.extract_playlist(item);
                }
                let extension = mrl::extension(item.mrl()).unwrap_or_default();
                if crate::discoverer::crawler::AUDIO_EXTENSIONS.contains(&extension.as_str()) {
                    self.probe.probe(item)
                } else {
                    // Video containers get no tag probe; duration and
                    // tracks stay unknown until a richer backend is
                    // plugged in.
                    item.tracks.push(ProbedTrack::Video {
                        codec: extension,
                        width: 0,
                        height: 0,
                        fps_num: 0,
                        fps_den: 1,
                        bitrate: 0,
                    });
                    Status::Success
                }
            }
        }
    }
}
