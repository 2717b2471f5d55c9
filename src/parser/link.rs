//! Linking service and playlist file parsing.
//!
//! Third step of the chain. Link tasks resolve their target MRL to an
//! existing or newly created media and attach it to the parent entity (a
//! playlist member, an external subtitle or soundtrack). Non-link tasks
//! pass through so their linking step gets marked complete.
//!
//! The read-only playlist formats (`.m3u`, `.m3u8`, `.pls`, `.xspf`,
//! `.asx`, `.wpl`, `.b4s`) are parsed here; the XML ones share one
//! event-driven reader.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::db::files::FileType;
use crate::db::media::ImportType;
use crate::db::tasks::{step, LinkType, TaskType};
use crate::db::Database;
use crate::error::Result;
use crate::mrl;

use super::item::Item;
use super::{ParserService, Status};

pub struct LinkingService {
    db: Database,
}

impl LinkingService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve the target media, creating an external one when the MRL
    /// points outside the library.
    async fn obtain_media(&self, target_mrl: &str) -> Result<crate::db::media::MediaRecord> {
        if let Some(existing) = self.db.media().by_mrl(target_mrl).await? {
            return Ok(existing);
        }
        let filename = mrl::file_name(target_mrl);
        let import_type = if target_mrl.starts_with("file://") {
            ImportType::External
        } else {
            ImportType::Stream
        };
        let media = self
            .db
            .media()
            .create_external(&filename, &filename, import_type)
            .await?;
        self.db
            .files()
            .create_external(media.id_media, target_mrl, FileType::Main)
            .await?;
        Ok(media)
    }

    async fn link(&self, item: &Item) -> Result<Status> {
        match item.task.link_to_type {
            LinkType::Playlist => {
                let Some(playlist) = self.db.playlists().by_id(item.task.link_to_id).await?
                else {
                    // The playlist is gone; its pending links die with it.
                    return Ok(Status::Discarded);
                };
                let media = self.obtain_media(item.mrl()).await?;
                self.db
                    .playlists()
                    .add_at(playlist.id_playlist, media.id_media, item.task.link_extra)
                    .await?;
                Ok(Status::Completed)
            }
            LinkType::Media => {
                let Some(media) = self.db.media().by_id(item.task.link_to_id).await? else {
                    return Ok(Status::Discarded);
                };
                self.db
                    .files()
                    .create_external(media.id_media, item.mrl(), item.task.file_type)
                    .await?;
                Ok(Status::Completed)
            }
            LinkType::NoLink => {
                warn!(mrl = %item.mrl(), "Link task without a link target, discarding");
                Ok(Status::Discarded)
            }
        }
    }
}

#[async_trait]
impl ParserService for LinkingService {
    fn name(&self) -> &str {
        "linking"
    }

    fn targeted_step(&self) -> i64 {
        step::LINKING
    }

    async fn run(&self, item: &mut Item) -> Status {
        if item.task.task_type != TaskType::Link {
            return Status::Success;
        }
        match self.link(item).await {
            Ok(status) => status,
            Err(e) if e.is_unique_violation() => {
                debug!(mrl = %item.mrl(), "Duplicate link, discarding");
                Status::Discarded
            }
            Err(e) => {
                error!(mrl = %item.mrl(), error = %e, "Linking failed");
                Status::Fatal
            }
        }
    }
}

// ---------------------------------------------------------------------
// Playlist formats
// ---------------------------------------------------------------------

/// Parsed playlist content: entry locations in file order, and an
/// optional embedded title.
#[derive(Debug, Default, Clone)]
pub struct PlaylistEntries {
    pub title: Option<String>,
    pub locations: Vec<String>,
}

/// Parse a playlist file by extension. Unknown formats yield no entries.
pub fn parse_playlist(extension: &str, content: &str) -> PlaylistEntries {
    match extension {
        "m3u" | "m3u8" => parse_m3u(content),
        "pls" => parse_pls(content),
        "xspf" => parse_xml_playlist(content, "location", Some("title")),
        "asx" => parse_xml_attribute_playlist(content, "ref", "href", Some("title")),
        "wpl" => parse_xml_attribute_playlist(content, "media", "src", Some("title")),
        "b4s" => parse_xml_attribute_playlist(content, "entry", "Playstring", Some("Name")),
        other => {
            debug!(extension = other, "Unknown playlist format");
            PlaylistEntries::default()
        }
    }
}

fn parse_m3u(content: &str) -> PlaylistEntries {
    let mut entries = PlaylistEntries::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#PLAYLIST:") {
            entries.title = Some(rest.trim().to_string());
            continue;
        }
        // A name header written by the backup exporter.
        if let Some(rest) = line.strip_prefix("# ") {
            if entries.title.is_none() && entries.locations.is_empty() {
                entries.title = Some(rest.trim().to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        entries.locations.push(line.to_string());
    }
    entries
}

fn parse_pls(content: &str) -> PlaylistEntries {
    let mut entries = PlaylistEntries::default();
    let mut numbered: Vec<(u32, String)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if let Some(index) = key.strip_prefix("File") {
                if let Ok(index) = index.parse::<u32>() {
                    numbered.push((index, value.trim().to_string()));
                }
            }
        }
    }
    numbered.sort_by_key(|(index, _)| *index);
    entries.locations = numbered.into_iter().map(|(_, location)| location).collect();
    entries
}

/// XSPF-style format: locations live in a child element's text.
fn parse_xml_playlist(
    content: &str,
    location_tag: &str,
    title_tag: Option<&str>,
) -> PlaylistEntries {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut entries = PlaylistEntries::default();
    let mut current_tag = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if current_tag == location_tag {
                    entries.locations.push(text);
                } else if Some(current_tag.as_str()) == title_tag && entries.title.is_none() {
                    entries.title = Some(text);
                }
            }
            Ok(Event::End(_)) => current_tag.clear(),
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = ?e, "Error parsing XML playlist");
                break;
            }
            _ => {}
        }
    }
    entries
}

/// ASX/WPL/B4S-style formats: locations live in an attribute of an entry
/// element.
fn parse_xml_attribute_playlist(
    content: &str,
    entry_tag: &str,
    location_attr: &str,
    title_tag: Option<&str>,
) -> PlaylistEntries {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut entries = PlaylistEntries::default();
    let mut current_tag = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if tag == entry_tag.to_lowercase() {
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
                        if key == location_attr.to_lowercase() {
                            let value = attr
                                .unescape_value()
                                .map(|v| v.to_string())
                                .unwrap_or_default();
                            if !value.is_empty() {
                                entries.locations.push(value);
                            }
                        }
                    }
                } else {
                    current_tag = tag;
                }
            }
            Ok(Event::Text(ref e)) => {
                if Some(current_tag.as_str()) == title_tag.map(|t| t.to_lowercase()).as_deref()
                    && entries.title.is_none()
                {
                    entries.title = Some(e.unescape().unwrap_or_default().to_string());
                }
            }
            Ok(Event::End(_)) => current_tag.clear(),
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = ?e, "Error parsing XML playlist");
                break;
            }
            _ => {}
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m3u_entries_and_title() {
        let content = "#EXTM3U\n#PLAYLIST:My List\n#EXTINF:123,Song\ntrack1.mp3\n\ntrack2.mp3\n";
        let entries = parse_playlist("m3u", content);
        assert_eq!(entries.title.as_deref(), Some("My List"));
        assert_eq!(entries.locations, vec!["track1.mp3", "track2.mp3"]);
    }

    #[test]
    fn pls_entries_in_numeric_order() {
        let content = "[playlist]\nFile2=b.mp3\nFile1=a.mp3\nTitle1=A\nNumberOfEntries=2\n";
        let entries = parse_playlist("pls", content);
        assert_eq!(entries.locations, vec!["a.mp3", "b.mp3"]);
    }

    #[test]
    fn xspf_locations() {
        let content = r#"<?xml version="1.0"?>
            <playlist><title>X</title><trackList>
                <track><location>file:///a.mp3</location></track>
                <track><location>file:///b.mp3</location></track>
            </trackList></playlist>"#;
        let entries = parse_playlist("xspf", content);
        assert_eq!(entries.title.as_deref(), Some("X"));
        assert_eq!(entries.locations, vec!["file:///a.mp3", "file:///b.mp3"]);
    }

    #[test]
    fn asx_refs() {
        let content = r#"<asx version="3.0"><title>Radio</title>
            <entry><ref href="http://example.com/stream"/></entry></asx>"#;
        let entries = parse_playlist("asx", content);
        assert_eq!(entries.locations, vec!["http://example.com/stream"]);
    }

    #[test]
    fn wpl_sources() {
        let content = r#"<smil><body><seq>
            <media src="a.mp3"/><media src="b.mp3"/>
        </seq></body></smil>"#;
        let entries = parse_playlist("wpl", content);
        assert_eq!(entries.locations, vec!["a.mp3", "b.mp3"]);
    }

    #[test]
    fn unknown_format_is_empty() {
        assert!(parse_playlist("nsv", "whatever").locations.is_empty());
    }
}
