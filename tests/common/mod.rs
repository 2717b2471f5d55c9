//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use curator::callbacks::NoopCallbacks;
use curator::db::media_meta::MetadataKey;
use curator::db::tracks::ProbedTrack;
use curator::db::Database;
use curator::parser::extraction::MetadataProbe;
use curator::parser::{Item, Status};
use curator::{LibraryConfig, MediaLibrary};

/// A metadata probe fed from a per-file-name tag table, so the pipeline
/// can be driven without real media containers.
#[derive(Default)]
pub struct FakeProbe {
    tags: HashMap<String, Vec<(MetadataKey, String)>>,
    duration_ms: i64,
}

impl FakeProbe {
    pub fn new(duration_ms: i64) -> Self {
        Self {
            tags: HashMap::new(),
            duration_ms,
        }
    }

    pub fn tag(mut self, file_name: &str, tags: &[(MetadataKey, &str)]) -> Self {
        self.tags.insert(
            file_name.to_string(),
            tags.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        );
        self
    }
}

impl MetadataProbe for FakeProbe {
    fn probe(&self, item: &mut Item) -> Status {
        let name = curator::mrl::file_name(item.mrl());
        if let Some(tags) = self.tags.get(&name) {
            for (key, value) in tags {
                item.set_meta(*key, value.clone());
            }
        }
        item.duration = self.duration_ms;
        item.tracks.push(ProbedTrack::Audio {
            codec: "flac".to_string(),
            bitrate: 320,
            samplerate: 44100,
            nb_channels: 2,
            language: None,
        });
        Status::Success
    }
}

/// A library over a temp directory, started with a fake probe.
pub struct TestLibrary {
    pub library: Arc<MediaLibrary>,
    root: tempfile::TempDir,
}

impl TestLibrary {
    pub async fn start(probe: Arc<dyn MetadataProbe>) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let config = LibraryConfig::new(root.path().join("test.db"), root.path().join("ws"));
        let library = MediaLibrary::with_probe(config, Arc::new(NoopCallbacks), probe)
            .await
            .expect("library init");
        library.start(None, None).await.expect("library start");
        TestLibrary { library, root }
    }

    /// The configuration used by this library; lets a test reopen the
    /// same database after a stop.
    pub fn config(&self) -> LibraryConfig {
        LibraryConfig::new(self.root.path().join("test.db"), self.root.path().join("ws"))
    }

    /// Directory to drop sample media files into.
    pub fn media_dir(&self) -> PathBuf {
        let dir = self.root.path().join("media");
        std::fs::create_dir_all(&dir).expect("media dir");
        dir
    }

    pub fn entry_point(&self) -> String {
        curator::mrl::from_path(&self.media_dir()) + "/"
    }

    /// Wait until the pipeline has been idle for a few consecutive polls.
    pub async fn wait_idle(&self) {
        let deadline = Instant::now() + Duration::from_secs(15);
        let mut stable = 0;
        while stable < 5 {
            assert!(Instant::now() < deadline, "pipeline never went idle");
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.library.is_parser_idle() {
                stable += 1;
            } else {
                stable = 0;
            }
        }
    }
}

/// A bare database over a temp file, schema prepared.
pub async fn test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open(&dir.path().join("test.db"))
        .await
        .expect("open db");
    db.prepare().await.expect("prepare schema");
    (db, dir)
}

/// Insert a present device + folder pair, returning (device_id, folder_id).
pub async fn seed_folder(db: &Database) -> (i64, i64) {
    let device = db
        .devices()
        .create("test-device", "file://", true, false)
        .await
        .expect("device");
    let folder = db
        .folders()
        .create("music/", "music", None, device.id_device, true)
        .await
        .expect("folder");
    (device.id_device, folder.id_folder)
}

/// Insert a media with its main file under the given folder.
pub async fn seed_media(
    db: &Database,
    folder_id: i64,
    device_id: i64,
    name: &str,
) -> curator::db::media::MediaRecord {
    let media = db
        .media()
        .create(
            curator::db::media::MediaType::Audio,
            name,
            name,
            folder_id,
            device_id,
        )
        .await
        .expect("media");
    db.files()
        .create(
            Some(media.id_media),
            None,
            name,
            curator::db::files::FileType::Main,
            Some(folder_id),
            0,
            1024,
            true,
            false,
        )
        .await
        .expect("file");
    media
}
