//! Thumbnail generation worker.
//!
//! A single background task drains generation requests, calls the external
//! [`Thumbnailer`] capability, saves the artifact under the managed
//! thumbnail directory (content-addressed), records the row, and notifies
//! the host. Generation failures are persisted so the same media is not
//! endlessly retried.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::LibraryCallbacks;
use crate::db::thumbnails::{ThumbnailOrigin, ThumbnailSizeType, ThumbnailedEntity};
use crate::db::Database;
use crate::mrl;

use super::ThumbnailManager;

/// External thumbnail generation capability: renders a frame or cover of
/// `media_mrl` into `destination`.
pub trait Thumbnailer: Send + Sync {
    fn generate(&self, media_mrl: &str, destination: &Path) -> std::io::Result<()>;

    /// Interrupt a generation in progress, if any.
    fn stop(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    media_id: i64,
    size_type: ThumbnailSizeType,
}

struct Shared {
    queue: Mutex<VecDeque<Request>>,
    notify: Notify,
    paused: AtomicBool,
    stopped: AtomicBool,
}

pub struct ThumbnailerWorker {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thumbnailer: Arc<dyn Thumbnailer>,
}

impl ThumbnailerWorker {
    pub fn start(
        db: Database,
        manager: Arc<ThumbnailManager>,
        thumbnailer: Arc<dyn Thumbnailer>,
        callbacks: Arc<dyn LibraryCallbacks>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        let worker = Arc::new(Self {
            shared: shared.clone(),
            handle: Mutex::new(None),
            thumbnailer: thumbnailer.clone(),
        });
        let runner = Runner {
            db,
            manager,
            thumbnailer,
            callbacks,
            shared,
        };
        *worker.handle.lock() = Some(tokio::spawn(runner.run()));
        worker
    }

    /// Queue a generation request; duplicates of a pending request are
    /// dropped.
    pub fn request(&self, media_id: i64, size_type: ThumbnailSizeType) {
        let request = Request {
            media_id,
            size_type,
        };
        {
            let mut queue = self.shared.queue.lock();
            if queue.iter().any(|r| *r == request) {
                return;
            }
            queue.push_back(request);
        }
        self.shared.notify.notify_one();
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        self.shared.notify.notify_one();
    }

    pub fn signal_stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.notify.notify_one();
        self.thumbnailer.stop();
    }

    pub async fn stop(&self) {
        self.signal_stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

struct Runner {
    db: Database,
    manager: Arc<ThumbnailManager>,
    thumbnailer: Arc<dyn Thumbnailer>,
    callbacks: Arc<dyn LibraryCallbacks>,
    shared: Arc<Shared>,
}

impl Runner {
    async fn run(self) {
        info!("Entering thumbnailer thread");
        loop {
            if self.shared.stopped.load(Ordering::Acquire) {
                break;
            }
            let request = if self.shared.paused.load(Ordering::Acquire) {
                None
            } else {
                self.shared.queue.lock().pop_front()
            };
            let Some(request) = request else {
                self.shared.notify.notified().await;
                continue;
            };
            self.process(request).await;
        }
        info!("Exiting thumbnailer thread");
    }

    async fn process(&self, request: Request) {
        let media = match self.db.media().by_id(request.media_id).await {
            Ok(Some(media)) => media,
            // Deleted while the request waited.
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to fetch media for thumbnailing");
                return;
            }
        };
        let file = match self.db.files().main_file(media.id_media).await {
            Ok(Some(file)) => file,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to fetch main file for thumbnailing");
                return;
            }
        };

        let destination = self.artifact_path(&file.mrl, request.size_type);
        debug!(media_id = media.id_media, dest = %destination.display(), "Generating thumbnail");
        let generated = self.thumbnailer.generate(&file.mrl, &destination);

        match generated {
            Ok(()) => {
                let artifact_mrl = mrl::from_path(&destination);
                let result = self
                    .manager
                    .set_thumbnail(
                        ThumbnailedEntity::Media,
                        media.id_media,
                        request.size_type,
                        &artifact_mrl,
                        ThumbnailOrigin::Media,
                    )
                    .await;
                let success = result.is_ok();
                if let Err(e) = result {
                    warn!(media_id = media.id_media, error = %e, "Failed to record thumbnail");
                }
                self.callbacks
                    .on_media_thumbnail_ready(media.id_media, request.size_type, success);
            }
            Err(e) => {
                warn!(media_id = media.id_media, error = %e, "Thumbnail generation failed");
                if let Ok(Some(current)) = self
                    .db
                    .thumbnails()
                    .for_entity(ThumbnailedEntity::Media, media.id_media, request.size_type)
                    .await
                {
                    let _ = self
                        .db
                        .thumbnails()
                        .set_status(
                            current.id_thumbnail,
                            crate::db::thumbnails::ThumbnailStatus::Failure,
                        )
                        .await;
                }
                self.callbacks
                    .on_media_thumbnail_ready(media.id_media, request.size_type, false);
            }
        }
    }

    /// Content-addressed artifact location under the managed directory.
    fn artifact_path(&self, media_mrl: &str, size_type: ThumbnailSizeType) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(media_mrl.as_bytes());
        hasher.update([size_type as i64 as u8]);
        let digest = hasher.finalize();
        let name = format!("{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}.jpg",
            digest[0], digest[1], digest[2], digest[3],
            digest[4], digest[5], digest[6], digest[7]);
        self.manager.thumbnail_dir().join(name)
    }
}
