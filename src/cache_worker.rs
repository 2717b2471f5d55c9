//! Subscription cache worker.
//!
//! A single background task keeps local copies of subscription media under
//! the cache directory. Before caching it checks the remaining room
//! against the subscription's quota and the global quota, evicting the
//! least recently played cached media first. Pause and resume are
//! supported; stop drains the queue flag and joins the task.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::LibraryCallbacks;
use crate::db::files::FileType;
use crate::db::Database;
use crate::error::Result;

/// External transfer capability: copies a media into the cache directory
/// and back out.
#[async_trait]
pub trait Cacher: Send + Sync {
    /// Fetch `media_mrl` into `destination`, returning the cached size in
    /// bytes.
    async fn cache(&self, media_mrl: &str, destination: &Path) -> std::io::Result<u64>;

    /// Remove a previously cached artifact.
    async fn uncache(&self, cached_path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheOp {
    Cache(i64),
    Uncache(i64),
    CacheAllSubscriptions,
}

struct Shared {
    queue: Mutex<VecDeque<CacheOp>>,
    notify: Notify,
    paused: AtomicBool,
    stopped: AtomicBool,
    cache_size: AtomicU64,
}

pub struct CacheWorker {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CacheWorker {
    pub fn start(
        db: Database,
        cacher: Arc<dyn Cacher>,
        cache_dir: PathBuf,
        global_quota: u64,
        callbacks: Arc<dyn LibraryCallbacks>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cache_size: AtomicU64::new(0),
        });
        let worker = Arc::new(Self {
            shared: shared.clone(),
            handle: Mutex::new(None),
        });
        let runner = Runner {
            db,
            cacher,
            cache_dir,
            global_quota,
            callbacks,
            shared,
        };
        *worker.handle.lock() = Some(tokio::spawn(runner.run()));
        worker
    }

    pub fn cache_media(&self, media_id: i64) -> bool {
        self.enqueue(CacheOp::Cache(media_id))
    }

    pub fn remove_cached(&self, media_id: i64) -> bool {
        self.enqueue(CacheOp::Uncache(media_id))
    }

    pub fn cache_subscriptions(&self) {
        self.enqueue(CacheOp::CacheAllSubscriptions);
    }

    pub fn cache_size(&self) -> u64 {
        self.shared.cache_size.load(Ordering::Acquire)
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
    }

    pub async fn stop(&self) {
        self.signal_stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn enqueue(&self, op: CacheOp) -> bool {
        if self.shared.stopped.load(Ordering::Acquire) {
            return false;
        }
        {
            let mut queue = self.shared.queue.lock();
            if queue.iter().any(|pending| *pending == op) {
                return true;
            }
            queue.push_back(op);
        }
        self.shared.notify.notify_one();
        true
    }
}

struct Runner {
    db: Database,
    cacher: Arc<dyn Cacher>,
    cache_dir: PathBuf,
    global_quota: u64,
    callbacks: Arc<dyn LibraryCallbacks>,
    shared: Arc<Shared>,
}

impl Runner {
    async fn run(self) {
        info!("Entering cache worker thread");
        self.refresh_cache_size().await;
        let mut idle = true;
        loop {
            if self.shared.stopped.load(Ordering::Acquire) {
                break;
            }
            let op = if self.shared.paused.load(Ordering::Acquire) {
                None
            } else {
                self.shared.queue.lock().pop_front()
            };
            let Some(op) = op else {
                if !idle {
                    idle = true;
                    self.callbacks.on_cache_idle_changed(true);
                }
                self.shared.notify.notified().await;
                continue;
            };
            if idle {
                idle = false;
                self.callbacks.on_cache_idle_changed(false);
            }
            if let Err(e) = self.process(op).await {
                warn!(error = %e, "Cache operation failed");
            }
        }
        info!("Exiting cache worker thread");
    }

    async fn process(&self, op: CacheOp) -> Result<()> {
        match op {
            CacheOp::Cache(media_id) => {
                self.do_cache(media_id).await?;
            }
            CacheOp::Uncache(media_id) => {
                self.do_uncache(media_id).await?;
            }
            CacheOp::CacheAllSubscriptions => {
                for subscription in self.db.subscriptions().all().await? {
                    for media_id in self
                        .db
                        .subscriptions()
                        .media_ids(subscription.id_subscription)
                        .await?
                    {
                        if self.shared.stopped.load(Ordering::Acquire) {
                            return Ok(());
                        }
                        if let Err(e) = self.do_cache(media_id).await {
                            warn!(media_id, error = %e, "Failed to cache subscription media");
                        }
                    }
                    self.callbacks
                        .on_subscription_cache_updated(subscription.id_subscription);
                }
            }
        }
        Ok(())
    }

    async fn do_cache(&self, media_id: i64) -> Result<()> {
        let Some(file) = self.db.files().main_file(media_id).await? else {
            return Ok(());
        };
        // Already cached?
        let existing = self
            .db
            .files()
            .for_media(media_id)
            .await?
            .into_iter()
            .any(|f| f.file_type == FileType::Cache);
        if existing {
            debug!(media_id, "Media already cached");
            return Ok(());
        }

        let subscription = self.db.subscriptions().for_media(media_id).await?;
        let needed = file.size.max(0) as u64;
        self.evict_if_needed(needed, subscription.as_ref()).await?;

        let destination = self.cache_dir.join(format!("media_{media_id}"));
        let size = self
            .cacher
            .cache(&file.mrl, &destination)
            .await
            .map_err(|e| crate::error::io_error(file.mrl.clone(), e))?;

        let cached_mrl = crate::mrl::from_path(&destination);
        let cached_file = self
            .db
            .files()
            .create_external(media_id, &cached_mrl, FileType::Cache)
            .await?;
        self.db
            .files()
            .update_modification(cached_file.id_file, chrono::Utc::now().timestamp(), size as i64)
            .await?;
        self.shared.cache_size.fetch_add(size, Ordering::AcqRel);
        if let Some(subscription) = subscription {
            self.db
                .subscriptions()
                .add_cached_size(subscription.id_subscription, size as i64)
                .await?;
        }
        Ok(())
    }

    async fn do_uncache(&self, media_id: i64) -> Result<()> {
        let cached = self
            .db
            .files()
            .for_media(media_id)
            .await?
            .into_iter()
            .find(|f| f.file_type == FileType::Cache);
        let Some(cached) = cached else {
            return Ok(());
        };
        if let Ok(path) = crate::mrl::to_path(&cached.mrl) {
            if let Err(e) = self.cacher.uncache(&path).await {
                warn!(media_id, error = %e, "Failed to remove cached artifact");
            }
        }
        self.db.files().delete(cached.id_file).await?;
        let freed = cached.size.max(0) as u64;
        let _ = self
            .shared
            .cache_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(freed))
            });
        if let Some(subscription) = self.db.subscriptions().for_media(media_id).await? {
            self.db
                .subscriptions()
                .add_cached_size(subscription.id_subscription, -(freed as i64))
                .await?;
        }
        Ok(())
    }

    /// Evict least-recently-played cached media until `needed` bytes fit
    /// under both the subscription quota and the global quota.
    async fn evict_if_needed(
        &self,
        needed: u64,
        subscription: Option<&crate::db::subscriptions::SubscriptionRecord>,
    ) -> Result<()> {
        if let Some(subscription) = subscription {
            if subscription.max_cached_size >= 0 {
                let quota = subscription.max_cached_size as u64;
                let mut used = subscription.cached_size.max(0) as u64;
                while used + needed > quota {
                    let Some(evicted) = self.evict_one(Some(subscription.id_subscription)).await?
                    else {
                        break;
                    };
                    used = used.saturating_sub(evicted);
                }
            }
        }
        while self.shared.cache_size.load(Ordering::Acquire) + needed > self.global_quota {
            if self.evict_one(None).await?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Evict a single cached media, least recently played first. Returns
    /// the freed size.
    async fn evict_one(&self, subscription_id: Option<i64>) -> Result<Option<u64>> {
        let sql = match subscription_id {
            Some(_) => {
                "SELECT f.media_id FROM File f
                 INNER JOIN Media m ON m.id_media = f.media_id
                 INNER JOIN SubscriptionMediaRelation smr ON smr.media_id = m.id_media
                 WHERE f.file_type = 7 AND smr.subscription_id = ?
                 ORDER BY IFNULL(m.last_played_date, 0) ASC LIMIT 1"
            }
            None => {
                "SELECT f.media_id FROM File f
                 INNER JOIN Media m ON m.id_media = f.media_id
                 WHERE f.file_type = 7
                 ORDER BY IFNULL(m.last_played_date, 0) ASC LIMIT 1"
            }
        };
        let mut query = sqlx::query_scalar::<_, Option<i64>>(sql);
        if let Some(id) = subscription_id {
            query = query.bind(id);
        }
        let candidate: Option<Option<i64>> = query
            .fetch_optional(self.db.pool())
            .await
            .map_err(crate::error::Error::from_sqlx)?;
        let Some(Some(media_id)) = candidate else {
            return Ok(None);
        };
        debug!(media_id, "Evicting cached media");
        let before = self.shared.cache_size.load(Ordering::Acquire);
        self.do_uncache(media_id).await?;
        let after = self.shared.cache_size.load(Ordering::Acquire);
        Ok(Some(before.saturating_sub(after)))
    }

    /// Recompute the accounted size from the cached file rows on startup.
    async fn refresh_cache_size(&self) {
        let total: std::result::Result<i64, _> =
            sqlx::query_scalar("SELECT IFNULL(SUM(size), 0) FROM File WHERE file_type = 7")
                .fetch_one(self.db.pool())
                .await;
        if let Ok(total) = total {
            self.shared.cache_size.store(total.max(0) as u64, Ordering::Release);
        }
    }
}
