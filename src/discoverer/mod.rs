//! Discovery worker.
//!
//! All discovery, reload, ban and unban work is serialized onto one
//! background task consuming an operation queue. Enqueueing coalesces:
//! an operation equal to a pending one is dropped, and an operation whose
//! inverse is the last pending one cancels both out. While a crawl is
//! running, newly enqueued operations interrupt it at the next directory
//! boundary.

pub mod crawler;
pub mod probe;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::callbacks::LibraryCallbacks;
use crate::db::Database;
use crate::error::Error;
use crate::fs::holder::FsHolder;
use crate::mrl;

pub use crawler::FsCrawler;
pub use probe::{InterruptProbe, Probe};

/// One unit of discovery work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverOp {
    Discover(String),
    /// Reload one entry point, or every known root when `None`.
    Reload(Option<String>),
    Remove(String),
    Ban(String),
    Unban(String),
    ReloadDevice(i64),
    ReloadAllDevices,
}

impl DiscoverOp {
    /// The operation this one cancels out when found as the last pending
    /// entry.
    fn inverse(&self) -> Option<DiscoverOp> {
        match self {
            DiscoverOp::Remove(mrl) => Some(DiscoverOp::Discover(mrl.clone())),
            DiscoverOp::Unban(mrl) => Some(DiscoverOp::Ban(mrl.clone())),
            DiscoverOp::Ban(mrl) => Some(DiscoverOp::Unban(mrl.clone())),
            _ => None,
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<DiscoverOp>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl InterruptProbe for Shared {
    fn is_interrupted(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || !self.queue.lock().is_empty()
    }
}

pub struct DiscovererWorker {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiscovererWorker {
    pub fn start(
        db: Database,
        fs_holder: Arc<FsHolder>,
        crawler: FsCrawler,
        callbacks: Arc<dyn LibraryCallbacks>,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        });
        let worker = Arc::new(Self {
            shared: shared.clone(),
            handle: Mutex::new(None),
        });
        let runner = Runner {
            db,
            fs_holder,
            crawler,
            callbacks,
            shared,
        };
        let handle = tokio::spawn(runner.run());
        *worker.handle.lock() = Some(handle);
        worker
    }

    pub fn discover(&self, entry_point: &str) {
        self.enqueue(DiscoverOp::Discover(entry_point.to_string()));
    }

    pub fn reload(&self) {
        self.enqueue(DiscoverOp::Reload(None));
    }

    pub fn reload_entry_point(&self, entry_point: &str) {
        self.enqueue(DiscoverOp::Reload(Some(entry_point.to_string())));
    }

    pub fn remove(&self, entry_point: &str) {
        self.enqueue(DiscoverOp::Remove(entry_point.to_string()));
    }

    pub fn ban(&self, entry_point: &str) {
        self.enqueue(DiscoverOp::Ban(entry_point.to_string()));
    }

    pub fn unban(&self, entry_point: &str) {
        self.enqueue(DiscoverOp::Unban(entry_point.to_string()));
    }

    pub fn reload_device(&self, device_id: i64) {
        self.enqueue(DiscoverOp::ReloadDevice(device_id));
    }

    pub fn reload_all_devices(&self) {
        self.enqueue(DiscoverOp::ReloadAllDevices);
    }

    /// Request the worker to stop; the current crawl aborts at the next
    /// directory boundary.
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

    fn enqueue(&self, op: DiscoverOp) {
        {
            let mut queue = self.shared.queue.lock();
            // Rule 1: an equivalent pending operation absorbs this one.
            if queue.iter().any(|pending| *pending == op) {
                return;
            }
            // Rule 2: the inverse of the last pending operation cancels
            // both out.
            if let Some(inverse) = op.inverse() {
                if queue.back() == Some(&inverse) {
                    queue.pop_back();
                    return;
                }
            }
            queue.push_back(op);
        }
        self.shared.notify.notify_one();
    }
}

struct Runner {
    db: Database,
    fs_holder: Arc<FsHolder>,
    crawler: FsCrawler,
    callbacks: Arc<dyn LibraryCallbacks>,
    shared: Arc<Shared>,
}

impl Runner {
    async fn run(self) {
        info!("Entering discoverer thread");
        loop {
            let op = {
                let mut queue = self.shared.queue.lock();
                queue.pop_front()
            };
            let Some(op) = op else {
                if self.shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                self.shared.notify.notified().await;
                continue;
            };
            if self.shared.stopped.load(Ordering::Acquire) {
                break;
            }
            // Any failure is logged and the worker moves on to the next
            // operation.
            if let Err(e) = self.process(op.clone()).await {
                error!(?op, error = %e, "Discovery operation failed");
            }
        }
        info!("Exiting discoverer thread");
    }

    async fn process(&self, op: DiscoverOp) -> crate::error::Result<()> {
        match op {
            DiscoverOp::Discover(entry) => {
                self.callbacks.on_discovery_started();
                let result = self.crawler.discover(&entry, self.shared.as_ref()).await;
                let success = result.is_ok();
                self.callbacks.on_entry_point_added(&entry, success);
                if success {
                    self.callbacks.on_discovery_completed();
                } else {
                    self.callbacks.on_discovery_failed(&entry);
                }
                result
            }
            DiscoverOp::Reload(entry) => {
                self.callbacks.on_discovery_started();
                let result = self
                    .crawler
                    .reload(entry.as_deref(), self.shared.as_ref())
                    .await;
                match &result {
                    Ok(()) => self.callbacks.on_discovery_completed(),
                    Err(_) => {
                        self.callbacks
                            .on_discovery_failed(entry.as_deref().unwrap_or(""));
                    }
                }
                result
            }
            DiscoverOp::Remove(entry) => {
                let result = self.remove_entry_point(&entry).await;
                self.callbacks
                    .on_entry_point_removed(&entry, result.is_ok());
                result
            }
            DiscoverOp::Ban(entry) => {
                let result = self.ban_entry_point(&entry, true).await;
                self.callbacks.on_entry_point_banned(&entry, result.is_ok());
                result
            }
            DiscoverOp::Unban(entry) => {
                let result = self.ban_entry_point(&entry, false).await;
                self.callbacks
                    .on_entry_point_unbanned(&entry, result.is_ok());
                result
            }
            DiscoverOp::ReloadDevice(device_id) => {
                self.fs_holder.reload_device(device_id).await?;
                self.crawler.reload(None, self.shared.as_ref()).await
            }
            DiscoverOp::ReloadAllDevices => {
                self.fs_holder.reload_all_devices().await?;
                self.crawler.reload(None, self.shared.as_ref()).await
            }
        }
    }

    /// Resolve an entry point MRL to its (device, path) pair.
    async fn resolve_entry(&self, entry: &str) -> crate::error::Result<(i64, String)> {
        let factory = self
            .fs_holder
            .fs_factory_for_mrl(entry)
            .await
            .ok_or_else(|| Error::BadMrl(entry.to_string()))?;
        let device_fs = factory
            .device_for_mrl(entry)
            .ok_or_else(|| Error::DeviceRemoved {
                mrl: entry.to_string(),
            })?;
        let device = self
            .db
            .devices()
            .by_uuid(&device_fs.uuid(), &device_fs.scheme())
            .await?
            .ok_or(Error::NotFound)?;
        let path = if device_fs.is_removable() {
            device_fs
                .mountpoints()
                .iter()
                .find_map(|mp| mrl::relative_to(mp, entry))
                .unwrap_or_else(|| entry.to_string())
        } else {
            entry.to_string()
        };
        Ok((device.id_device, path))
    }

    async fn remove_entry_point(&self, entry: &str) -> crate::error::Result<()> {
        let (device_id, path) = self.resolve_entry(entry).await?;
        match self.db.folders().by_path(device_id, &path).await? {
            Some(folder) => {
                self.db.folders().delete(folder.id_folder).await?;
                Ok(())
            }
            None => {
                warn!(entry, "Unknown entry point, nothing to remove");
                Err(Error::NotFound)
            }
        }
    }

    async fn ban_entry_point(&self, entry: &str, ban: bool) -> crate::error::Result<()> {
        let (device_id, path) = self.resolve_entry(entry).await?;
        if ban {
            self.db.folders().ban(device_id, &path).await?;
        } else {
            self.db.folders().unban(device_id, &path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_after(ops: &[DiscoverOp]) -> Vec<DiscoverOp> {
        // Replicates the enqueue rules without spinning up a worker.
        let mut queue: VecDeque<DiscoverOp> = VecDeque::new();
        for op in ops {
            if queue.iter().any(|pending| pending == op) {
                continue;
            }
            if let Some(inverse) = op.inverse() {
                if queue.back() == Some(&inverse) {
                    queue.pop_back();
                    continue;
                }
            }
            queue.push_back(op.clone());
        }
        queue.into_iter().collect()
    }

    #[test]
    fn duplicate_ops_are_dropped() {
        let ops = [
            DiscoverOp::Discover("file:///a/".into()),
            DiscoverOp::Discover("file:///a/".into()),
        ];
        assert_eq!(queue_after(&ops).len(), 1);
    }

    #[test]
    fn inverse_ops_cancel_out() {
        let ops = [
            DiscoverOp::Discover("file:///a/".into()),
            DiscoverOp::Remove("file:///a/".into()),
        ];
        assert!(queue_after(&ops).is_empty());

        let ops = [
            DiscoverOp::Ban("file:///a/".into()),
            DiscoverOp::Unban("file:///a/".into()),
        ];
        assert!(queue_after(&ops).is_empty());
    }

    #[test]
    fn inverse_only_cancels_the_last_pending_op() {
        let ops = [
            DiscoverOp::Discover("file:///a/".into()),
            DiscoverOp::Discover("file:///b/".into()),
            DiscoverOp::Remove("file:///a/".into()),
        ];
        // Discover(a) is not last, so Remove(a) must stay queued.
        assert_eq!(queue_after(&ops).len(), 3);
    }
}
