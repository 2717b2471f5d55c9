//! Filesystem holder: factory registry and device presence tracking.
//!
//! The holder owns every registered filesystem factory, reconciles the
//! devices they report with the database, and notifies its observers of
//! presence transitions so the discoverer can reload and the parser can
//! flush tasks for vanished devices. Factory state and observers live
//! behind separate locks: factories may deliver mount events synchronously
//! while the factory lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;

use super::{DeviceCallback, DeviceLister, FilesystemFactory, FsDevice};

/// Observer of device presence transitions.
pub trait FsHolderCallback: Send + Sync {
    /// The device reappeared; interrupted discoveries should reload and
    /// parked tasks resume.
    fn on_device_reappearing(&self, device_id: i64);
    /// The device went away; tasks targeting it should be flushed.
    fn on_device_disappearing(&self, device_id: i64);
}

#[derive(Default)]
struct Factories {
    factories: Vec<Arc<dyn FilesystemFactory>>,
    device_listers: HashMap<String, Arc<dyn DeviceLister>>,
}

pub struct FsHolder {
    db: Database,
    factories: AsyncMutex<Factories>,
    callbacks: parking_lot::Mutex<Vec<Arc<dyn FsHolderCallback>>>,
    network_enabled: AtomicBool,
    started: AtomicBool,
}

impl FsHolder {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            factories: AsyncMutex::new(Factories::default()),
            callbacks: parking_lot::Mutex::new(Vec::new()),
            network_enabled: AtomicBool::new(false),
            started: AtomicBool::new(false),
        })
    }

    /// Register a factory; a second factory for the same scheme is
    /// rejected.
    pub async fn add_fs_factory(&self, factory: Arc<dyn FilesystemFactory>) -> bool {
        let mut state = self.factories.lock().await;
        if state
            .factories
            .iter()
            .any(|f| f.scheme() == factory.scheme())
        {
            return false;
        }
        state.factories.push(factory);
        true
    }

    pub async fn register_device_lister(&self, scheme: &str, lister: Arc<dyn DeviceLister>) {
        self.factories
            .lock()
            .await
            .device_listers
            .insert(scheme.to_string(), lister);
    }

    pub async fn device_lister(&self, scheme: &str) -> Option<Arc<dyn DeviceLister>> {
        self.factories.lock().await.device_listers.get(scheme).cloned()
    }

    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::Acquire)
    }

    /// Toggle network factories. Disabling marks every network device
    /// absent in a single transaction before stopping the factories, so
    /// readers never observe stale presence.
    pub async fn set_network_enabled(self: &Arc<Self>, enabled: bool) -> Result<bool> {
        if self
            .network_enabled
            .compare_exchange(!enabled, enabled, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Unchanged values are not a failure.
            return Ok(true);
        }
        if !self.started.load(Ordering::Acquire) {
            return Ok(true);
        }
        if !enabled {
            // One transaction: readers never see a half-disabled network.
            self.db.devices().mark_network_devices_absent().await?;
        }
        let mut affected = false;
        let state = self.factories.lock().await;
        for factory in state.factories.iter().filter(|f| f.is_network()) {
            if enabled {
                let callback: Arc<dyn DeviceCallback> = self.clone();
                if factory.start(callback).await {
                    factory.refresh_devices().await;
                    affected = true;
                }
            } else {
                factory.stop().await;
                affected = true;
            }
        }
        Ok(affected)
    }

    /// Start every eligible factory and refresh the presence and last-seen
    /// state of all known devices.
    pub async fn start_fs_factories_and_refresh(self: &Arc<Self>) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        {
            let state = self.factories.lock().await;
            for factory in &state.factories {
                if factory.is_network() && !self.is_network_enabled() {
                    continue;
                }
                let callback: Arc<dyn DeviceCallback> = self.clone();
                if !factory.start(callback).await {
                    warn!(scheme = factory.scheme(), "Filesystem factory failed to start");
                    continue;
                }
                factory.refresh_devices().await;
            }
        }
        // Reconcile every device row against what its factory reports now.
        let devices = self.db.devices().all().await?;
        for device in devices {
            let factory = self.fs_factory_for_mrl(&device.scheme).await;
            let fs_device = factory.as_ref().and_then(|f| f.device(&device.uuid));
            self.refresh_device(device.id_device, fs_device).await?;
        }
        Ok(())
    }

    pub async fn stop_network_fs_factories(&self) {
        if self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let state = self.factories.lock().await;
        for factory in &state.factories {
            if factory.is_network() && factory.is_started() {
                factory.stop().await;
            }
        }
    }

    /// First factory claiming the MRL, honoring the network gate.
    pub async fn fs_factory_for_mrl(&self, mrl: &str) -> Option<Arc<dyn FilesystemFactory>> {
        let state = self.factories.lock().await;
        for factory in &state.factories {
            if factory.is_mrl_supported(mrl) {
                if factory.is_network() && !self.is_network_enabled() {
                    return None;
                }
                return Some(factory.clone());
            }
        }
        None
    }

    pub fn register_callback(&self, callback: Arc<dyn FsHolderCallback>) {
        let mut callbacks = self.callbacks.lock();
        debug_assert!(
            !callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)),
            "double registration of FsHolderCallback"
        );
        callbacks.push(callback);
    }

    pub fn unregister_callback(&self, callback: &Arc<dyn FsHolderCallback>) {
        let mut callbacks = self.callbacks.lock();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
    }

    async fn refresh_device(
        &self,
        device_id: i64,
        fs_device: Option<Arc<dyn FsDevice>>,
    ) -> Result<()> {
        let Some(device) = self.db.devices().by_id(device_id).await? else {
            return Ok(());
        };
        let observed = fs_device.map(|d| d.is_present()).unwrap_or(false);
        if device.is_present != observed {
            info!(
                uuid = %device.uuid,
                from = device.is_present,
                to = observed,
                "Device changed presence state"
            );
            self.db.devices().set_present(device.id_device, observed).await?;
            self.notify_presence_change(device.id_device, observed);
        } else {
            debug!(uuid = %device.uuid, "Device presence is unchanged");
        }
        if device.is_removable && observed {
            self.db.devices().update_last_seen(device.id_device).await?;
        }
        Ok(())
    }

    fn notify_presence_change(&self, device_id: i64, present: bool) {
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            if present {
                callback.on_device_reappearing(device_id);
            } else {
                callback.on_device_disappearing(device_id);
            }
        }
    }

    /// Re-check one device against its factory; used by the discoverer's
    /// reload-device operation.
    pub async fn reload_device(&self, device_id: i64) -> Result<()> {
        let Some(device) = self.db.devices().by_id(device_id).await? else {
            return Ok(());
        };
        let factory = self.fs_factory_for_mrl(&device.scheme).await;
        let fs_device = factory.as_ref().and_then(|f| f.device(&device.uuid));
        self.refresh_device(device_id, fs_device).await
    }

    /// Re-check every known device.
    pub async fn reload_all_devices(&self) -> Result<()> {
        let devices = self.db.devices().all().await?;
        for device in devices {
            self.reload_device(device.id_device).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceCallback for FsHolder {
    async fn on_device_mounted(&self, device_fs: Arc<dyn FsDevice>, mountpoint: &str) {
        let uuid = device_fs.uuid();
        let scheme = device_fs.scheme();
        let known = match self.db.devices().by_uuid(&uuid, &scheme).await {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, uuid = %uuid, "Failed to look up mounted device");
                return;
            }
        };
        let Some(known) = known else {
            // First sighting: the discoverer inserts the row lazily when an
            // entry point lands on the device.
            return;
        };
        if known.is_present == device_fs.is_present() {
            if device_fs.is_network() {
                let _ = self.db.devices().add_mountpoint(known.id_device, mountpoint).await;
            }
            return;
        }
        info!(
            uuid = %uuid,
            from = known.is_present,
            to = device_fs.is_present(),
            "Device changed presence state"
        );
        // The presence flip and the mountpoint append must be observed
        // together.
        if let Err(e) = self
            .db
            .devices()
            .set_present(known.id_device, device_fs.is_present())
            .await
        {
            warn!(error = %e, uuid = %uuid, "Failed to update device presence");
            return;
        }
        if device_fs.is_network() {
            let _ = self.db.devices().add_mountpoint(known.id_device, mountpoint).await;
        }
        if !known.is_present {
            // A reload is needed: an interrupted discovery dropped its
            // tasks when the device went away, and new content may have
            // appeared since the last scan.
            self.notify_presence_change(known.id_device, true);
        }
    }

    async fn on_device_unmounted(&self, device_fs: Arc<dyn FsDevice>, _mountpoint: &str) {
        let uuid = device_fs.uuid();
        let scheme = device_fs.scheme();
        let known = match self.db.devices().by_uuid(&uuid, &scheme).await {
            Ok(Some(known)) => known,
            // Never discovered anything on it: nothing to update.
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, uuid = %uuid, "Failed to look up unmounted device");
                return;
            }
        };
        if known.is_present == device_fs.is_present() {
            return;
        }
        info!(
            uuid = %uuid,
            from = known.is_present,
            to = device_fs.is_present(),
            "Device changed presence state"
        );
        if let Err(e) = self
            .db
            .devices()
            .set_present(known.id_device, device_fs.is_present())
            .await
        {
            warn!(error = %e, uuid = %uuid, "Failed to update device presence");
            return;
        }
        if !device_fs.is_present() {
            self.notify_presence_change(known.id_device, false);
        }
    }
}
