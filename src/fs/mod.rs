//! Filesystem abstraction.
//!
//! A [`FilesystemFactory`] provides directory, file and device views for one
//! URL scheme (`file://`, `smb://`, ...). Factories report device mount and
//! unmount events to a [`DeviceCallback`] (the [`holder::FsHolder`]), which
//! reconciles them with the database and notifies its own observers.

pub mod holder;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// A device as seen on the filesystem: a mountable unit of storage.
pub trait FsDevice: Send + Sync {
    fn uuid(&self) -> String;
    fn scheme(&self) -> String;
    /// Known mountpoints, most recent first. Empty when absent.
    fn mountpoints(&self) -> Vec<String>;
    fn is_removable(&self) -> bool;
    fn is_network(&self) -> bool;
    fn is_present(&self) -> bool;
}

/// A file as seen on the filesystem.
pub trait FsFile: Send + Sync {
    fn mrl(&self) -> String;
    fn name(&self) -> String;
    fn extension(&self) -> Option<String>;
    fn last_modification_date(&self) -> i64;
    fn size(&self) -> i64;
}

/// A directory as seen on the filesystem.
pub trait FsDirectory: Send + Sync {
    fn mrl(&self) -> String;
    fn name(&self) -> String;
    fn files(&self) -> Result<Vec<Arc<dyn FsFile>>>;
    fn dirs(&self) -> Result<Vec<Arc<dyn FsDirectory>>>;
    /// Whether the directory directly contains a file with this exact name.
    fn contains(&self, file_name: &str) -> bool;
    fn device(&self) -> Option<Arc<dyn FsDevice>>;
}

/// Receiver for mount/unmount events. Factories may invoke these
/// synchronously from [`FilesystemFactory::refresh_devices`].
#[async_trait]
pub trait DeviceCallback: Send + Sync {
    async fn on_device_mounted(&self, device: Arc<dyn FsDevice>, mountpoint: &str);
    async fn on_device_unmounted(&self, device: Arc<dyn FsDevice>, mountpoint: &str);
}

/// Device enumeration for one scheme; factories usually implement this
/// themselves.
#[async_trait]
pub trait DeviceLister: Send + Sync {
    /// Re-enumerate devices, reporting changes through the callback the
    /// factory was started with.
    async fn refresh(&self);
}

/// Provider of filesystem views for one URL scheme.
#[async_trait]
pub trait FilesystemFactory: Send + Sync {
    /// The scheme handled, including the separator (e.g. `file://`).
    fn scheme(&self) -> &str;

    fn is_network(&self) -> bool;

    fn is_mrl_supported(&self, mrl: &str) -> bool {
        mrl.starts_with(self.scheme())
    }

    fn is_started(&self) -> bool;

    /// Start the factory. Returns false when it cannot operate (missing
    /// backend, no permission).
    async fn start(&self, callback: Arc<dyn DeviceCallback>) -> bool;

    async fn stop(&self);

    /// Re-enumerate devices and report transitions to the callback passed
    /// at start.
    async fn refresh_devices(&self);

    fn device(&self, uuid: &str) -> Option<Arc<dyn FsDevice>>;

    /// The device whose mountpoint covers `mrl`, if any.
    fn device_for_mrl(&self, mrl: &str) -> Option<Arc<dyn FsDevice>>;

    fn directory(&self, mrl: &str) -> Result<Arc<dyn FsDirectory>>;

    fn file(&self, mrl: &str) -> Result<Arc<dyn FsFile>>;
}
