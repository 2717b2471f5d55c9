//! Local `file://` filesystem factory.
//!
//! By default a single non-removable device spans the whole local tree.
//! Additional devices (USB sticks, test fixtures) can be declared with
//! [`LocalFsFactory::add_device`]; mount state is then driven through
//! [`LocalFsFactory::set_device_present`], which reports the transition to
//! the holder the way a platform device lister would.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{io_error, Error, Result};
use crate::mrl;

use super::{DeviceCallback, DeviceLister, FilesystemFactory, FsDevice, FsDirectory, FsFile};

pub const SCHEME: &str = "file://";
/// UUID of the implicit device covering the local root.
pub const MAIN_DEVICE_UUID: &str = "local";

struct LocalDeviceState {
    uuid: String,
    mountpoint: String,
    is_removable: bool,
    present: AtomicBool,
}

#[derive(Clone)]
pub struct LocalDevice {
    state: Arc<LocalDeviceState>,
}

impl FsDevice for LocalDevice {
    fn uuid(&self) -> String {
        self.state.uuid.clone()
    }

    fn scheme(&self) -> String {
        SCHEME.to_string()
    }

    fn mountpoints(&self) -> Vec<String> {
        vec![self.state.mountpoint.clone()]
    }

    fn is_removable(&self) -> bool {
        self.state.is_removable
    }

    fn is_network(&self) -> bool {
        false
    }

    fn is_present(&self) -> bool {
        self.state.present.load(Ordering::Acquire)
    }
}

pub struct LocalFile {
    mrl: String,
    name: String,
    last_modification_date: i64,
    size: i64,
}

impl LocalFile {
    fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| io_error(mrl::from_path(path), e))?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            mrl: mrl::from_path(path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            last_modification_date: modified,
            size: metadata.len() as i64,
        })
    }
}

impl FsFile for LocalFile {
    fn mrl(&self) -> String {
        self.mrl.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn extension(&self) -> Option<String> {
        mrl::extension(&self.mrl)
    }

    fn last_modification_date(&self) -> i64 {
        self.last_modification_date
    }

    fn size(&self) -> i64 {
        self.size
    }
}

pub struct LocalDirectory {
    path: std::path::PathBuf,
    mrl: String,
    device: Option<LocalDevice>,
}

impl FsDirectory for LocalDirectory {
    fn mrl(&self) -> String {
        self.mrl.clone()
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn files(&self) -> Result<Vec<Arc<dyn FsFile>>> {
        let mut files: Vec<Arc<dyn FsFile>> = Vec::new();
        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                files.push(Arc::new(LocalFile::from_path(entry.path())?));
            }
        }
        Ok(files)
    }

    fn dirs(&self) -> Result<Vec<Arc<dyn FsDirectory>>> {
        let mut dirs: Vec<Arc<dyn FsDirectory>> = Vec::new();
        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_dir() {
                let path = entry.path().to_path_buf();
                dirs.push(Arc::new(LocalDirectory {
                    mrl: format!("{}/", mrl::from_path(&path)),
                    path,
                    device: self.device.clone(),
                }));
            }
        }
        Ok(dirs)
    }

    fn contains(&self, file_name: &str) -> bool {
        self.path.join(file_name).exists()
    }

    fn device(&self) -> Option<Arc<dyn FsDevice>> {
        self.device
            .clone()
            .map(|d| Arc::new(d) as Arc<dyn FsDevice>)
    }
}

#[derive(Default)]
struct FactoryState {
    devices: Vec<LocalDevice>,
    callback: Option<Arc<dyn DeviceCallback>>,
}

/// Factory for `file://` MRLs.
pub struct LocalFsFactory {
    state: Mutex<FactoryState>,
    started: AtomicBool,
}

impl Default for LocalFsFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFsFactory {
    pub fn new() -> Self {
        let main = LocalDevice {
            state: Arc::new(LocalDeviceState {
                uuid: MAIN_DEVICE_UUID.to_string(),
                mountpoint: "file:///".to_string(),
                is_removable: false,
                present: AtomicBool::new(true),
            }),
        };
        Self {
            state: Mutex::new(FactoryState {
                devices: vec![main],
                callback: None,
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Declare an additional device rooted at `mountpoint_mrl`. Used for
    /// removable mounts and by tests.
    pub fn add_device(&self, uuid: &str, mountpoint_mrl: &str, is_removable: bool) {
        let device = LocalDevice {
            state: Arc::new(LocalDeviceState {
                uuid: uuid.to_string(),
                mountpoint: mountpoint_mrl.trim_end_matches('/').to_string() + "/",
                is_removable,
                present: AtomicBool::new(true),
            }),
        };
        // Devices with deeper mountpoints win MRL resolution.
        let mut state = self.state.lock();
        state.devices.push(device);
        state
            .devices
            .sort_by_key(|d| std::cmp::Reverse(d.state.mountpoint.len()));
    }

    /// Flip a device's presence and deliver the transition to the holder,
    /// like a platform mount event would.
    pub async fn set_device_present(&self, uuid: &str, present: bool) {
        let (device, callback) = {
            let state = self.state.lock();
            let device = state
                .devices
                .iter()
                .find(|d| d.state.uuid == uuid)
                .cloned();
            (device, state.callback.clone())
        };
        let Some(device) = device else { return };
        device.state.present.store(present, Ordering::Release);
        if let Some(callback) = callback {
            let mountpoint = device.state.mountpoint.clone();
            let device: Arc<dyn FsDevice> = Arc::new(device);
            if present {
                callback.on_device_mounted(device, &mountpoint).await;
            } else {
                callback.on_device_unmounted(device, &mountpoint).await;
            }
        }
    }

    fn device_covering(&self, mrl: &str) -> Option<LocalDevice> {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|d| mrl.starts_with(d.state.mountpoint.as_str()) || mrl == d.state.mountpoint.trim_end_matches('/'))
            .cloned()
    }
}

#[async_trait]
impl FilesystemFactory for LocalFsFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn is_network(&self) -> bool {
        false
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    async fn start(&self, callback: Arc<dyn DeviceCallback>) -> bool {
        self.state.lock().callback = Some(callback);
        self.started.store(true, Ordering::Release);
        true
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::Release);
        self.state.lock().callback = None;
    }

    async fn refresh_devices(&self) {
        let (devices, callback) = {
            let state = self.state.lock();
            (state.devices.clone(), state.callback.clone())
        };
        let Some(callback) = callback else { return };
        for device in devices {
            let mountpoint = device.state.mountpoint.clone();
            let present = device.state.present.load(Ordering::Acquire);
            debug!(uuid = %device.state.uuid, present, "Refreshing local device");
            let device: Arc<dyn FsDevice> = Arc::new(device);
            if present {
                callback.on_device_mounted(device, &mountpoint).await;
            } else {
                callback.on_device_unmounted(device, &mountpoint).await;
            }
        }
    }

    fn device(&self, uuid: &str) -> Option<Arc<dyn FsDevice>> {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|d| d.state.uuid == uuid)
            .cloned()
            .map(|d| Arc::new(d) as Arc<dyn FsDevice>)
    }

    fn device_for_mrl(&self, mrl: &str) -> Option<Arc<dyn FsDevice>> {
        self.device_covering(mrl)
            .map(|d| Arc::new(d) as Arc<dyn FsDevice>)
    }

    fn directory(&self, dir_mrl: &str) -> Result<Arc<dyn FsDirectory>> {
        let path = mrl::to_path(dir_mrl)?;
        if !path.is_dir() {
            return Err(Error::Filesystem {
                mrl: dir_mrl.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        Ok(Arc::new(LocalDirectory {
            mrl: format!("{}/", mrl::from_path(&path)),
            device: self.device_covering(dir_mrl),
            path,
        }))
    }

    fn file(&self, file_mrl: &str) -> Result<Arc<dyn FsFile>> {
        let path = mrl::to_path(file_mrl)?;
        Ok(Arc::new(LocalFile::from_path(&path)?))
    }
}

#[async_trait]
impl DeviceLister for LocalFsFactory {
    async fn refresh(&self) {
        self.refresh_devices().await;
    }
}
