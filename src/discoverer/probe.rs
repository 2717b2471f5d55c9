//! Crawl probes.
//!
//! The crawler consults a probe per file and directory so the same walk
//! serves full discovery, reloads and single-path rescans.

use crate::fs::{FsDirectory, FsFile};

/// Marker file hiding a directory from discovery.
pub const NOMEDIA_MARKER: &str = ".nomedia";

pub trait Probe: Send + Sync {
    /// Should the crawler enter this directory?
    fn proceed_on_directory(&self, _directory: &dyn FsDirectory) -> bool {
        true
    }

    /// Is the directory considered hidden?
    fn is_hidden(&self, directory: &dyn FsDirectory) -> bool;

    /// Should the crawler consider this file?
    fn proceed_on_file(&self, _file: &dyn FsFile) -> bool {
        true
    }

    /// Should the file walk stop early? Used by single-target probes.
    fn stop_file_discovery(&self) -> bool {
        false
    }

    /// Should folders not seen on disk this pass be pruned?
    fn delete_unseen_folders(&self) -> bool {
        true
    }

    /// Should files not seen on disk this pass be pruned?
    fn delete_unseen_files(&self) -> bool {
        true
    }

    /// Should every file be treated as new, regardless of modification
    /// dates?
    fn force_file_refresh(&self) -> bool {
        false
    }
}

/// Cooperative interruption checked at directory boundaries.
pub trait InterruptProbe: Send + Sync {
    fn is_interrupted(&self) -> bool;
}

/// The regular discovery/reload probe.
pub struct CrawlerProbe {
    discover_no_media: bool,
}

impl CrawlerProbe {
    pub fn new(discover_no_media: bool) -> Self {
        Self { discover_no_media }
    }
}

impl Probe for CrawlerProbe {
    fn is_hidden(&self, directory: &dyn FsDirectory) -> bool {
        !self.discover_no_media && directory.contains(NOMEDIA_MARKER)
    }
}

/// Probe restricting the crawl to one target path, forcing a refresh of it.
/// Used by user-initiated rescans of a specific MRL.
pub struct PathProbe {
    target_mrl: String,
}

impl PathProbe {
    pub fn new(target_mrl: impl Into<String>) -> Self {
        Self {
            target_mrl: target_mrl.into(),
        }
    }
}

impl Probe for PathProbe {
    fn proceed_on_directory(&self, directory: &dyn FsDirectory) -> bool {
        self.target_mrl.starts_with(&directory.mrl())
    }

    fn is_hidden(&self, _directory: &dyn FsDirectory) -> bool {
        false
    }

    fn proceed_on_file(&self, file: &dyn FsFile) -> bool {
        file.mrl() == self.target_mrl
    }

    fn delete_unseen_folders(&self) -> bool {
        false
    }

    fn delete_unseen_files(&self) -> bool {
        false
    }

    fn force_file_refresh(&self) -> bool {
        true
    }
}
