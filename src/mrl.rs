//! MRL (Media Resource Locator) helpers.
//!
//! Every path entering the library is an MRL of the shape
//! `scheme://[authority]/percent-encoded-path`. Local paths are converted to
//! and from `file://` MRLs; remote schemes are kept opaque and only split
//! into scheme / components.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Returns the scheme part including the `://` separator, e.g. `file://`.
pub fn scheme(mrl: &str) -> Result<&str> {
    match mrl.find("://") {
        Some(idx) => Ok(&mrl[..idx + 3]),
        None => Err(Error::BadMrl(mrl.to_string())),
    }
}

/// True if `mrl` starts with the given scheme (`file://`, `smb://`, ...).
pub fn has_scheme(mrl: &str, s: &str) -> bool {
    mrl.starts_with(s)
}

/// Convert a local filesystem path into a `file://` MRL with percent-encoded
/// segments.
pub fn from_path(path: &Path) -> String {
    let mut out = String::from("file://");
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::RootDir => {}
            Component::Normal(part) => {
                out.push('/');
                out.push_str(&urlencoding::encode(&part.to_string_lossy()));
            }
            Component::Prefix(prefix) => {
                out.push('/');
                out.push_str(&prefix.as_os_str().to_string_lossy());
            }
            Component::CurDir | Component::ParentDir => {}
        }
    }
    if out == "file://" {
        out.push('/');
    }
    out
}

/// Convert a `file://` MRL back to a local path, decoding percent escapes.
pub fn to_path(mrl: &str) -> Result<PathBuf> {
    let rest = mrl
        .strip_prefix("file://")
        .ok_or_else(|| Error::BadMrl(mrl.to_string()))?;
    let mut path = PathBuf::from("/");
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        let decoded = urlencoding::decode(segment)
            .map_err(|_| Error::BadMrl(mrl.to_string()))?;
        path.push(decoded.as_ref());
    }
    Ok(path)
}

/// The file or directory name, percent-decoded, without any trailing slash.
pub fn file_name(mrl: &str) -> String {
    let trimmed = mrl.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    urlencoding::decode(name)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| name.to_string())
}

/// The extension of the MRL's file name, lowercased, without the dot.
pub fn extension(mrl: &str) -> Option<String> {
    let name = file_name(mrl);
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}

/// The MRL of the entry's parent directory, with a trailing slash.
pub fn directory(mrl: &str) -> Result<String> {
    let s = scheme(mrl)?;
    let rest = &mrl[s.len()..];
    let trimmed = rest.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => Ok(format!("{}{}", s, &trimmed[..=idx])),
        None => Err(Error::BadMrl(mrl.to_string())),
    }
}

/// Strip `base` from `mrl`, yielding the device-relative path used for
/// entities on removable storage. Comparison ignores a trailing slash on
/// the base.
pub fn relative_to(base: &str, mrl: &str) -> Option<String> {
    let base = base.trim_end_matches('/');
    let rest = mrl.strip_prefix(base)?;
    Some(rest.trim_start_matches('/').to_string())
}

/// Resolve a possibly-relative playlist entry location against the playlist
/// file's own MRL.
pub fn resolve(base_mrl: &str, location: &str) -> Result<String> {
    if location.contains("://") {
        return Ok(location.to_string());
    }
    let base = url::Url::parse(base_mrl).map_err(|_| Error::BadMrl(base_mrl.to_string()))?;
    let joined = base
        .join(location)
        .map_err(|_| Error::BadMrl(location.to_string()))?;
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trip() {
        let path = Path::new("/samples/music/some dir/a b.mp3");
        let mrl = from_path(path);
        assert_eq!(mrl, "file:///samples/music/some%20dir/a%20b.mp3");
        assert_eq!(to_path(&mrl).unwrap(), path);
    }

    #[test]
    fn scheme_extraction() {
        assert_eq!(scheme("smb://host/share/").unwrap(), "smb://");
        assert!(scheme("/no/scheme").is_err());
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(file_name("file:///a/b/track%201.flac"), "track 1.flac");
        assert_eq!(extension("file:///a/b/Track.FLAC").as_deref(), Some("flac"));
        assert_eq!(extension("file:///a/b/noext"), None);
        assert_eq!(file_name("file:///a/b/dir/"), "dir");
    }

    #[test]
    fn parent_directory() {
        assert_eq!(
            directory("file:///a/b/c.mp3").unwrap(),
            "file:///a/b/".to_string()
        );
        assert_eq!(directory("file:///a/b/").unwrap(), "file:///a/".to_string());
    }

    #[test]
    fn relative_resolution() {
        assert_eq!(
            resolve("file:///music/pl.m3u", "sub/track.mp3").unwrap(),
            "file:///music/sub/track.mp3"
        );
        assert_eq!(
            resolve("file:///music/pl.m3u", "http://radio.example/stream").unwrap(),
            "http://radio.example/stream"
        );
    }

    #[test]
    fn device_relative() {
        assert_eq!(
            relative_to("file:///mnt/usb/", "file:///mnt/usb/music/t.mp3").as_deref(),
            Some("music/t.mp3")
        );
        assert_eq!(relative_to("file:///mnt/usb/", "file:///other"), None);
    }
}
