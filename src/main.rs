//! Scan test driver.
//!
//! `curator-scan <media folder> <database path> [-q] [-c]`
//!
//! Discovers the given folder into the given database, waits for the
//! pipeline to go idle, and prints what landed in the library. `-q`
//! lowers log verbosity, `-c` caches every subscription after the scan.
//! Exit codes: 0 on success, 1 on bad usage, 2 when the scan fails.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use curator::callbacks::NoopCallbacks;
use curator::{LibraryConfig, MediaLibrary, QueryParameters};

#[derive(Debug, Default)]
struct Options {
    media_folder: Option<PathBuf>,
    database_path: Option<PathBuf>,
    quiet: bool,
    auto_cache: bool,
}

impl Options {
    fn from_args() -> Option<Self> {
        let mut options = Options::default();
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "-q" => options.quiet = true,
                "-c" => options.auto_cache = true,
                _ if arg.starts_with('-') => return None,
                _ if options.media_folder.is_none() => {
                    options.media_folder = Some(PathBuf::from(arg))
                }
                _ if options.database_path.is_none() => {
                    options.database_path = Some(PathBuf::from(arg))
                }
                _ => return None,
            }
        }
        if options.media_folder.is_none() || options.database_path.is_none() {
            return None;
        }
        Some(options)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let Some(options) = Options::from_args() else {
        eprintln!("usage: curator-scan <media folder> <database path> [-q] [-c]");
        return ExitCode::from(1);
    };

    let default_filter = if options.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match run(&options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scan failed: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(options: &Options) -> Result<()> {
    let media_folder = options
        .media_folder
        .as_ref()
        .expect("checked by Options::from_args");
    let database_path = options
        .database_path
        .as_ref()
        .expect("checked by Options::from_args");

    let folder = std::fs::canonicalize(media_folder)
        .with_context(|| format!("cannot access {}", media_folder.display()))?;
    let workspace = database_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("curator");

    let config = LibraryConfig::new(database_path.clone(), workspace);
    let library = MediaLibrary::new(config, Arc::new(NoopCallbacks))
        .await
        .context("failed to open the media library")?;
    library.start(None, None).await.context("failed to start")?;

    let entry_point = curator::mrl::from_path(&folder) + "/";
    info!(entry_point = %entry_point, "Discovering");
    library.discover(&entry_point);

    wait_for_idle(&library).await;

    let params = QueryParameters::default();
    let audio = library.audio_files(&params).count().await?;
    let video = library.video_files(&params).count().await?;
    let albums = library.albums(&params).count().await?;
    let artists = library.artists(&params).count().await?;
    let playlists = library.playlists(&params).count().await?;
    println!("audio: {audio}");
    println!("video: {video}");
    println!("albums: {albums}");
    println!("artists: {artists}");
    println!("playlists: {playlists}");

    if options.auto_cache {
        library.cache_subscriptions();
    }

    library.stop().await;
    Ok(())
}

/// Wait for the discoverer and parser to drain. The parser flickers
/// between tasks, so idling must hold for a few consecutive polls.
async fn wait_for_idle(library: &Arc<MediaLibrary>) {
    let mut stable = 0;
    while stable < 5 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if library.is_parser_idle() {
            stable += 1;
        } else {
            stable = 0;
        }
    }
}
