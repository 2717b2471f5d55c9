//! Embedded media library engine.
//!
//! `curator` discovers audio and video files on local and network storage,
//! extracts their metadata, and maintains a relational SQLite model (media,
//! files, folders, devices, albums, artists, genres, playlists, shows,
//! thumbnails, history, subscriptions) with queryable, sortable, paginated
//! views. Removable and network devices are tracked by presence: media on an
//! absent device are marked missing rather than deleted.
//!
//! The engine is made of three cooperating subsystems:
//! - the [discoverer](discoverer) crawls entry points and feeds the parser,
//! - the [parser](parser) walks persistent tasks through metadata
//!   extraction, analysis, linking and thumbnailing,
//! - the [storage layer](db) enforces the relational invariants, partly in
//!   schema triggers.
//!
//! Everything is orchestrated by the [`MediaLibrary`] facade.

pub mod cache_worker;
pub mod callbacks;
pub mod config;
pub mod db;
pub mod discoverer;
pub mod error;
pub mod fs;
pub mod library;
pub mod mrl;
pub mod parser;
pub mod query;
pub mod swmr;
pub mod thumbnails;

pub use callbacks::{HistoryType, LibraryCallbacks};
pub use config::LibraryConfig;
pub use db::media::{ImportType, MediaSubtype, MediaType, ProgressResult};
pub use db::thumbnails::{ThumbnailOrigin, ThumbnailSizeType, ThumbnailStatus};
pub use error::{Error, Result};
pub use library::MediaLibrary;
pub use query::{Query, QueryParameters, SortingCriteria};
