//! Audio, video and subtitle track records attached to a media.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AudioTrackRecord {
    pub id_track: i64,
    pub media_id: i64,
    pub codec: String,
    pub bitrate: i64,
    pub samplerate: i64,
    pub nb_channels: i64,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VideoTrackRecord {
    pub id_track: i64,
    pub media_id: i64,
    pub codec: String,
    pub width: i64,
    pub height: i64,
    pub fps_num: i64,
    pub fps_den: i64,
    pub bitrate: i64,
    pub sar_num: i64,
    pub sar_den: i64,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubtitleTrackRecord {
    pub id_track: i64,
    pub media_id: i64,
    pub codec: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub encoding: Option<String>,
}

/// Track description produced by the metadata probe, before persistence.
#[derive(Debug, Clone)]
pub enum ProbedTrack {
    Audio {
        codec: String,
        bitrate: i64,
        samplerate: i64,
        nb_channels: i64,
        language: Option<String>,
    },
    Video {
        codec: String,
        width: i64,
        height: i64,
        fps_num: i64,
        fps_den: i64,
        bitrate: i64,
    },
    Subtitle {
        codec: String,
        language: Option<String>,
        encoding: Option<String>,
    },
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS AudioTrack(
            id_track INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            codec TEXT,
            bitrate INTEGER NOT NULL DEFAULT 0,
            samplerate INTEGER NOT NULL DEFAULT 0,
            nb_channels INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            description TEXT
        )",
        "CREATE TABLE IF NOT EXISTS VideoTrack(
            id_track INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            codec TEXT,
            width INTEGER NOT NULL DEFAULT 0,
            height INTEGER NOT NULL DEFAULT 0,
            fps_num INTEGER NOT NULL DEFAULT 0,
            fps_den INTEGER NOT NULL DEFAULT 1,
            bitrate INTEGER NOT NULL DEFAULT 0,
            sar_num INTEGER NOT NULL DEFAULT 1,
            sar_den INTEGER NOT NULL DEFAULT 1,
            language TEXT,
            description TEXT
        )",
        "CREATE TABLE IF NOT EXISTS SubtitleTrack(
            id_track INTEGER PRIMARY KEY AUTOINCREMENT,
            media_id INTEGER NOT NULL REFERENCES Media(id_media) ON DELETE CASCADE,
            codec TEXT,
            language TEXT,
            description TEXT,
            encoding TEXT
        )",
        "CREATE INDEX IF NOT EXISTS audio_track_media_idx ON AudioTrack(media_id)",
        "CREATE INDEX IF NOT EXISTS video_track_media_idx ON VideoTrack(media_id)",
        "CREATE INDEX IF NOT EXISTS subtitle_track_media_idx ON SubtitleTrack(media_id)",
    ]
}

pub struct TrackRepository {
    pool: SqlitePool,
}

impl TrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace a media's tracks with the probe's result, in one
    /// transaction. Refresh tasks go through here so stale tracks never
    /// accumulate.
    pub async fn replace_for_media(&self, media_id: i64, tracks: &[ProbedTrack]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        for table in ["AudioTrack", "VideoTrack", "SubtitleTrack"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE media_id = ?"))
                .bind(media_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        }
        for track in tracks {
            match track {
                ProbedTrack::Audio {
                    codec,
                    bitrate,
                    samplerate,
                    nb_channels,
                    language,
                } => {
                    sqlx::query(
                        "INSERT INTO AudioTrack(media_id, codec, bitrate, samplerate,
                                                nb_channels, language)
                         VALUES(?, ?, ?, ?, ?, ?)",
                    )
                    .bind(media_id)
                    .bind(codec)
                    .bind(bitrate)
                    .bind(samplerate)
                    .bind(nb_channels)
                    .bind(language)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::from_sqlx)?;
                }
                ProbedTrack::Video {
                    codec,
                    width,
                    height,
                    fps_num,
                    fps_den,
                    bitrate,
                } => {
                    sqlx::query(
                        "INSERT INTO VideoTrack(media_id, codec, width, height,
                                                fps_num, fps_den, bitrate)
                         VALUES(?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(media_id)
                    .bind(codec)
                    .bind(width)
                    .bind(height)
                    .bind(fps_num)
                    .bind(fps_den)
                    .bind(bitrate)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::from_sqlx)?;
                }
                ProbedTrack::Subtitle {
                    codec,
                    language,
                    encoding,
                } => {
                    sqlx::query(
                        "INSERT INTO SubtitleTrack(media_id, codec, language, encoding)
                         VALUES(?, ?, ?, ?)",
                    )
                    .bind(media_id)
                    .bind(codec)
                    .bind(language)
                    .bind(encoding)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::from_sqlx)?;
                }
            }
        }
        tx.commit().await.map_err(Error::from_sqlx)
    }

    pub async fn audio_for_media(&self, media_id: i64) -> Result<Vec<AudioTrackRecord>> {
        sqlx::query_as("SELECT * FROM AudioTrack WHERE media_id = ? ORDER BY id_track")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn video_for_media(&self, media_id: i64) -> Result<Vec<VideoTrackRecord>> {
        sqlx::query_as("SELECT * FROM VideoTrack WHERE media_id = ? ORDER BY id_track")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn subtitle_for_media(&self, media_id: i64) -> Result<Vec<SubtitleTrackRecord>> {
        sqlx::query_as("SELECT * FROM SubtitleTrack WHERE media_id = ? ORDER BY id_track")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}
