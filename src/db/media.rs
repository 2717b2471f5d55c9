//! Media records: the central entity of the library.
//!
//! A media row is created by the parser (internal import) or by the host
//! (external/stream import). Internal media carry their folder and device;
//! external media have neither. Playback progress classification and the
//! per-duration margins live here.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum MediaType {
    Unknown = 0,
    Video = 1,
    Audio = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum MediaSubtype {
    Unknown = 0,
    ShowEpisode = 1,
    Movie = 2,
    AlbumTrack = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i64)]
pub enum ImportType {
    Internal = 0,
    External = 1,
    Stream = 2,
}

/// Outcome of a playback progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressResult {
    /// Too early in the playback; progress was reset.
    Begin,
    /// Close enough to the end; progress reset and play count bumped.
    End,
    /// Position and time stored as provided.
    AsIs,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionType {
    Begin,
    End,
    Any,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaRecord {
    pub id_media: i64,
    #[sqlx(rename = "type")]
    pub media_type: MediaType,
    pub subtype: MediaSubtype,
    pub import_type: ImportType,
    pub duration: i64,
    pub last_position: f64,
    pub last_time: i64,
    pub play_count: i64,
    pub last_played_date: Option<i64>,
    pub real_last_played_date: Option<i64>,
    pub insertion_date: i64,
    pub release_date: Option<i64>,
    pub title: String,
    pub forced_title: bool,
    pub filename: String,
    pub is_favorite: bool,
    pub is_present: bool,
    pub device_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub group_id: Option<i64>,
    pub has_been_grouped: bool,
    pub nb_playlists: i64,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
}

impl MediaRecord {
    pub fn is_stream(&self) -> bool {
        self.import_type == ImportType::Stream
    }
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Media(
            id_media INTEGER PRIMARY KEY AUTOINCREMENT,
            type INTEGER NOT NULL DEFAULT 0,
            subtype INTEGER NOT NULL DEFAULT 0,
            import_type INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL DEFAULT -1,
            last_position REAL NOT NULL DEFAULT -1,
            last_time INTEGER NOT NULL DEFAULT -1,
            play_count INTEGER NOT NULL DEFAULT 0,
            last_played_date INTEGER,
            real_last_played_date INTEGER,
            insertion_date INTEGER,
            release_date INTEGER,
            title TEXT COLLATE NOCASE,
            forced_title BOOLEAN NOT NULL DEFAULT 0,
            filename TEXT COLLATE NOCASE,
            is_favorite BOOLEAN NOT NULL DEFAULT 0,
            is_present BOOLEAN NOT NULL DEFAULT 1,
            device_id INTEGER,
            folder_id INTEGER REFERENCES Folder(id_folder) ON DELETE CASCADE,
            group_id INTEGER REFERENCES MediaGroup(id_group) ON DELETE SET NULL,
            has_been_grouped BOOLEAN NOT NULL DEFAULT 0,
            nb_playlists INTEGER NOT NULL DEFAULT 0,
            album_id INTEGER REFERENCES Album(id_album) ON DELETE SET NULL,
            artist_id INTEGER REFERENCES Artist(id_artist) ON DELETE SET NULL,
            genre_id INTEGER REFERENCES Genre(id_genre) ON DELETE SET NULL,
            track_number INTEGER,
            disc_number INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS media_types_idx ON Media(type, subtype)",
        "CREATE INDEX IF NOT EXISTS media_presence_idx ON Media(is_present)",
        "CREATE INDEX IF NOT EXISTS media_folder_id_idx ON Media(folder_id)",
        "CREATE INDEX IF NOT EXISTS media_last_played_idx ON Media(last_played_date)",
        "CREATE VIRTUAL TABLE IF NOT EXISTS MediaFts USING fts5(title, labels)",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS media_fts_insert
         AFTER INSERT ON Media
         BEGIN
            INSERT INTO MediaFts(rowid, title, labels) VALUES(new.id_media, new.title, '');
         END",
        "CREATE TRIGGER IF NOT EXISTS media_fts_delete
         AFTER DELETE ON Media
         BEGIN
            DELETE FROM MediaFts WHERE rowid = old.id_media;
         END",
        "CREATE TRIGGER IF NOT EXISTS media_fts_update_title
         AFTER UPDATE OF title ON Media
         WHEN old.title != new.title
         BEGIN
            UPDATE MediaFts SET title = new.title WHERE rowid = new.id_media;
         END",
    ]
}

pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an internal media discovered under `folder_id`. Presence is
    /// inherited from the device at insertion time.
    pub async fn create(
        &self,
        media_type: MediaType,
        title: &str,
        filename: &str,
        folder_id: i64,
        device_id: i64,
    ) -> Result<MediaRecord> {
        let res = sqlx::query(
            "INSERT INTO Media(type, title, filename, insertion_date, folder_id, device_id,
                               is_present)
             VALUES(?, ?, ?, ?, ?, ?,
                    IFNULL((SELECT is_present FROM Device WHERE id_device = ?), 1))",
        )
        .bind(media_type)
        .bind(title)
        .bind(filename)
        .bind(chrono::Utc::now().timestamp())
        .bind(folder_id)
        .bind(device_id)
        .bind(device_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    /// Insert an external or stream media provided by the host.
    pub async fn create_external(
        &self,
        title: &str,
        filename: &str,
        import_type: ImportType,
    ) -> Result<MediaRecord> {
        debug_assert!(import_type != ImportType::Internal);
        let res = sqlx::query(
            "INSERT INTO Media(type, title, filename, insertion_date, import_type)
             VALUES(0, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(filename)
        .bind(chrono::Utc::now().timestamp())
        .bind(import_type)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
        sqlx::query_as("SELECT * FROM Media WHERE id_media = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Fetch a media through its main file's MRL.
    pub async fn by_mrl(&self, mrl: &str) -> Result<Option<MediaRecord>> {
        sqlx::query_as(
            "SELECT m.* FROM Media m
             INNER JOIN File f ON f.media_id = m.id_media
             WHERE f.mrl = ?",
        )
        .bind(mrl)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM Media WHERE id_media = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    /// Set the title. A non-forced update never overwrites a forced title.
    pub async fn set_title(&self, id: i64, title: &str, forced: bool) -> Result<bool> {
        let res = if forced {
            sqlx::query("UPDATE Media SET title = ?, forced_title = 1 WHERE id_media = ?")
                .bind(title)
                .bind(id)
                .execute(&self.pool)
                .await
        } else {
            sqlx::query("UPDATE Media SET title = ? WHERE id_media = ? AND forced_title = 0")
                .bind(title)
                .bind(id)
                .execute(&self.pool)
                .await
        }
        .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_duration(&self, id: i64, duration_ms: i64) -> Result<()> {
        sqlx::query("UPDATE Media SET duration = ? WHERE id_media = ?")
            .bind(duration_ms)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_type(&self, id: i64, media_type: MediaType) -> Result<()> {
        sqlx::query("UPDATE Media SET type = ? WHERE id_media = ?")
            .bind(media_type)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_subtype(&self, id: i64, subtype: MediaSubtype) -> Result<()> {
        sqlx::query("UPDATE Media SET subtype = ? WHERE id_media = ?")
            .bind(subtype)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_release_date(&self, id: i64, date: i64) -> Result<()> {
        sqlx::query("UPDATE Media SET release_date = ? WHERE id_media = ?")
            .bind(date)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_favorite(&self, id: i64, favorite: bool) -> Result<()> {
        sqlx::query("UPDATE Media SET is_favorite = ? WHERE id_media = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Attach the media to an album as a track. The album/artist/genre
    /// aggregate counters follow through triggers.
    #[allow(clippy::too_many_arguments)]
    pub async fn link_album_track(
        &self,
        id: i64,
        album_id: i64,
        artist_id: i64,
        genre_id: Option<i64>,
        track_number: Option<i64>,
        disc_number: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE Media SET subtype = ?, album_id = ?, artist_id = ?, genre_id = ?,
                              track_number = ?, disc_number = ?
             WHERE id_media = ?",
        )
        .bind(MediaSubtype::AlbumTrack)
        .bind(album_id)
        .bind(artist_id)
        .bind(genre_id)
        .bind(track_number)
        .bind(disc_number)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn set_group(&self, id: i64, group_id: Option<i64>) -> Result<()> {
        sqlx::query(
            "UPDATE Media SET group_id = ?, has_been_grouped = has_been_grouped OR ?
             WHERE id_media = ?",
        )
        .bind(group_id)
        .bind(group_id.is_some())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Convert an internal media to an external one: the folder/device
    /// links are nulled, subtype rows dropped, and the backing files
    /// re-tagged, all in one transaction.
    pub async fn convert_to_external(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        sqlx::query(
            "UPDATE Media SET folder_id = NULL, device_id = NULL, import_type = ?,
                              subtype = 0, album_id = NULL, artist_id = NULL,
                              genre_id = NULL, track_number = NULL, disc_number = NULL
             WHERE id_media = ?",
        )
        .bind(ImportType::External)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(Error::from_sqlx)?;
        sqlx::query("DELETE FROM ShowEpisode WHERE media_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        sqlx::query("DELETE FROM Movie WHERE media_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        sqlx::query("UPDATE File SET is_external = 1, folder_id = NULL WHERE media_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        tx.commit().await.map_err(Error::from_sqlx)
    }

    // ------------------------------------------------------------------
    // Playback progress
    // ------------------------------------------------------------------

    /// Store a playback position expressed in `[0, 1]`.
    pub async fn set_last_position(
        &self,
        media: &MediaRecord,
        position: f64,
    ) -> Result<ProgressResult> {
        let (time, position_type) = if media.duration > 0 {
            (
                (position * media.duration as f64).round() as i64,
                compute_position_type(media.duration, position),
            )
        } else {
            (-1, PositionType::Any)
        };
        self.set_last_position_and_time(media.id_media, position_type, position, time)
            .await
    }

    /// Store a playback time expressed in milliseconds.
    pub async fn set_last_time(&self, media: &MediaRecord, time: i64) -> Result<ProgressResult> {
        let (position, position_type) = if media.duration > 0 {
            let position = time as f64 / media.duration as f64;
            (position, compute_position_type(media.duration, position))
        } else {
            (-1.0, PositionType::Any)
        };
        self.set_last_position_and_time(media.id_media, position_type, position, time)
            .await
    }

    async fn set_last_position_and_time(
        &self,
        id: i64,
        position_type: PositionType,
        position: f64,
        time: i64,
    ) -> Result<ProgressResult> {
        let now = chrono::Utc::now().timestamp();
        let (curated_position, curated_time) = match position_type {
            // Not far enough into the playback to keep a resume point, but
            // an old one must not survive either.
            PositionType::Begin | PositionType::End => (-1.0, -1),
            PositionType::Any => (position, time),
        };
        let res = if position_type == PositionType::End {
            sqlx::query(
                "UPDATE Media SET last_position = ?, last_time = ?,
                                  play_count = play_count + 1, last_played_date = ?
                 WHERE id_media = ?",
            )
            .bind(curated_position)
            .bind(curated_time)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE Media SET last_position = ?, last_time = ?, last_played_date = ?
                 WHERE id_media = ?",
            )
            .bind(curated_position)
            .bind(curated_time)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
        };
        match res {
            Ok(r) if r.rows_affected() > 0 => Ok(match position_type {
                PositionType::Begin => ProgressResult::Begin,
                PositionType::End => ProgressResult::End,
                PositionType::Any => ProgressResult::AsIs,
            }),
            Ok(_) => Ok(ProgressResult::Error),
            Err(e) => Err(Error::from_sqlx(e)),
        }
    }

    pub async fn set_play_count(&self, id: i64, play_count: i64) -> Result<()> {
        sqlx::query("UPDATE Media SET play_count = ? WHERE id_media = ?")
            .bind(play_count)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Reset playback state for every media.
    pub async fn clear_history(&self) -> Result<()> {
        sqlx::query(
            "UPDATE Media SET play_count = 0, last_played_date = NULL,
                              last_position = -1, last_time = -1
             WHERE play_count != 0 OR last_played_date IS NOT NULL
                OR last_position != -1 OR last_time != -1",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Played media, most recent first. `streams` selects the network
    /// history instead of the local one.
    pub fn history(&self, streams: bool) -> Query<MediaRecord> {
        let body = if streams {
            "FROM Media m WHERE m.last_played_date IS NOT NULL AND m.import_type = 2"
        } else {
            "FROM Media m WHERE m.last_played_date IS NOT NULL AND m.import_type != 2"
        };
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            "ORDER BY m.last_played_date DESC",
            Vec::new(),
        )
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Media of a given type. Supports the full media sort set.
    pub fn listing(&self, media_type: MediaType, params: &QueryParameters) -> Query<MediaRecord> {
        let order_by = media_order_by(params);
        let mut body = String::from("FROM Media m");
        body.push_str(media_join_for_sort(params.sort));
        body.push_str(" WHERE m.type = ? AND m.import_type = 0");
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            order_by,
            vec![BindValue::Int(media_type as i64)],
        )
    }

    /// All audio and video media regardless of type.
    pub fn all_media(&self, params: &QueryParameters) -> Query<MediaRecord> {
        let order_by = media_order_by(params);
        let mut body = String::from("FROM Media m");
        body.push_str(media_join_for_sort(params.sort));
        body.push_str(" WHERE m.type != 0 AND m.import_type = 0");
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(self.pool.clone(), "m.*", body, order_by, Vec::new())
    }

    /// Tracks of one album, in "disc number then track number" order by
    /// default.
    pub fn album_tracks(&self, album_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::Alpha => format!("ORDER BY m.title {direction}, m.id_media ASC"),
            SortingCriteria::Duration => {
                format!("ORDER BY m.duration {direction}, m.id_media ASC")
            }
            SortingCriteria::ReleaseDate => {
                format!("ORDER BY m.release_date {direction}, m.id_media ASC")
            }
            _ => format!(
                "ORDER BY m.disc_number {direction}, m.track_number {direction}, m.id_media ASC"
            ),
        };
        let mut body = String::from("FROM Media m WHERE m.album_id = ?");
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            order_by,
            vec![BindValue::Int(album_id)],
        )
    }

    pub fn in_group(&self, group_id: i64, params: &QueryParameters) -> Query<MediaRecord> {
        let order_by = media_order_by(params);
        let mut body = String::from("FROM Media m");
        body.push_str(media_join_for_sort(params.sort));
        body.push_str(" WHERE m.group_id = ?");
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            order_by,
            vec![BindValue::Int(group_id)],
        )
    }

    /// Full-text title/label search, restricted to present media unless
    /// asked otherwise.
    pub fn search(&self, pattern: &str, params: &QueryParameters) -> Query<MediaRecord> {
        let order_by = media_order_by(params);
        let mut body = String::from("FROM Media m");
        body.push_str(media_join_for_sort(params.sort));
        body.push_str(
            " WHERE m.id_media IN
                (SELECT rowid FROM MediaFts WHERE MediaFts MATCH ?)",
        );
        if !params.include_missing {
            body.push_str(" AND m.is_present = 1");
        }
        Query::new(
            self.pool.clone(),
            "m.*",
            body,
            order_by,
            vec![BindValue::Text(format!("{pattern}*"))],
        )
    }

    /// All media rows on the given device; used when pruning after a device
    /// is forgotten and by the presence tests.
    pub async fn on_device(&self, device_id: i64) -> Result<Vec<MediaRecord>> {
        sqlx::query_as("SELECT * FROM Media WHERE device_id = ?")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}

/// Join fragment required by sorts referencing other tables.
fn media_join_for_sort(sort: SortingCriteria) -> &'static str {
    match sort {
        SortingCriteria::FileSize => {
            " LEFT JOIN File f ON f.media_id = m.id_media AND f.file_type = 1"
        }
        SortingCriteria::Album => " LEFT JOIN Album alb ON alb.id_album = m.album_id",
        _ => "",
    }
}

fn media_order_by(params: &QueryParameters) -> String {
    let direction = if params.desc { "DESC" } else { "ASC" };
    match params.sort {
        SortingCriteria::Duration => format!("ORDER BY m.duration {direction}, m.id_media ASC"),
        SortingCriteria::InsertionDate => {
            format!("ORDER BY m.insertion_date {direction}, m.id_media ASC")
        }
        SortingCriteria::ReleaseDate => {
            format!("ORDER BY m.release_date {direction}, m.id_media ASC")
        }
        SortingCriteria::FileSize => format!("ORDER BY f.size {direction}, m.id_media ASC"),
        // Play count is descending by default: "most played" is the
        // interesting end.
        SortingCriteria::PlayCount => {
            let direction = if params.desc { "ASC" } else { "DESC" };
            format!("ORDER BY m.play_count {direction}, m.id_media ASC")
        }
        SortingCriteria::Filename => format!("ORDER BY m.filename {direction}, m.id_media ASC"),
        SortingCriteria::LastPlaybackDate => {
            format!("ORDER BY m.last_played_date {direction}, m.id_media ASC")
        }
        SortingCriteria::Album => format!(
            "ORDER BY alb.title {direction}, m.disc_number ASC, m.track_number ASC, m.id_media ASC"
        ),
        SortingCriteria::TrackId => format!("ORDER BY m.id_media {direction}"),
        SortingCriteria::TrackNumber => format!(
            "ORDER BY m.disc_number {direction}, m.track_number {direction}, m.id_media ASC"
        ),
        SortingCriteria::Default | SortingCriteria::Alpha => {
            format!("ORDER BY m.title {direction}, m.id_media ASC")
        }
        other => {
            warn!(?other, "Unsupported media sort, falling back to Default");
            "ORDER BY m.title ASC, m.id_media ASC".to_string()
        }
    }
}

/// Classify a position against the duration-dependent margin: 5% under one
/// hour, then 4/3/2% per additional hour band, 1% beyond four hours.
fn compute_position_type(duration_ms: i64, position: f64) -> PositionType {
    const HOUR_MS: i64 = 60 * 60 * 1000;
    let margin = if duration_ms < HOUR_MS {
        0.05
    } else if duration_ms < 2 * HOUR_MS {
        0.04
    } else if duration_ms < 3 * HOUR_MS {
        0.03
    } else if duration_ms < 4 * HOUR_MS {
        0.02
    } else {
        0.01
    };
    if position < margin {
        PositionType::Begin
    } else if position > 1.0 - margin {
        PositionType::End
    } else {
        PositionType::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[test]
    fn margin_bands() {
        // 30 minutes: 5% margin.
        assert_eq!(
            compute_position_type(30 * 60 * 1000, 0.04),
            PositionType::Begin
        );
        assert_eq!(
            compute_position_type(30 * 60 * 1000, 0.5),
            PositionType::Any
        );
        assert_eq!(
            compute_position_type(30 * 60 * 1000, 0.97),
            PositionType::End
        );
        // 90 minutes: 4%.
        assert_eq!(
            compute_position_type(90 * 60 * 1000, 0.045),
            PositionType::Any
        );
        assert_eq!(
            compute_position_type(90 * 60 * 1000, 0.03),
            PositionType::Begin
        );
        // 5 hours: 1%.
        assert_eq!(
            compute_position_type(5 * HOUR_MS, 0.015),
            PositionType::Any
        );
        assert_eq!(
            compute_position_type(5 * HOUR_MS, 0.995),
            PositionType::End
        );
    }

    #[test]
    fn classification_is_strict_at_the_margin() {
        // Exactly at the margin is not Begin (strictly less than), and
        // exactly at 1 - margin is not End (strictly greater than).
        assert_eq!(compute_position_type(HOUR_MS - 1, 0.05), PositionType::Any);
        assert_eq!(compute_position_type(HOUR_MS - 1, 0.95), PositionType::Any);
    }

    #[test]
    fn extremes() {
        assert_eq!(compute_position_type(HOUR_MS, 0.0), PositionType::Begin);
        assert_eq!(compute_position_type(HOUR_MS, 1.0), PositionType::End);
    }
}
