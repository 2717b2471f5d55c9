//! Device records and presence bookkeeping.
//!
//! One row per `(uuid, scheme)`. Devices are inserted on first sighting and
//! never deleted; presence is toggled by the filesystem holder. The
//! presence cascade to media rows lives in a trigger so readers never see a
//! half-applied transition.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRecord {
    pub id_device: i64,
    pub uuid: String,
    pub scheme: String,
    pub is_removable: bool,
    pub is_present: bool,
    pub is_network: bool,
    pub last_seen: i64,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS Device(
            id_device INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT COLLATE NOCASE,
            scheme TEXT,
            is_removable BOOLEAN,
            is_present BOOLEAN,
            is_network BOOLEAN,
            last_seen INTEGER,
            UNIQUE(uuid, scheme) ON CONFLICT FAIL
        )",
        "CREATE TABLE IF NOT EXISTS DeviceMountpoint(
            device_id INTEGER REFERENCES Device(id_device) ON DELETE CASCADE,
            mrl TEXT,
            last_seen INTEGER,
            PRIMARY KEY(device_id, mrl)
        )",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        // Presence propagates to every media on the device within the same
        // statement, so the transition is observed atomically.
        "CREATE TRIGGER IF NOT EXISTS device_presence_cascade
         AFTER UPDATE OF is_present ON Device
         WHEN old.is_present != new.is_present
         BEGIN
            UPDATE Media SET is_present = new.is_present
                WHERE device_id = new.id_device;
         END",
    ]
}

pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a newly sighted device, present by definition.
    pub async fn create(
        &self,
        uuid: &str,
        scheme: &str,
        is_removable: bool,
        is_network: bool,
    ) -> Result<DeviceRecord> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO Device(uuid, scheme, is_removable, is_present, is_network, last_seen)
             VALUES(?, ?, ?, 1, ?, ?)",
        )
        .bind(uuid)
        .bind(scheme)
        .bind(is_removable)
        .bind(is_network)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_uuid(uuid, scheme)
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<DeviceRecord>> {
        sqlx::query_as("SELECT * FROM Device WHERE id_device = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_uuid(&self, uuid: &str, scheme: &str) -> Result<Option<DeviceRecord>> {
        sqlx::query_as("SELECT * FROM Device WHERE uuid = ? AND scheme = ?")
            .bind(uuid)
            .bind(scheme)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn all(&self) -> Result<Vec<DeviceRecord>> {
        sqlx::query_as("SELECT * FROM Device")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_scheme(&self, scheme: &str) -> Result<Vec<DeviceRecord>> {
        sqlx::query_as("SELECT * FROM Device WHERE scheme = ?")
            .bind(scheme)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    /// Toggle presence. The media cascade runs in the same implicit
    /// transaction through the `device_presence_cascade` trigger.
    pub async fn set_present(&self, id: i64, present: bool) -> Result<()> {
        sqlx::query("UPDATE Device SET is_present = ? WHERE id_device = ?")
            .bind(present)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn update_last_seen(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE Device SET last_seen = ? WHERE id_device = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Record a (possibly new) mountpoint for a network device.
    pub async fn add_mountpoint(&self, id: i64, mrl: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO DeviceMountpoint(device_id, mrl, last_seen) VALUES(?, ?, ?)
             ON CONFLICT(device_id, mrl) DO UPDATE SET last_seen = excluded.last_seen",
        )
        .bind(id)
        .bind(mrl)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn mountpoints(&self, id: i64) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT mrl, last_seen FROM DeviceMountpoint WHERE device_id = ?
             ORDER BY last_seen DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(rows)
    }

    /// Mark every network device absent in a single transaction. Used when
    /// network discovery gets disabled.
    pub async fn mark_network_devices_absent(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id_device FROM Device WHERE is_network = 1 AND is_present = 1")
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        for (id,) in ids {
            sqlx::query("UPDATE Device SET is_present = 0 WHERE id_device = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::from_sqlx)?;
        }
        tx.commit().await.map_err(Error::from_sqlx)
    }
}
