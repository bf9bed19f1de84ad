use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_properties(s: &str) -> BTreeMap<String, String> {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::error!("Invalid device property bag in database: {}", e);
        BTreeMap::new()
    })
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<DeviceProfile> {
    Ok(DeviceProfile {
        id: row.get(0)?,
        codename: row.get(1)?,
        display_name: row.get(2)?,
        status: DeviceStatus::parse(&row.get::<_, String>(3)?).unwrap_or(DeviceStatus::Ready),
        properties: parse_properties(&row.get::<_, String>(4)?),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn app_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedApp> {
    Ok(TrackedApp {
        id: row.get(0)?,
        name: row.get(1)?,
        package_id: row.get(2)?,
        platform: row.get(3)?,
        download_url: row.get(4)?,
        version_name: row.get(5)?,
        version_code: row.get(6)?,
        released_at: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_datetime(&s)),
        auto_update: row.get(8)?,
        is_bundled: row.get(9)?,
        permissions: row.get(10)?,
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ArtifactRecord> {
    Ok(ArtifactRecord {
        id: row.get(0)?,
        app_id: row.get(1)?,
        version_code: row.get(2)?,
        blob_path: row.get(3)?,
        size_bytes: row.get(4)?,
        checksum: row.get(5)?,
        signature: row.get(6)?,
        installable: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn split_from_row(row: &Row<'_>) -> rusqlite::Result<SplitArtifact> {
    Ok(SplitArtifact {
        id: row.get(0)?,
        app_id: row.get(1)?,
        record_id: row.get(2)?,
        name: row.get(3)?,
        blob_path: row.get(4)?,
        size_bytes: row.get(5)?,
    })
}

const DEVICE_COLS: &str = "id, codename, display_name, status, properties, created_at";
const APP_COLS: &str = "id, name, package_id, platform, download_url, version_name, \
     version_code, released_at, auto_update, is_bundled, permissions, updated_at";
const RECORD_COLS: &str =
    "id, app_id, version_code, blob_path, size_bytes, checksum, signature, installable, created_at";
const SPLIT_COLS: &str = "id, app_id, record_id, name, blob_path, size_bytes";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Device profile operations

    fn create_device(&self, device: &NewDevice) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO device_profiles (codename, display_name, status, properties)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                device.codename,
                device.display_name,
                device.status.as_str(),
                serde_json::to_string(&device.properties)
                    .map_err(|e| Error::Config(e.to_string()))?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_device(&self, codename: &str) -> Result<Option<DeviceProfile>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DEVICE_COLS} FROM device_profiles WHERE codename = ?1"),
            params![codename],
            device_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_completed_devices(&self) -> Result<Vec<DeviceProfile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEVICE_COLS} FROM device_profiles WHERE status = 'completed' ORDER BY id"
        ))?;
        let rows = stmt.query_map([], device_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Tracked application operations

    fn create_app(&self, app: &NewApp) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO apps (name, package_id, platform, download_url, version_name,
                 version_code, auto_update, is_bundled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                app.name,
                app.package_id,
                app.platform,
                app.download_url,
                app.version_name,
                app.version_code,
                app.auto_update,
                app.is_bundled,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_app(&self, name: &str, platform: &str) -> Result<Option<TrackedApp>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {APP_COLS} FROM apps WHERE name = ?1 AND platform = ?2"),
            params![name, platform],
            app_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_auto_update_apps(&self, platform: &str) -> Result<Vec<TrackedApp>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {APP_COLS} FROM apps
             WHERE platform = ?1 AND auto_update = 1
             ORDER BY released_at IS NULL, released_at, id"
        ))?;
        let rows = stmt.query_map(params![platform], app_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_app(&self, app: &TrackedApp) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE apps SET version_name = ?1, version_code = ?2, released_at = ?3,
                 is_bundled = ?4, permissions = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                app.version_name,
                app.version_code,
                app.released_at.as_ref().map(format_datetime),
                app.is_bundled,
                app.permissions,
                format_datetime(&Utc::now()),
                app.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Artifact record operations

    fn get_or_create_record(
        &self,
        app_id: i64,
        version_code: i64,
    ) -> Result<(ArtifactRecord, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO artifact_records (app_id, version_code) VALUES (?1, ?2)
             ON CONFLICT(app_id, version_code) DO NOTHING",
            params![app_id, version_code],
        )?;
        let record = conn.query_row(
            &format!(
                "SELECT {RECORD_COLS} FROM artifact_records
                 WHERE app_id = ?1 AND version_code = ?2"
            ),
            params![app_id, version_code],
            record_from_row,
        )?;
        Ok((record, inserted > 0))
    }

    fn get_record(&self, record_id: i64) -> Result<Option<ArtifactRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RECORD_COLS} FROM artifact_records WHERE id = ?1"),
            params![record_id],
            record_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_records(&self, app_id: i64) -> Result<Vec<ArtifactRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLS} FROM artifact_records WHERE app_id = ?1 ORDER BY version_code"
        ))?;
        let rows = stmt.query_map(params![app_id], record_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_record_binary(&self, record: &ArtifactRecord) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE artifact_records SET blob_path = ?1, size_bytes = ?2, checksum = ?3,
                 signature = ?4, installable = ?5
             WHERE id = ?6",
            params![
                record.blob_path,
                record.size_bytes,
                record.checksum,
                record.signature,
                record.installable,
                record.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn attach_record_device(&self, record_id: i64, device_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO record_devices (record_id, device_id) VALUES (?1, ?2)
             ON CONFLICT DO NOTHING",
            params![record_id, device_id],
        )?;
        Ok(())
    }

    fn delete_app_artifacts(&self, app_id: i64) -> Result<usize> {
        let conn = self.conn();
        // Splits hold a non-cascading reference to their record, so they go first.
        conn.execute(
            "DELETE FROM split_artifacts WHERE app_id = ?1",
            params![app_id],
        )?;
        let records = conn.execute(
            "DELETE FROM artifact_records WHERE app_id = ?1",
            params![app_id],
        )?;
        Ok(records)
    }

    // Split artifact operations

    fn get_or_create_split(&self, split: &NewSplit) -> Result<(SplitArtifact, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO split_artifacts (app_id, record_id, name, blob_path, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(app_id, record_id, name, size_bytes) DO NOTHING",
            params![
                split.app_id,
                split.record_id,
                split.name,
                split.blob_path,
                split.size_bytes,
            ],
        )?;
        let row = conn.query_row(
            &format!(
                "SELECT {SPLIT_COLS} FROM split_artifacts
                 WHERE app_id = ?1 AND record_id = ?2 AND name = ?3 AND size_bytes = ?4"
            ),
            params![split.app_id, split.record_id, split.name, split.size_bytes],
            split_from_row,
        )?;
        Ok((row, inserted > 0))
    }

    fn list_record_splits(&self, record_id: i64) -> Result<Vec<SplitArtifact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SPLIT_COLS} FROM split_artifacts WHERE record_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![record_id], split_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn attach_split_device(&self, split_id: i64, device_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO split_devices (split_id, device_id) VALUES (?1, ?2)
             ON CONFLICT DO NOTHING",
            params![split_id, device_id],
        )?;
        Ok(())
    }

    // Store-account token cache

    fn cached_token(&self, account: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT token FROM market_tokens WHERE account = ?1",
            params![account],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn put_token(&self, account: &str, token: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO market_tokens (account, token, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(account) DO UPDATE SET token = excluded.token,
                 updated_at = excluded.updated_at",
            params![account, token, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn clear_token(&self, account: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM market_tokens WHERE account = ?1", params![account])?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
