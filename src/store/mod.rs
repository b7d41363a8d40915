//! Settings Store (§4.1): the single source of truth for desired state.
//!
//! Backed by `rusqlite` in WAL mode. Blocking calls are dispatched through
//! `tokio::task::spawn_blocking` so the async Reconciler never stalls on
//! disk I/O, mirroring the teacher's actor-style offload of blocking work
//! in `platform/device_monitor.rs`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::CoreError;
use crate::types::{CameraRecord, SystemSettings};

const SYSTEM_SETTINGS_KEY: &str = "system_settings";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS cameras (
    uid              TEXT PRIMARY KEY,
    device_path      TEXT,
    hardware_name    TEXT NOT NULL,
    friendly_name    TEXT NOT NULL,
    enabled          INTEGER NOT NULL,
    connected        INTEGER NOT NULL,
    moonraker_enabled INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    record_json      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    ts         TEXT NOT NULL,
    level      TEXT NOT NULL,
    camera_uid TEXT,
    message    TEXT NOT NULL
);
";

/// A durable, ordered, keyed store for camera records and system settings.
/// Cheaply cloneable; every clone shares the same underlying connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the store at `path`. Schema creation is
    /// idempotent. A failed schema check is reported as
    /// [`CoreError::Corruption`], fatal to the caller's startup sequence.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Corruption(format!("creating store directory: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| CoreError::Corruption(format!("opening store at {path:?}: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CoreError::Corruption(format!("enabling WAL mode: {e}")))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| CoreError::Corruption(format!("schema check failed: {e}")))?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store, used by tests and by the probe CLI's dry-run mode.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Corruption(format!("opening in-memory store: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| CoreError::Corruption(format!("schema check failed: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("store connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| CoreError::Fatal(format!("store task panicked: {e}")))?
    }

    pub async fn get(&self, uid: &str) -> Result<Option<CameraRecord>, CoreError> {
        let uid = uid.to_string();
        self.blocking(move |conn| Self::get_sync(conn, &uid)).await
    }

    pub async fn list(&self) -> Result<Vec<CameraRecord>, CoreError> {
        self.blocking(Self::list_sync).await
    }

    pub async fn upsert(&self, record: CameraRecord) -> Result<(), CoreError> {
        self.blocking(move |conn| Self::upsert_sync(conn, &record)).await
    }

    pub async fn delete(&self, uid: &str) -> Result<(), CoreError> {
        let uid = uid.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM cameras WHERE uid = ?1", params![uid])?;
            Ok(())
        })
        .await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, CoreError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(CoreError::from)
        })
        .await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    /// Read the singleton [`SystemSettings`] row (§3), stored under a single
    /// settings key as JSON. `None` means the row has never been seeded.
    pub async fn get_system_settings(&self) -> Result<Option<SystemSettings>, CoreError> {
        let raw = self.get_setting(SYSTEM_SETTINGS_KEY).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| CoreError::Corruption(format!("decoding system settings: {e}")))
        })
        .transpose()
    }

    /// Persist the singleton [`SystemSettings`] row, overwriting any
    /// previous value (§3).
    pub async fn set_system_settings(&self, settings: &SystemSettings) -> Result<(), CoreError> {
        let json = serde_json::to_string(settings)
            .map_err(|e| CoreError::BadRequest(format!("serializing system settings: {e}")))?;
        self.set_setting(SYSTEM_SETTINGS_KEY, &json).await
    }

    /// Append a row to the secondary, queryable log mirror (§6). This is
    /// best-effort: callers should not fail a reconcile tick over a log
    /// write error.
    pub async fn log_event(&self, level: &str, camera_uid: Option<&str>, message: &str) -> Result<(), CoreError> {
        let level = level.to_string();
        let camera_uid = camera_uid.map(str::to_string);
        let message = message.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO logs (ts, level, camera_uid, message) VALUES (?1, ?2, ?3, ?4)",
                params![Utc::now().to_rfc3339(), level, camera_uid, message],
            )?;
            Ok(())
        })
        .await
    }

    fn get_sync(conn: &Connection, uid: &str) -> Result<Option<CameraRecord>, CoreError> {
        conn.query_row("SELECT record_json FROM cameras WHERE uid = ?1", params![uid], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(CoreError::from)?
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| CoreError::Corruption(format!("decoding camera row {uid}: {e}")))
        })
        .transpose()
    }

    fn list_sync(conn: &Connection) -> Result<Vec<CameraRecord>, CoreError> {
        let mut stmt = conn.prepare("SELECT record_json FROM cameras ORDER BY uid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            let record: CameraRecord = serde_json::from_str(&json)
                .map_err(|e| CoreError::Corruption(format!("decoding camera row: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    fn upsert_sync(conn: &Connection, record: &CameraRecord) -> Result<(), CoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| CoreError::BadRequest(format!("serializing camera record: {e}")))?;

        conn.execute(
            "INSERT INTO cameras
                (uid, device_path, hardware_name, friendly_name, enabled, connected,
                 moonraker_enabled, created_at, updated_at, record_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(uid) DO UPDATE SET
                device_path = excluded.device_path,
                hardware_name = excluded.hardware_name,
                friendly_name = excluded.friendly_name,
                enabled = excluded.enabled,
                connected = excluded.connected,
                moonraker_enabled = excluded.moonraker_enabled,
                updated_at = excluded.updated_at,
                record_json = excluded.record_json",
            params![
                record.uid,
                record.device_path,
                record.hardware_name,
                record.friendly_name,
                record.enabled,
                record.connected,
                record.moonraker_enabled,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                json,
            ],
        )?;
        Ok(())
    }
}
