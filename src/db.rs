//! SQLite storage for app properties and config
//!
//! This module backs the property store, the app config collaborator and the
//! app directory with a single durable database that survives restarts.

use crate::error::StoreError;
use crate::store::{AppPlatform, ConfigStore, PropertyStore};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Current schema version for migrations
const SCHEMA_VERSION: i32 = 2;

/// Config key that turns off virtual host routing for an app
const NO_VHOST_KEY: &str = "NO_VHOST";

const KIND_SCALAR: &str = "scalar";
const KIND_LIST: &str = "list";

/// Database connection wrapper with thread-safe access
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open database")?;

        // WAL lets report triggers read while a reconcile is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            info!("Running migrations from v{} to v{}", current_version, SCHEMA_VERSION);

            if current_version < 1 {
                Self::migrate_v1(&conn)?;
            }

            if current_version < 2 {
                Self::migrate_v2(&conn)?;
            }
        }

        Ok(())
    }

    /// Migration v1: apps and their environment config
    fn migrate_v1(conn: &Connection) -> Result<()> {
        debug!("Applying migration v1: apps and config");

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS apps (
                name TEXT PRIMARY KEY,
                ssl_enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS app_config (
                app_name TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (app_name, key)
            );

            CREATE INDEX IF NOT EXISTS idx_app_config_app ON app_config(app_name);

            INSERT INTO schema_migrations (version) VALUES (1);
        "#)?;

        Ok(())
    }

    /// Migration v2: plugin properties
    fn migrate_v2(conn: &Connection) -> Result<()> {
        debug!("Applying migration v2: plugin properties");

        conn.execute_batch(r#"
            -- List values are stored as a JSON array in `value`
            CREATE TABLE IF NOT EXISTS properties (
                plugin TEXT NOT NULL,
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'scalar',
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (plugin, scope, key)
            );

            CREATE INDEX IF NOT EXISTS idx_properties_scope ON properties(plugin, scope);

            INSERT INTO schema_migrations (version) VALUES (2);
        "#)?;

        Ok(())
    }

    // ==================== App Operations ====================

    /// Register an app
    pub fn create_app(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO apps (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    /// Get an app by name
    pub fn get_app(&self, name: &str) -> Result<Option<AppRecord>, StoreError> {
        let conn = self.conn.lock();
        let app = conn
            .query_row(
                "SELECT name, ssl_enabled, created_at FROM apps WHERE name = ?1",
                params![name],
                |row| {
                    Ok(AppRecord {
                        name: row.get(0)?,
                        ssl_enabled: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(app)
    }

    /// Record whether a TLS certificate is installed for an app
    pub fn set_certificate(&self, name: &str, installed: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE apps SET ssl_enabled = ?1 WHERE name = ?2",
            params![installed, name],
        )?;
        Ok(())
    }

    // ==================== Config Operations ====================

    /// Set a config value
    pub fn set_config(&self, app_name: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO app_config (app_name, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(app_name, key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            params![app_name, key, value],
        )?;
        Ok(())
    }

    /// Get a config value
    pub fn get_config(&self, app_name: &str, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM app_config WHERE app_name = ?1 AND key = ?2",
                params![app_name, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_property_row(
        &self,
        plugin: &str,
        scope: &str,
        key: &str,
    ) -> Result<Option<(String, String)>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT kind, value FROM properties WHERE plugin = ?1 AND scope = ?2 AND key = ?3",
                params![plugin, scope, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

fn decode_list(key: &str, value: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl PropertyStore for Database {
    fn get(&self, plugin: &str, scope: &str, key: &str) -> Result<String, StoreError> {
        match self.get_property_row(plugin, scope, key)? {
            Some((kind, value)) if kind == KIND_LIST => Ok(decode_list(key, &value)?.join("\n")),
            Some((_, value)) => Ok(value),
            None => Ok(String::new()),
        }
    }

    fn exists(&self, plugin: &str, scope: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_property_row(plugin, scope, key)?.is_some())
    }

    fn write(&self, plugin: &str, scope: &str, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(plugin, scope, key, "Writing property");
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO properties (plugin, scope, key, kind, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(plugin, scope, key) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                updated_at = datetime('now')",
            params![plugin, scope, key, KIND_SCALAR, value],
        )?;
        Ok(())
    }

    fn delete(&self, plugin: &str, scope: &str, key: &str) -> Result<(), StoreError> {
        debug!(plugin, scope, key, "Deleting property");
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM properties WHERE plugin = ?1 AND scope = ?2 AND key = ?3",
            params![plugin, scope, key],
        )?;
        Ok(())
    }

    fn read_list(&self, plugin: &str, scope: &str, key: &str) -> Result<Vec<String>, StoreError> {
        match self.get_property_row(plugin, scope, key)? {
            Some((kind, value)) if kind == KIND_LIST => decode_list(key, &value),
            Some((_, value)) => Ok(value
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn write_list(
        &self,
        plugin: &str,
        scope: &str,
        key: &str,
        values: &[String],
    ) -> Result<(), StoreError> {
        debug!(plugin, scope, key, count = values.len(), "Writing list property");
        let encoded = serde_json::to_string(values)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO properties (plugin, scope, key, kind, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(plugin, scope, key) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                updated_at = datetime('now')",
            params![plugin, scope, key, KIND_LIST, encoded],
        )?;
        Ok(())
    }

    fn clone_namespace(
        &self,
        plugin: &str,
        from_scope: &str,
        to_scope: &str,
    ) -> Result<(), StoreError> {
        debug!(plugin, from_scope, to_scope, "Cloning property namespace");
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM properties WHERE plugin = ?1 AND scope = ?2",
            params![plugin, to_scope],
        )?;
        tx.execute(
            "INSERT INTO properties (plugin, scope, key, kind, value, updated_at)
             SELECT plugin, ?3, key, kind, value, datetime('now')
             FROM properties WHERE plugin = ?1 AND scope = ?2",
            params![plugin, from_scope, to_scope],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn destroy(&self, plugin: &str, scope: &str) -> Result<(), StoreError> {
        debug!(plugin, scope, "Destroying property namespace");
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM properties WHERE plugin = ?1 AND scope = ?2",
            params![plugin, scope],
        )?;
        Ok(())
    }
}

impl ConfigStore for Database {
    fn get_with_default(&self, app: &str, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self
            .get_config(app, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn unset_many(&self, app: &str, keys: &[&str], restart: bool) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for key in keys {
            tx.execute(
                "DELETE FROM app_config WHERE app_name = ?1 AND key = ?2",
                params![app, key],
            )?;
        }
        tx.commit()?;

        info!(app, keys = ?keys, restart, "Unset config keys");
        Ok(())
    }
}

impl AppPlatform for Database {
    fn list_apps(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM apps ORDER BY name")?;
        let apps = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(apps)
    }

    fn is_vhost_enabled(&self, app: &str) -> Result<bool, StoreError> {
        Ok(self.get_config(app, NO_VHOST_KEY)?.as_deref() != Some("1"))
    }

    fn has_certificate(&self, app: &str) -> Result<bool, StoreError> {
        Ok(self.get_app(app)?.map(|a| a.ssl_enabled).unwrap_or(false))
    }
}

// ==================== Record Types ====================

/// App record from database
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub name: String,
    pub ssl_enabled: bool,
    pub created_at: String,
}
