//! SQLite cache backend

use super::backend::{BackendError, BackendResult, CacheBackend};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite backend configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("sheetcache");
        path.push("cache.db");

        Self {
            path,
            wal_mode: true,
        }
    }
}

/// SQLite-backed key-value store for cache entries
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create a cache database
    pub fn open(config: SqliteConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening cache database");

        let conn = Connection::open(&config.path)?;

        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: config.path,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                payload BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Storage("cache connection lock poisoned".to_string()))
    }
}

impl CacheBackend for SqliteBackend {
    fn read(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM entries WHERE key = ?",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> BackendResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (key, payload) VALUES (?, ?)",
            params![key, bytes],
        )?;
        Ok(())
    }

    fn list_keys(&self) -> BackendResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM entries WHERE key = ?", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, SqliteBackend) {
        let dir = TempDir::new().unwrap();
        let config = SqliteConfig {
            path: dir.path().join("cache.db"),
            ..Default::default()
        };
        let backend = SqliteBackend::open(config).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_backend_creation() {
        let (_dir, backend) = open_temp();
        assert!(backend.path().exists());
        assert!(backend.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_write_read_overwrite() {
        let (_dir, backend) = open_temp();

        backend.write("vip_my::vip", b"first").unwrap();
        backend.write("vip_my::vip", b"second").unwrap();

        assert_eq!(
            backend.read("vip_my::vip").unwrap(),
            Some(b"second".to_vec())
        );
        assert_eq!(backend.list_keys().unwrap(), vec!["vip_my::vip"]);
    }

    #[test]
    fn test_delete() {
        let (_dir, backend) = open_temp();

        backend.write("a", b"1").unwrap();
        backend.delete("a").unwrap();
        backend.delete("a").unwrap();

        assert!(backend.read("a").unwrap().is_none());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let backend = SqliteBackend::open(SqliteConfig {
                path: path.clone(),
                wal_mode: true,
            })
            .unwrap();
            backend.write("funnel_ph::funnel", b"payload").unwrap();
        }

        let reopened = SqliteBackend::open(SqliteConfig {
            path,
            wal_mode: true,
        })
        .unwrap();
        assert_eq!(
            reopened.read("funnel_ph::funnel").unwrap(),
            Some(b"payload".to_vec())
        );
    }
}
