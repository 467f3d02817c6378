// Tollgate — Key/Value Storage
//
// The durable store the lifecycle engine writes through. Keys are plain
// strings (`config/…`, `role/…`, `token/…`); values are opaque bytes.
// Consistency is per key only; nothing here spans multiple keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::db::Database;
use super::StoreError;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the host's durable key/value store.
pub trait Storage: Send + Sync {
    /// Fetch the value stored at `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or overwrite the value at `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Returns true if it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// List the keys under `prefix`, with the prefix stripped, in key order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Read and decode a JSON value stored at `key`.
pub(crate) fn read_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match storage.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode `value` as JSON and store it at `key`.
pub(crate) fn write_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;
    storage.put(key, &bytes)
}

// ─── In-memory Implementation ────────────────────────────────────────────────

/// Volatile storage for tests and throwaway daemons. Clones share data.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect())
    }
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

/// Durable storage backed by the `kv` table.
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .db
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.db.conn();
        // substr() instead of LIKE: prefixes may contain `%` or `_`.
        let mut stmt = conn.prepare(
            "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            let key = row?;
            keys.push(key[prefix.len()..].to_string());
        }
        Ok(keys)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(storage: &dyn Storage) {
        assert!(storage.get("role/o1:r1").unwrap().is_none());

        storage.put("role/o1:r1", b"one").unwrap();
        storage.put("role/o1:r2", b"two").unwrap();
        storage.put("token/abc", b"three").unwrap();
        assert_eq!(storage.get("role/o1:r1").unwrap().unwrap(), b"one");

        storage.put("role/o1:r1", b"uno").unwrap();
        assert_eq!(storage.get("role/o1:r1").unwrap().unwrap(), b"uno");

        assert_eq!(storage.list("role/").unwrap(), vec!["o1:r1", "o1:r2"]);
        assert_eq!(storage.list("token/").unwrap(), vec!["abc"]);
        assert!(storage.list("config/").unwrap().is_empty());

        assert!(storage.delete("role/o1:r1").unwrap());
        assert!(!storage.delete("role/o1:r1").unwrap());
        assert_eq!(storage.list("role/").unwrap(), vec!["o1:r2"]);
    }

    #[test]
    fn test_memory_storage_contract() {
        let storage = MemoryStorage::new();
        exercise(&storage);
        assert_eq!(storage.list("").unwrap().len(), 2);
    }

    #[test]
    fn test_sqlite_storage_contract() {
        let storage = SqliteStorage::new(Database::open_in_memory().unwrap());
        exercise(&storage);
    }

    #[test]
    fn test_sqlite_list_treats_wildcards_literally() {
        let storage = SqliteStorage::new(Database::open_in_memory().unwrap());
        storage.put("token/a", b"1").unwrap();
        storage.put("tokenXa", b"2").unwrap();
        storage.put("to%en/b", b"3").unwrap();

        assert_eq!(storage.list("token/").unwrap(), vec!["a"]);
        assert_eq!(storage.list("to%en/").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_memory_storage_clones_share_data() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.put("config/o1", b"{}").unwrap();
        assert!(b.get("config/o1").unwrap().is_some());
    }
}
