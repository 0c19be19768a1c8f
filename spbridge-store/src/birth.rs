use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::{debug, error};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::{
    sqlite::{ensure_column, lock, open_connection, unix_millis},
    SqliteOptions, StoreError,
};

const NODE_BIRTH_KEY: &str = "nbirth";
const DEVICE_BIRTH_PREFIX: &str = "dbirth:";

fn device_key(device_id: &str) -> String {
    format!("{DEVICE_BIRTH_PREFIX}{device_id}")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BirthCacheConfig {
    pub path: PathBuf,
    #[serde(default, flatten)]
    pub sqlite: SqliteOptions,
}

impl BirthCacheConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            sqlite: SqliteOptions::default(),
        }
    }
}

/// A cached birth message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBirth {
    pub topic: String,
    /// Encoded Sparkplug payload.
    pub payload: Vec<u8>,
    /// Unix time in milliseconds the entry was written.
    pub stored_at: i64,
}

struct Cache {
    connection: Connection,
    entries: HashMap<String, CachedBirth>,
}

impl Cache {
    fn store(&mut self, key: String, topic: &str, payload: &[u8]) -> Result<(), StoreError> {
        let birth = CachedBirth {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            stored_at: unix_millis(),
        };
        let result = self.connection.execute(
            "INSERT INTO birth_cache (key, topic, payload, stored_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(key) DO UPDATE SET topic = excluded.topic, payload = excluded.payload, \
             stored_at = excluded.stored_at",
            params![key, birth.topic, birth.payload, birth.stored_at],
        );
        self.entries.insert(key.clone(), birth);
        result.map(|_| ()).map_err(|e| {
            error!("Failed to persist birth {key}: {e}");
            StoreError::from(e)
        })
    }
}

/// Last-write-wins cache of the most recent NBIRTH and of every device's most recent DBIRTH.
///
/// Entries are superseded, never aged out. Size is bounded by the number of devices.
#[derive(Clone)]
pub struct BirthCache {
    inner: Arc<Mutex<Cache>>,
}

impl BirthCache {
    pub fn new(config: BirthCacheConfig) -> Result<Self, StoreError> {
        let mut connection = open_connection(&config.path, &config.sqlite)?;
        initialize_schema(&mut connection)?;

        let mut entries = HashMap::new();
        {
            let mut stmt =
                connection.prepare("SELECT key, topic, payload, stored_at FROM birth_cache")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    CachedBirth {
                        topic: row.get(1)?,
                        payload: row.get(2)?,
                        stored_at: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (key, birth) = row?;
                entries.insert(key, birth);
            }
        }
        debug!(
            "Loaded {} cached births from {}",
            entries.len(),
            config.path.display()
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(Cache {
                connection,
                entries,
            })),
        })
    }

    /// Cache the node birth. The in-memory copy is updated even when persisting fails.
    pub fn store_node_birth(&self, topic: &str, payload: &[u8]) -> Result<(), StoreError> {
        lock(&self.inner)?.store(NODE_BIRTH_KEY.to_string(), topic, payload)
    }

    /// Cache a device birth. The in-memory copy is updated even when persisting fails.
    pub fn store_device_birth(
        &self,
        device_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        lock(&self.inner)?.store(device_key(device_id), topic, payload)
    }

    pub fn get_node_birth(&self) -> Result<Option<CachedBirth>, StoreError> {
        Ok(lock(&self.inner)?.entries.get(NODE_BIRTH_KEY).cloned())
    }

    pub fn get_device_birth(&self, device_id: &str) -> Result<Option<CachedBirth>, StoreError> {
        Ok(lock(&self.inner)?
            .entries
            .get(&device_key(device_id))
            .cloned())
    }

    /// Ids of every device with a cached birth, sorted.
    pub fn list_device_ids(&self) -> Result<Vec<String>, StoreError> {
        let cache = lock(&self.inner)?;
        let mut ids: Vec<String> = cache
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(DEVICE_BIRTH_PREFIX))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Remove a device's cached birth. Returns true if one existed.
    pub fn remove_device_birth(&self, device_id: &str) -> Result<bool, StoreError> {
        let mut cache = lock(&self.inner)?;
        let key = device_key(device_id);
        cache
            .connection
            .execute("DELETE FROM birth_cache WHERE key = ?1", params![key])?;
        Ok(cache.entries.remove(&key).is_some())
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS birth_cache (
            key TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            payload BLOB NOT NULL,
            stored_at INTEGER NOT NULL DEFAULT 0
        );",
    )?;
    if ensure_column(&tx, "birth_cache", "stored_at", "INTEGER NOT NULL DEFAULT 0")? {
        tx.execute("UPDATE birth_cache SET stored_at = ?1", params![unix_millis()])?;
    }
    tx.commit()?;
    Ok(())
}
