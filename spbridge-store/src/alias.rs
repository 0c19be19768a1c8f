use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::{
    sqlite::{ensure_column, lock, open_connection, unix_millis},
    SqliteOptions, StoreError,
};

const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Aliases handed out start at this value.
const FIRST_ALIAS: u64 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct AliasRegistryConfig {
    pub path: PathBuf,
    /// Number of aliases kept before the least recently accessed ones are evicted. Zero disables eviction.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default, flatten)]
    pub sqlite: SqliteOptions,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl AliasRegistryConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            sqlite: SqliteOptions::default(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

fn sql_int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Invalid(format!("alias {value} out of range")))
}

/// `(device_id, path)`
type AliasKey = (String, String);

struct AliasEntry {
    alias: u64,
    last_accessed: i64,
    /// Orders accesses that land in the same millisecond.
    access_tick: u64,
}

struct Registry {
    connection: Connection,
    entries: HashMap<AliasKey, AliasEntry>,
    /// Entries whose last write failed.
    dirty: HashSet<AliasKey>,
    next_alias: u64,
    tick: u64,
    max_entries: usize,
}

impl Registry {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn persist(&mut self, key: &AliasKey) -> Result<(), StoreError> {
        let Some(entry) = self.entries.get(key) else {
            self.dirty.remove(key);
            return Ok(());
        };
        let alias = sql_int(entry.alias)?;
        let last_accessed = entry.last_accessed;
        let next_alias = sql_int(self.next_alias)?;
        let tx = self.connection.transaction()?;
        tx.execute(
            "INSERT INTO aliases (device_id, path, alias, last_accessed) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(device_id, path) DO UPDATE SET alias = excluded.alias, \
             last_accessed = excluded.last_accessed",
            params![key.0, key.1, alias, last_accessed],
        )?;
        tx.execute(
            "INSERT INTO alias_meta (id, next_alias) VALUES (1, ?1) \
             ON CONFLICT(id) DO UPDATE SET next_alias = MAX(next_alias, excluded.next_alias)",
            params![next_alias],
        )?;
        tx.commit()?;
        self.dirty.remove(key);
        Ok(())
    }

    fn touch(&mut self, key: &AliasKey, now: i64) {
        let result = self.connection.execute(
            "UPDATE aliases SET last_accessed = ?1 WHERE device_id = ?2 AND path = ?3",
            params![now, key.0, key.1],
        );
        if let Err(e) = result {
            warn!(
                "Failed to record access of alias for {}/{}: {e}",
                key.0, key.1
            );
            self.dirty.insert(key.clone());
        }
    }

    fn evict_if_needed(&mut self) {
        if self.max_entries == 0 || self.entries.len() <= self.max_entries {
            return;
        }
        let count = self.entries.len().div_ceil(10).max(1);
        let mut by_access: Vec<(&AliasKey, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key, entry.access_tick))
            .collect();
        by_access.sort_by_key(|(_, tick)| *tick);
        let victims: Vec<AliasKey> = by_access
            .into_iter()
            .take(count)
            .map(|(key, _)| key.clone())
            .collect();

        let result = (|| -> Result<(), StoreError> {
            let tx = self.connection.transaction()?;
            for (device_id, path) in &victims {
                tx.execute(
                    "DELETE FROM aliases WHERE device_id = ?1 AND path = ?2",
                    params![device_id, path],
                )?;
            }
            tx.commit()?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                for key in &victims {
                    self.entries.remove(key);
                    self.dirty.remove(key);
                }
                debug!(
                    "Evicted {} least recently used aliases, {} remain",
                    victims.len(),
                    self.entries.len()
                );
            }
            Err(e) => error!("Alias eviction failed: {e}"),
        }
    }
}

/// A durable mapping from `(device_id, metric path)` to a Sparkplug metric alias.
///
/// Aliases are allocated from a persisted high-water mark, so an alias is never reused for a
/// different metric, including across restarts and after eviction.
#[derive(Clone)]
pub struct AliasRegistry {
    config: AliasRegistryConfig,
    inner: Arc<Mutex<Registry>>,
}

impl AliasRegistry {
    /// Open the registry, creating or migrating the database as needed.
    pub fn new(config: AliasRegistryConfig) -> Result<Self, StoreError> {
        let mut connection = open_connection(&config.path, &config.sqlite)?;
        initialize_schema(&mut connection)?;

        let mut entries = HashMap::new();
        let mut tick = 0;
        let mut max_alias = None;
        {
            let mut stmt = connection.prepare(
                "SELECT device_id, path, alias, last_accessed FROM aliases \
                 ORDER BY last_accessed, rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (device_id, path, alias, last_accessed) = row?;
                let alias = u64::try_from(alias).map_err(|_| {
                    StoreError::Corrupt(format!("negative alias for {device_id}/{path}"))
                })?;
                tick += 1;
                max_alias = max_alias.max(Some(alias));
                entries.insert(
                    (device_id, path),
                    AliasEntry {
                        alias,
                        last_accessed,
                        access_tick: tick,
                    },
                );
            }
        }
        let persisted_next: Option<i64> = connection
            .query_row("SELECT next_alias FROM alias_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        let next_alias = persisted_next
            .and_then(|next| u64::try_from(next).ok())
            .unwrap_or(FIRST_ALIAS)
            .max(max_alias.map_or(FIRST_ALIAS, |m| m + 1))
            .max(FIRST_ALIAS);

        debug!(
            "Loaded {} aliases from {}, next alias {next_alias}",
            entries.len(),
            config.path.display()
        );
        let registry = Registry {
            connection,
            entries,
            dirty: HashSet::new(),
            next_alias,
            tick,
            max_entries: config.max_entries,
        };
        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(registry)),
        })
    }

    pub fn config(&self) -> &AliasRegistryConfig {
        &self.config
    }

    /// Return the alias for `path` on `device_id`, allocating and persisting a new one if needed.
    ///
    /// Every call counts as an access for eviction purposes. If persisting a new alias fails the
    /// alias is kept in memory, an error is returned, and the write is retried on the next call for
    /// the same key.
    pub fn get_or_create(&self, path: &str, device_id: &str) -> Result<u64, StoreError> {
        let mut registry = lock(&self.inner)?;
        let now = unix_millis();
        let tick = registry.next_tick();
        let key = (device_id.to_string(), path.to_string());

        let existing = registry.entries.get_mut(&key).map(|entry| {
            entry.last_accessed = now;
            entry.access_tick = tick;
            entry.alias
        });
        if let Some(alias) = existing {
            if registry.dirty.contains(&key) {
                registry.persist(&key)?;
            } else {
                registry.touch(&key, now);
            }
            return Ok(alias);
        }

        let alias = registry.next_alias;
        registry.next_alias += 1;
        registry.entries.insert(
            key.clone(),
            AliasEntry {
                alias,
                last_accessed: now,
                access_tick: tick,
            },
        );
        registry.dirty.insert(key.clone());
        if let Err(e) = registry.persist(&key) {
            error!("Failed to persist alias {alias} for {device_id}/{path}: {e}");
            return Err(e);
        }
        registry.evict_if_needed();
        Ok(alias)
    }

    /// Look up an alias without allocating or counting an access.
    pub fn get(&self, path: &str, device_id: &str) -> Result<Option<u64>, StoreError> {
        let registry = lock(&self.inner)?;
        Ok(registry
            .entries
            .get(&(device_id.to_string(), path.to_string()))
            .map(|entry| entry.alias))
    }

    /// Remove every alias of a device. Returns the number removed.
    pub fn clear_device(&self, device_id: &str) -> Result<usize, StoreError> {
        let mut registry = lock(&self.inner)?;
        registry
            .connection
            .execute("DELETE FROM aliases WHERE device_id = ?1", params![device_id])?;
        let before = registry.entries.len();
        registry.entries.retain(|(d, _), _| d != device_id);
        registry.dirty.retain(|(d, _)| d != device_id);
        let removed = before - registry.entries.len();
        info!("Cleared {removed} aliases for device {device_id}");
        Ok(removed)
    }

    /// Remove every alias. The allocation high-water mark is kept.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut registry = lock(&self.inner)?;
        registry.connection.execute("DELETE FROM aliases", [])?;
        registry.entries.clear();
        registry.dirty.clear();
        info!("Cleared all aliases");
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(lock(&self.inner)?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS aliases (
            device_id TEXT NOT NULL,
            path TEXT NOT NULL,
            alias INTEGER NOT NULL UNIQUE,
            last_accessed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (device_id, path)
        );
        CREATE TABLE IF NOT EXISTS alias_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            next_alias INTEGER NOT NULL
        );",
    )?;
    rebuild_path_keyed_table(&tx)?;
    if ensure_column(&tx, "aliases", "last_accessed", "INTEGER NOT NULL DEFAULT 0")? {
        tx.execute(
            "UPDATE aliases SET last_accessed = ?1",
            params![unix_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Older databases key aliases on `path` alone. Rebuild those into the `(device_id, path)` layout,
/// keeping every alias and its device.
fn rebuild_path_keyed_table(tx: &rusqlite::Transaction<'_>) -> Result<(), StoreError> {
    let columns = {
        let mut stmt = tx.prepare("PRAGMA table_info(aliases)")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let mut primary_key: Vec<(i64, &str)> = columns
        .iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(name, pk)| (*pk, name.as_str()))
        .collect();
    primary_key.sort();
    let primary_key: Vec<&str> = primary_key.into_iter().map(|(_, name)| name).collect();
    if primary_key == ["device_id", "path"] {
        return Ok(());
    }

    let has_column = |name: &str| columns.iter().any(|(c, _)| c == name);
    let device_id = if has_column("device_id") {
        "device_id"
    } else {
        "''"
    };
    let last_accessed = if has_column("last_accessed") {
        "last_accessed".to_string()
    } else {
        unix_millis().to_string()
    };
    tx.execute_batch(&format!(
        "ALTER TABLE aliases RENAME TO aliases_legacy;
        CREATE TABLE aliases (
            device_id TEXT NOT NULL,
            path TEXT NOT NULL,
            alias INTEGER NOT NULL UNIQUE,
            last_accessed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (device_id, path)
        );
        INSERT INTO aliases (device_id, path, alias, last_accessed)
            SELECT {device_id}, path, alias, {last_accessed} FROM aliases_legacy;
        DROP TABLE aliases_legacy;"
    ))?;
    info!(
        "Migrated table aliases: rekeyed from ({}) to (device_id, path)",
        primary_key.join(", ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir, max_entries: usize) -> AliasRegistry {
        AliasRegistry::new(
            AliasRegistryConfig::new(dir.path().join("aliases.db")).with_max_entries(max_entries),
        )
        .unwrap()
    }

    #[test]
    fn aliases_are_stable_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open(&dir, 0);
        let a = registry.get_or_create("temp", "pump-1").unwrap();
        let b = registry.get_or_create("pressure", "pump-1").unwrap();
        let c = registry.get_or_create("temp", "pump-2").unwrap();
        assert_eq!(a, FIRST_ALIAS);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(registry.get_or_create("temp", "pump-1").unwrap(), a);
        assert_eq!(registry.get("temp", "pump-1").unwrap(), Some(a));
        assert_eq!(registry.get("flow", "pump-1").unwrap(), None);
        assert_eq!(registry.len().unwrap(), 3);
    }

    #[test]
    fn eviction_removes_least_recently_accessed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open(&dir, 10);
        for i in 0..10 {
            registry.get_or_create(&format!("m{i}"), "dev").unwrap();
        }
        /* m0 becomes the most recently used */
        registry.get_or_create("m0", "dev").unwrap();
        registry.get_or_create("m10", "dev").unwrap();

        /* 11 entries over a cap of 10: the two least recently used go */
        assert_eq!(registry.len().unwrap(), 9);
        assert!(registry.get("m0", "dev").unwrap().is_some());
        assert!(registry.get("m1", "dev").unwrap().is_none());
        assert!(registry.get("m2", "dev").unwrap().is_none());
        assert!(registry.get("m3", "dev").unwrap().is_some());
        assert!(registry.get("m10", "dev").unwrap().is_some());
    }

    #[test]
    fn evicted_aliases_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open(&dir, 2);
        let a = registry.get_or_create("a", "dev").unwrap();
        registry.get_or_create("b", "dev").unwrap();
        registry.get_or_create("c", "dev").unwrap();
        assert!(registry.get("a", "dev").unwrap().is_none());
        let a_again = registry.get_or_create("a", "dev").unwrap();
        assert_ne!(a, a_again);
    }

    #[test]
    fn clear_device_keeps_other_devices() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open(&dir, 0);
        registry.get_or_create("a", "dev-1").unwrap();
        registry.get_or_create("b", "dev-1").unwrap();
        let other = registry.get_or_create("a", "dev-2").unwrap();
        assert_eq!(registry.clear_device("dev-1").unwrap(), 2);
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(registry.get("a", "dev-2").unwrap(), Some(other));
    }

    #[test]
    fn clear_all_keeps_high_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open(&dir, 0);
        let a = registry.get_or_create("a", "dev").unwrap();
        registry.clear_all().unwrap();
        assert!(registry.is_empty().unwrap());
        assert!(registry.get_or_create("a", "dev").unwrap() > a);
    }
}
