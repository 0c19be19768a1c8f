use std::{
    collections::{HashMap, HashSet},
    fmt::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{debug, error};
use rusqlite::{params, Connection};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use spbridge_types::{utils::duration_ms, Metric};

use crate::{
    sqlite::{ensure_column, lock, open_connection, unix_millis},
    SqliteOptions, StoreError,
};

const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_MAX_ENTRIES: usize = 100_000;
const DEFAULT_CLEANUP_INTERVAL: u64 = 1_000;

#[derive(Debug, Clone, Deserialize)]
pub struct DedupStoreConfig {
    pub path: PathBuf,
    /// Entries older than this, measured from when the topic was first recorded, are purged.
    /// Zero disables expiry.
    #[serde(default = "default_ttl", with = "duration_ms")]
    pub ttl: Duration,
    /// Zero disables the capacity bound.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Number of recorded entries between opportunistic cleanup passes. Zero disables them.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    #[serde(default, flatten)]
    pub sqlite: SqliteOptions,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL
}

impl DedupStoreConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            sqlite: SqliteOptions::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_cleanup_interval(mut self, cleanup_interval: u64) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }
}

/// Hex encoded SHA-256 of the metric value. Timestamps and metadata do not contribute.
fn value_hash(metric: &Metric) -> String {
    let bytes = metric
        .value
        .as_ref()
        .map(|v| v.canonical_bytes())
        .unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

struct DedupEntry {
    hash: String,
    created_at: i64,
    /// Insertion order, breaks ties between entries created in the same millisecond.
    order: u64,
}

struct Dedup {
    connection: Connection,
    entries: HashMap<String, DedupEntry>,
    next_order: u64,
    ops_since_cleanup: u64,
    ttl_ms: i64,
    max_entries: usize,
    cleanup_interval: u64,
}

impl Dedup {
    fn is_changed(&self, topic: &str, hash: &str) -> bool {
        self.entries
            .get(topic)
            .map_or(true, |entry| entry.hash != hash)
    }

    fn record(&mut self, records: Vec<(&str, String)>, now: i64) -> Result<(), StoreError> {
        for (topic, hash) in &records {
            match self.entries.get_mut(*topic) {
                Some(entry) => entry.hash.clone_from(hash),
                None => {
                    self.next_order += 1;
                    self.entries.insert(
                        topic.to_string(),
                        DedupEntry {
                            hash: hash.clone(),
                            created_at: now,
                            order: self.next_order,
                        },
                    );
                }
            }
        }

        let result = (|| -> Result<(), StoreError> {
            let tx = self.connection.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO dedup (topic, hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(topic) DO UPDATE SET hash = excluded.hash, \
                     updated_at = excluded.updated_at",
                )?;
                for (topic, hash) in &records {
                    stmt.execute(params![topic, hash, now, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })();
        if let Err(e) = &result {
            error!("Failed to persist {} dedup entries: {e}", records.len());
        }

        self.ops_since_cleanup += records.len() as u64;
        if self.cleanup_interval > 0 && self.ops_since_cleanup >= self.cleanup_interval {
            if let Err(e) = self.cleanup(now) {
                error!("Dedup cleanup failed: {e}");
            }
        }
        result
    }

    fn cleanup(&mut self, now: i64) -> Result<usize, StoreError> {
        self.ops_since_cleanup = 0;

        let mut victims: HashSet<String> = HashSet::new();
        if self.ttl_ms > 0 {
            let cutoff = now.saturating_sub(self.ttl_ms);
            victims.extend(
                self.entries
                    .iter()
                    .filter(|(_, entry)| entry.created_at < cutoff)
                    .map(|(topic, _)| topic.clone()),
            );
        }
        let remaining = self.entries.len() - victims.len();
        if self.max_entries > 0 && remaining > self.max_entries {
            let mut survivors: Vec<(&String, &DedupEntry)> = self
                .entries
                .iter()
                .filter(|(topic, _)| !victims.contains(topic.as_str()))
                .collect();
            survivors.sort_by_key(|(_, entry)| (entry.created_at, entry.order));
            let excess = remaining - self.max_entries;
            let oldest: Vec<String> = survivors
                .into_iter()
                .take(excess)
                .map(|(topic, _)| topic.clone())
                .collect();
            victims.extend(oldest);
        }
        if victims.is_empty() {
            return Ok(0);
        }

        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM dedup WHERE topic = ?1")?;
            for topic in &victims {
                stmt.execute(params![topic])?;
            }
        }
        tx.commit()?;
        for topic in &victims {
            self.entries.remove(topic);
        }
        debug!(
            "Dedup cleanup removed {} entries, {} remain",
            victims.len(),
            self.entries.len()
        );
        Ok(victims.len())
    }
}

/// Remembers a hash of the last value published per topic.
///
/// Entries expire a fixed time after the topic was first recorded and the store is bounded in
/// size, evicting the oldest created entries first. Both checks run every `cleanup_interval`
/// recorded entries and can be forced with [DedupStore::force_cleanup].
#[derive(Clone)]
pub struct DedupStore {
    inner: Arc<Mutex<Dedup>>,
}

impl DedupStore {
    pub fn new(config: DedupStoreConfig) -> Result<Self, StoreError> {
        let mut connection = open_connection(&config.path, &config.sqlite)?;
        initialize_schema(&mut connection)?;

        let mut entries = HashMap::new();
        let mut order = 0;
        {
            let mut stmt = connection
                .prepare("SELECT topic, hash, created_at FROM dedup ORDER BY created_at, rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (topic, hash, created_at) = row?;
                order += 1;
                entries.insert(
                    topic,
                    DedupEntry {
                        hash,
                        created_at,
                        order,
                    },
                );
            }
        }
        debug!(
            "Loaded {} dedup entries from {}",
            entries.len(),
            config.path.display()
        );

        let ttl_ms = i64::try_from(config.ttl.as_millis())
            .map_err(|_| StoreError::Invalid("dedup ttl too large".to_string()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Dedup {
                connection,
                entries,
                next_order: order,
                ops_since_cleanup: 0,
                ttl_ms,
                max_entries: config.max_entries,
                cleanup_interval: config.cleanup_interval,
            })),
        })
    }

    /// True if `metric`'s value differs from the last value recorded for `topic`, or if nothing
    /// was recorded.
    pub fn has_changed(&self, topic: &str, metric: &Metric) -> Result<bool, StoreError> {
        let hash = value_hash(metric);
        Ok(lock(&self.inner)?.is_changed(topic, &hash))
    }

    /// Record `metric` as published on `topic`. The topic keeps its original creation time.
    pub fn record_published(&self, topic: &str, metric: &Metric) -> Result<(), StoreError> {
        let hash = value_hash(metric);
        lock(&self.inner)?.record(vec![(topic, hash)], unix_millis())
    }

    /// The subset of `entries` whose values changed.
    pub fn filter_changed<'a, I>(&self, entries: I) -> Result<Vec<(&'a str, &'a Metric)>, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a Metric)>,
    {
        let dedup = lock(&self.inner)?;
        Ok(entries
            .into_iter()
            .filter(|(topic, metric)| dedup.is_changed(topic, &value_hash(metric)))
            .collect())
    }

    /// Record several entries in one transaction.
    pub fn record_published_batch<'a, I>(&self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a Metric)>,
    {
        let records: Vec<(&str, String)> = entries
            .into_iter()
            .map(|(topic, metric)| (topic, value_hash(metric)))
            .collect();
        if records.is_empty() {
            return Ok(());
        }
        lock(&self.inner)?.record(records, unix_millis())
    }

    /// Run the expiry and capacity checks now. Returns the number of entries removed.
    pub fn force_cleanup(&self) -> Result<usize, StoreError> {
        lock(&self.inner)?.cleanup(unix_millis())
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
        "CREATE TABLE IF NOT EXISTS dedup (
            topic TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );",
    )?;
    if ensure_column(&tx, "dedup", "created_at", "INTEGER NOT NULL DEFAULT 0")? {
        tx.execute_batch("UPDATE dedup SET created_at = updated_at;")?;
    }
    tx.commit()?;
    Ok(())
}
