use std::path::PathBuf;

use spbridge_types::{Metric, Value, ValueType};
use tempfile::TempDir;

pub struct StoreDir {
    dir: TempDir,
}

impl StoreDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Runs raw SQL against a store file, used to lay down older schemas.
    pub fn seed(&self, name: &str, sql: &str) {
        let conn = rusqlite::Connection::open(self.file(name)).unwrap();
        conn.execute_batch(sql).unwrap();
    }
}

pub fn float_metric(path: &str, value: f64) -> Metric {
    Metric::new(path, ValueType::Double, Some(Value::Float(value)))
}
