//! Part of [spbridge](https://crates.io/crates/spbridge), a bridge that publishes structured
//! industrial asset data as Sparkplug B.
//!
//! This library provides the durable state a Sparkplug publisher needs to survive a restart:
//!
//! - [AliasRegistry]: stable metric aliases per `(device, path)`.
//! - [BirthCache]: the last NBIRTH and DBIRTH payloads, for re-announcement without a source re-query.
//! - [DedupStore]: value hashes per topic, so unchanged values are not published twice.
//!
//! Each store is a single SQLite file fronted by an in-memory mirror. Reads are served from memory.
//! Writes go to both; a failed write leaves the mirror valid and is reported to the caller.

mod alias;
mod birth;
mod dedup;
mod error;
mod sqlite;

pub use alias::{AliasRegistry, AliasRegistryConfig};
pub use birth::{BirthCache, BirthCacheConfig, CachedBirth};
pub use dedup::{DedupStore, DedupStoreConfig};
pub use error::StoreError;
pub use sqlite::{JournalMode, SqliteOptions, SyncMode};
