mod utils;

use std::time::Duration;

use spbridge_store::{
    AliasRegistry, AliasRegistryConfig, BirthCache, BirthCacheConfig, DedupStore,
    DedupStoreConfig,
};
use utils::{float_metric, StoreDir};

#[test]
fn aliases_survive_restart() {
    let dir = StoreDir::new();
    let config = AliasRegistryConfig::new(dir.file("aliases.db"));
    let paths = ["line/temp", "line/pressure", "line/speed"];

    let registry = AliasRegistry::new(config.clone()).unwrap();
    let before: Vec<u64> = paths
        .iter()
        .map(|p| registry.get_or_create(p, "press-1").unwrap())
        .collect();
    drop(registry);

    let registry = AliasRegistry::new(config).unwrap();
    let after: Vec<u64> = paths
        .iter()
        .map(|p| registry.get_or_create(p, "press-1").unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(registry.len().unwrap(), 3);

    /* allocation resumes after the persisted maximum */
    let next = registry.get_or_create("line/new", "press-1").unwrap();
    assert!(before.iter().all(|alias| next > *alias));
}

#[test]
fn alias_high_water_mark_survives_clear_and_restart() {
    let dir = StoreDir::new();
    let config = AliasRegistryConfig::new(dir.file("aliases.db"));
    let registry = AliasRegistry::new(config.clone()).unwrap();
    let first = registry.get_or_create("a", "dev").unwrap();
    registry.clear_all().unwrap();
    drop(registry);

    let registry = AliasRegistry::new(config).unwrap();
    assert!(registry.is_empty().unwrap());
    assert!(registry.get_or_create("b", "dev").unwrap() > first);
}

#[test]
fn alias_registry_migrates_layout_without_access_column() {
    let dir = StoreDir::new();
    dir.seed(
        "aliases.db",
        "CREATE TABLE aliases (
            device_id TEXT NOT NULL,
            path TEXT NOT NULL,
            alias INTEGER NOT NULL UNIQUE,
            PRIMARY KEY (device_id, path)
        );
        INSERT INTO aliases (device_id, path, alias) VALUES ('dev', 'a', 7), ('dev', 'b', 9);",
    );

    let registry = AliasRegistry::new(AliasRegistryConfig::new(dir.file("aliases.db"))).unwrap();
    assert_eq!(registry.get_or_create("a", "dev").unwrap(), 7);
    assert_eq!(registry.get_or_create("b", "dev").unwrap(), 9);
    assert_eq!(registry.get_or_create("c", "dev").unwrap(), 10);
}

#[test]
fn alias_registry_rekeys_path_only_layout() {
    let dir = StoreDir::new();
    dir.seed(
        "aliases.db",
        "CREATE TABLE aliases (
            path TEXT PRIMARY KEY,
            alias INTEGER NOT NULL UNIQUE,
            device_id TEXT NOT NULL
        );
        INSERT INTO aliases (path, alias, device_id) VALUES ('a', 7, 'dev'), ('b', 3, 'other');",
    );
    let config = AliasRegistryConfig::new(dir.file("aliases.db"));

    let registry = AliasRegistry::new(config.clone()).unwrap();
    assert_eq!(registry.get("a", "dev").unwrap(), Some(7));
    assert_eq!(registry.get("b", "other").unwrap(), Some(3));
    assert_eq!(registry.get_or_create("c", "dev").unwrap(), 8);
    /* the same path on another device is now a distinct alias */
    assert_eq!(registry.get_or_create("a", "other").unwrap(), 9);
    drop(registry);

    let registry = AliasRegistry::new(config).unwrap();
    assert_eq!(registry.len().unwrap(), 4);
    assert_eq!(registry.get_or_create("c", "dev").unwrap(), 8);
    assert_eq!(registry.get_or_create("a", "other").unwrap(), 9);
}

#[test]
fn birth_cache_survives_restart() {
    let dir = StoreDir::new();
    let config = BirthCacheConfig::new(dir.file("births.db"));
    let cache = BirthCache::new(config.clone()).unwrap();
    cache.store_node_birth("spBv1.0/g/NBIRTH/n", &[1, 2]).unwrap();
    cache
        .store_device_birth("pump", "spBv1.0/g/DBIRTH/n/pump", &[3, 4])
        .unwrap();
    drop(cache);

    let cache = BirthCache::new(config).unwrap();
    let node = cache.get_node_birth().unwrap().unwrap();
    assert_eq!(node.topic, "spBv1.0/g/NBIRTH/n");
    assert_eq!(node.payload, vec![1, 2]);
    let device = cache.get_device_birth("pump").unwrap().unwrap();
    assert_eq!(device.topic, "spBv1.0/g/DBIRTH/n/pump");
    assert_eq!(device.payload, vec![3, 4]);
    assert_eq!(cache.list_device_ids().unwrap(), vec!["pump"]);
}

#[test]
fn birth_cache_migrates_layout_without_stored_at() {
    let dir = StoreDir::new();
    dir.seed(
        "births.db",
        "CREATE TABLE birth_cache (key TEXT PRIMARY KEY, topic TEXT NOT NULL, payload BLOB NOT NULL);
        INSERT INTO birth_cache (key, topic, payload) VALUES ('dbirth:pump', 'spBv1.0/g/DBIRTH/n/pump', x'0102');",
    );
    let cache = BirthCache::new(BirthCacheConfig::new(dir.file("births.db"))).unwrap();
    let birth = cache.get_device_birth("pump").unwrap().unwrap();
    assert_eq!(birth.payload, vec![1, 2]);
    assert!(birth.stored_at > 0);
}

#[test]
fn unchanged_value_is_reported_once() {
    let dir = StoreDir::new();
    let store = DedupStore::new(DedupStoreConfig::new(dir.file("dedup.db"))).unwrap();
    let topic = "plant/line1/temp";

    let mut changed = 0;
    for _ in 0..2 {
        let metric = float_metric("temp", 21.5);
        if store.has_changed(topic, &metric).unwrap() {
            changed += 1;
            store.record_published(topic, &metric).unwrap();
        }
    }
    assert_eq!(changed, 1);
    assert!(store.has_changed(topic, &float_metric("temp", 22.0)).unwrap());
}

#[test]
fn dedup_batch_filters_and_records() {
    let dir = StoreDir::new();
    let config = DedupStoreConfig::new(dir.file("dedup.db"));
    let store = DedupStore::new(config.clone()).unwrap();
    store.record_published("a", &float_metric("a", 1.0)).unwrap();

    let entries = vec![
        ("a".to_string(), float_metric("a", 1.0)),
        ("b".to_string(), float_metric("b", 2.0)),
    ];
    let changed = store
        .filter_changed(entries.iter().map(|(t, m)| (t.as_str(), m)))
        .unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].0, "b");
    store.record_published_batch(changed).unwrap();
    drop(store);

    let store = DedupStore::new(config).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert!(!store.has_changed("b", &float_metric("b", 2.0)).unwrap());
}

#[test]
fn ttl_expires_entries() {
    let dir = StoreDir::new();
    let store = DedupStore::new(
        DedupStoreConfig::new(dir.file("dedup.db")).with_ttl(Duration::from_secs(1)),
    )
    .unwrap();
    store.record_published("a", &float_metric("a", 1.0)).unwrap();
    assert_eq!(store.len().unwrap(), 1);

    std::thread::sleep(Duration::from_millis(1100));
    assert_eq!(store.force_cleanup().unwrap(), 1);
    assert_eq!(store.len().unwrap(), 0);
}

#[test]
fn capacity_evicts_oldest_created() {
    let dir = StoreDir::new();
    let store = DedupStore::new(
        DedupStoreConfig::new(dir.file("dedup.db"))
            .with_max_entries(3)
            .with_cleanup_interval(0),
    )
    .unwrap();
    for topic in ["t0", "t1", "t2", "t3", "t4"] {
        store.record_published(topic, &float_metric(topic, 1.0)).unwrap();
    }
    /* updating t0 does not make it younger */
    store.record_published("t0", &float_metric("t0", 2.0)).unwrap();
    assert_eq!(store.len().unwrap(), 5);

    assert_eq!(store.force_cleanup().unwrap(), 2);
    assert_eq!(store.len().unwrap(), 3);
    assert!(store.has_changed("t0", &float_metric("t0", 2.0)).unwrap());
    assert!(store.has_changed("t1", &float_metric("t1", 1.0)).unwrap());
    for topic in ["t2", "t3", "t4"] {
        assert!(!store.has_changed(topic, &float_metric(topic, 1.0)).unwrap());
    }
}

#[test]
fn dedup_migrates_layout_without_created_at() {
    let dir = StoreDir::new();
    dir.seed(
        "dedup.db",
        "CREATE TABLE dedup (topic TEXT PRIMARY KEY, hash TEXT NOT NULL, updated_at INTEGER NOT NULL);
        INSERT INTO dedup (topic, hash, updated_at) VALUES ('old', 'abc', 1);",
    );
    let store = DedupStore::new(
        DedupStoreConfig::new(dir.file("dedup.db")).with_ttl(Duration::from_secs(60)),
    )
    .unwrap();
    assert_eq!(store.len().unwrap(), 1);
    /* created_at was backfilled from updated_at, so the entry is long expired */
    assert_eq!(store.force_cleanup().unwrap(), 1);
}
