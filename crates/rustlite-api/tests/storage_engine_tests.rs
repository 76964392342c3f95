use rustlite::{EngineConfig, Error, GcConfig, StorageEngine, SyncMode, WalConfig};
use std::time::Duration;
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> EngineConfig {
    let wal_dir = dir.join("wal");
    std::fs::create_dir_all(&wal_dir).unwrap();
    EngineConfig {
        wal: WalConfig {
            wal_dir,
            sync_mode: SyncMode::Sync,
            max_segment_size: 64 * 1024 * 1024,
        },
        cache_path: Some(dir.join("cache.bin")),
        cache_max_size: -1,
        gc: GcConfig {
            interval: Duration::from_millis(20),
            min_version_age: 0,
            batch_size: 100,
        },
    }
}

#[test]
fn multiple_versions_and_concurrent_readers_see_their_own_snapshot() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(config(dir.path())).unwrap();

    let tx = engine.begin_transaction().unwrap();
    engine.write(&tx, "cn=a", b"v1".to_vec()).unwrap();
    engine.commit(tx).unwrap();

    let reader1 = engine.begin_transaction().unwrap();

    let tx = engine.begin_transaction().unwrap();
    engine.write(&tx, "cn=a", b"v2".to_vec()).unwrap();
    engine.commit(tx).unwrap();

    let reader2 = engine.begin_transaction().unwrap();

    let tx = engine.begin_transaction().unwrap();
    engine.write(&tx, "cn=a", b"v3".to_vec()).unwrap();
    engine.commit(tx).unwrap();

    assert_eq!(engine.read(&reader1, "cn=a").unwrap(), b"v1");
    assert_eq!(engine.read(&reader2, "cn=a").unwrap(), b"v2");

    let reader3 = engine.begin_transaction().unwrap();
    assert_eq!(engine.read(&reader3, "cn=a").unwrap(), b"v3");

    engine.commit(reader1).unwrap();
    engine.commit(reader2).unwrap();
    engine.commit(reader3).unwrap();
}

#[test]
fn background_gc_trims_superseded_versions() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(config(dir.path())).unwrap();

    for i in 0..5 {
        let tx = engine.begin_transaction().unwrap();
        engine.write(&tx, "cn=a", format!("v{i}").into_bytes()).unwrap();
        engine.commit(tx).unwrap();
    }

    engine.start_gc().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    engine.stop_gc().unwrap();

    let stats = engine.gc_stats().unwrap();
    assert!(stats.versions_collected >= 4, "all but the newest version should be collectable with no live readers");

    let tx = engine.begin_transaction().unwrap();
    assert_eq!(engine.read(&tx, "cn=a").unwrap(), b"v4");
    engine.commit(tx).unwrap();
}

#[test]
fn gc_respects_a_live_snapshot() {
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(config(dir.path())).unwrap();

    let tx = engine.begin_transaction().unwrap();
    engine.write(&tx, "cn=a", b"v1".to_vec()).unwrap();
    engine.commit(tx).unwrap();

    let reader = engine.begin_transaction().unwrap();

    let tx = engine.begin_transaction().unwrap();
    engine.write(&tx, "cn=a", b"v2".to_vec()).unwrap();
    engine.commit(tx).unwrap();

    engine.start_gc().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    engine.stop_gc().unwrap();

    // v1 must survive: `reader` still needs it.
    assert_eq!(engine.read(&reader, "cn=a").unwrap(), b"v1");
    engine.commit(reader).unwrap();
}

#[test]
fn restart_without_checkpoint_recovers_from_wal_alone() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());

    {
        let engine = StorageEngine::open(cfg.clone()).unwrap();
        let tx = engine.begin_transaction().unwrap();
        engine.write(&tx, "cn=a", b"v1".to_vec()).unwrap();
        engine.write(&tx, "cn=b", b"v2".to_vec()).unwrap();
        engine.commit(tx).unwrap();

        let tx = engine.begin_transaction().unwrap();
        engine.delete(&tx, "cn=b").unwrap();
        engine.commit(tx).unwrap();
    }

    let engine = StorageEngine::open(cfg).unwrap();
    engine.restore(0).unwrap();

    let tx = engine.begin_transaction().unwrap();
    assert_eq!(engine.read(&tx, "cn=a").unwrap(), b"v1");
    assert!(matches!(engine.read(&tx, "cn=b"), Err(Error::NotFound(_))));
    engine.commit(tx).unwrap();
}

#[test]
fn uncommitted_write_does_not_survive_restart() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());

    {
        let engine = StorageEngine::open(cfg.clone()).unwrap();
        let tx = engine.begin_transaction().unwrap();
        engine.write(&tx, "cn=a", b"orphaned".to_vec()).unwrap();
        // Dropped without commit or rollback, simulating a crash.
    }

    let engine = StorageEngine::open(cfg).unwrap();
    engine.restore(0).unwrap();

    let tx = engine.begin_transaction().unwrap();
    assert!(matches!(engine.read(&tx, "cn=a"), Err(Error::NotFound(_))));
    engine.commit(tx).unwrap();
}
