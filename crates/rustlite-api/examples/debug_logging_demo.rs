use rustlite::logging::LogConfig;
use rustlite::{EngineConfig, StorageEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize debug-level logging
    let _guard = LogConfig::debug().init();

    println!("=== RustLite Debug Logging Demo ===\n");

    let dir = tempfile::tempdir()?;
    let mut config = EngineConfig::default();
    config.wal.wal_dir = dir.path().join("wal");
    std::fs::create_dir_all(&config.wal.wal_dir)?;
    let engine = StorageEngine::open(config)?;

    println!("\n1. Writing data with debug logs...");
    let tx = engine.begin_transaction()?;
    engine.write(&tx, "cn=alice", b"Alice Smith - Engineer".to_vec())?;
    engine.write(&tx, "cn=bob", b"Bob Jones - Manager".to_vec())?;
    engine.commit(tx)?;

    println!("\n2. Reading data with debug logs...");
    let tx = engine.begin_transaction()?;
    let value = engine.read(&tx, "cn=alice")?;
    println!("Found: {}", String::from_utf8_lossy(&value));

    println!("\n3. Deleting with debug logs...");
    engine.delete(&tx, "cn=bob")?;
    engine.commit(tx)?;

    println!("\n=== Debug Logging Demo Complete ===");

    Ok(())
}
