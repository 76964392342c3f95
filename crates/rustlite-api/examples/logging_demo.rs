use rustlite::logging::LogConfig;
use rustlite::{EngineConfig, StorageEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (info level with pretty output to stdout)
    let _guard = LogConfig::info().init();

    println!("=== RustLite Logging Demo ===\n");

    let dir = tempfile::tempdir()?;
    let mut config = EngineConfig::default();
    config.wal.wal_dir = dir.path().join("wal");
    config.cache_path = Some(dir.path().join("cache.bin"));
    std::fs::create_dir_all(&config.wal.wal_dir)?;

    // Opening the engine logs at debug level via `tracing`.
    let engine = StorageEngine::open(config)?;

    println!("\n1. Inserting data...");
    let tx = engine.begin_transaction()?;
    engine.write(&tx, "cn=1", b"Alice".to_vec())?;
    engine.write(&tx, "cn=2", b"Bob".to_vec())?;
    engine.write(&tx, "cn=3", b"Charlie".to_vec())?;
    engine.commit(tx)?;

    println!("\n2. Reading data...");
    let tx = engine.begin_transaction()?;
    let value = engine.read(&tx, "cn=1")?;
    println!("Found: {}", String::from_utf8_lossy(&value));

    println!("\n3. Deleting data...");
    engine.delete(&tx, "cn=2")?;
    engine.commit(tx)?;

    println!("\n4. Checkpointing...");
    let tag = engine.checkpoint()?;
    println!("checkpoint tag: {tag:?}");

    println!("\n5. Beginning another transaction...");
    let tx = engine.begin_transaction()?;
    engine.write(&tx, "cn=txn", b"txn:value".to_vec())?;
    engine.commit(tx)?;

    println!("\n=== Demo Complete ===");
    println!("Check the logs above to see tracing output!");

    Ok(())
}
