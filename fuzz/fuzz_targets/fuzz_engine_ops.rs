#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rustlite::{EngineConfig, StorageEngine};

#[derive(Arbitrary, Debug)]
enum EngineOp {
    Write { dn: String, data: Vec<u8> },
    Read { dn: String },
    Delete { dn: String },
    Commit,
    Rollback,
}

fuzz_target!(|ops: Vec<EngineOp>| {
    let Ok(dir) = tempfile::tempdir() else { return };
    let wal_dir = dir.path().join("wal");
    if std::fs::create_dir_all(&wal_dir).is_err() {
        return;
    }
    let mut config = EngineConfig::default();
    config.wal.wal_dir = wal_dir;

    let Ok(engine) = StorageEngine::open(config) else { return };
    let Ok(mut tx) = engine.begin_transaction() else { return };

    for op in ops.into_iter().take(200) {
        match op {
            EngineOp::Write { dn, data } => {
                if dn.len() <= 1024 && data.len() <= 4096 {
                    let _ = engine.write(&tx, &dn, data);
                }
            }
            EngineOp::Read { dn } => {
                if dn.len() <= 1024 {
                    let _ = engine.read(&tx, &dn);
                }
            }
            EngineOp::Delete { dn } => {
                if dn.len() <= 1024 {
                    let _ = engine.delete(&tx, &dn);
                }
            }
            EngineOp::Commit => {
                let Ok(next) = engine.begin_transaction() else { break };
                let done = std::mem::replace(&mut tx, next);
                let _ = engine.commit(done);
            }
            EngineOp::Rollback => {
                let Ok(next) = engine.begin_transaction() else { break };
                let done = std::mem::replace(&mut tx, next);
                let _ = engine.rollback(done);
            }
        }
    }

    let _ = engine.commit(tx);
});
