#![no_main]

use libfuzzer_sys::fuzz_target;
use rustlite_wal::record::WalRecord;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1_000_000 {
        return;
    }

    // Decoding an arbitrary byte slice should never panic, only error.
    let _ = WalRecord::decode(data);
});
