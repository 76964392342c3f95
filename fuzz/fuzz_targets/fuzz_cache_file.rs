#![no_main]

use libfuzzer_sys::fuzz_target;
use rustlite_core::cache_file::{read_file, TYPE_ENTRY};
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10_000_000 {
        return;
    }

    if let Ok(mut temp_file) = tempfile::NamedTempFile::new() {
        if temp_file.write_all(data).is_ok() {
            let path = temp_file.path();
            // Corrupt header, truncated payload, bad CRC, wrong tx_id: all
            // should surface as an error, never a panic.
            let _ = read_file(path, TYPE_ENTRY, 0);
            let _ = read_file(path, TYPE_ENTRY, u64::MAX);
        }
    }
});
