#![no_main]

use libfuzzer_sys::fuzz_target;
use rustlite::entry_codec::decode;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1_000_000 {
        return;
    }

    // Arbitrary bytes must never panic the decoder, only return an error.
    let _ = decode(data);
});
