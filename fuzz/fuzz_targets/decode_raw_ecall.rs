#![no_main]

use libfuzzer_sys::fuzz_target;
use sbiv_contracts::{RawEcall, ECALL_ARG_SLOTS};

fn word(data: &[u8], i: usize) -> u64 {
    let mut bytes = [0u8; 8];
    for (j, b) in bytes.iter_mut().enumerate() {
        *b = data.get(i * 8 + j).copied().unwrap_or(0);
    }
    u64::from_le_bytes(bytes)
}

fuzz_target!(|data: &[u8]| {
    let mut raw = RawEcall::new(word(data, 0));
    raw.func_id = word(data, 1);
    for i in 0..ECALL_ARG_SLOTS {
        raw.args[i] = word(data, 2 + i);
    }

    // Decoding must never panic; when it succeeds, re-encoding the typed
    // call must reproduce the id and the consumed argument slots.
    if let Ok(call) = raw.decode() {
        let back = call.encode();
        assert_eq!(back.ext_id, raw.ext_id);
        assert_eq!(back.decode(), Ok(call));
    }
});
