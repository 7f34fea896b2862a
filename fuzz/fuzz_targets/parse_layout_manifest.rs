#![no_main]

use libfuzzer_sys::fuzz_target;
use sbiv_contracts::layout::LayoutManifest;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let Ok(manifest) = serde_json::from_slice::<LayoutManifest>(data) else {
        return;
    };

    let _ = manifest.validate();
});
