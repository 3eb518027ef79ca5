#![no_main]

use libfuzzer_sys::fuzz_target;
use treeclock_core::Id;

fuzz_target!(|data: &[u8]| {
    if let Ok(id) = Id::deserialize(data) {
        // Decoders only admit normalized trees.
        assert!(id.is_normalized());
        let encoded = id.to_bytes().expect("decoded id re-encodes");
        assert_eq!(encoded, data);
    }
});
