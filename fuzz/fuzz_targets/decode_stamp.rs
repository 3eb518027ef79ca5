#![no_main]

use libfuzzer_sys::fuzz_target;
use treeclock_core::Stamp;

// Arbitrary bytes must either fail cleanly or decode to a stamp whose
// value survives a re-encode round-trip. (Byte-level identity is not
// guaranteed: the decoder tolerates non-minimal length fields.)
fuzz_target!(|data: &[u8]| {
    if let Ok(stamp) = Stamp::deserialize(data) {
        let encoded = stamp.to_bytes().expect("decoded stamp re-encodes");
        assert_eq!(Stamp::deserialize(&encoded), Ok(stamp));
    }
});
