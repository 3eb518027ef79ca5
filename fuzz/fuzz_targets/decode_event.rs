#![no_main]

use libfuzzer_sys::fuzz_target;
use treeclock_core::Event;

// The decoder is a tolerant receiver (non-minimal counter encodings are
// accepted), so re-encoded bytes may differ from the input; the decoded
// value itself must survive a round-trip.
fuzz_target!(|data: &[u8]| {
    if let Ok(event) = Event::deserialize(data) {
        let encoded = event.to_bytes().expect("decoded event re-encodes");
        assert_eq!(Event::deserialize(&encoded), Ok(event.clone()));
        let _ = event.normalize();
    }
});
