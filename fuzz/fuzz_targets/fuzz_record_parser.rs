#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Record lines come from our own sink, but the parser also sees files
    // edited or truncated by hand; it must reject anything malformed without
    // panicking.
    if let Ok(rec) = spectrod_core::sink::parse_record_line(data) {
        assert!(!rec.timestamp.is_empty());
        assert!(!rec.samples.is_empty());
    }
});
