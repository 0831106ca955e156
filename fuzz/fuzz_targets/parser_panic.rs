#![no_main]
use libfuzzer_sys::fuzz_target;
use texvalid_syntax::{ParseOptions, parse_with};

fuzz_target!(|data: &[u8]| {
    // Lossy conversion keeps inputs that are almost text.
    let s = String::from_utf8_lossy(data);
    let options = ParseOptions { max_tokens: 10_000 };
    if let Ok(diagnostics) = parse_with(&s, &options) {
        for d in &diagnostics {
            assert!(d.start_row <= d.end_row);
        }
    }
});
