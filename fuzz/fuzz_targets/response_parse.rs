//! Fuzz target for model response parsing.
//!
//! Feeds arbitrary text to the response parser and checks that every
//! detection it returns is inside the image with a valid confidence.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(text) = std::str::from_utf8(data) {
        boxsight::parse::fuzz_parse_response(text);
    }
});
