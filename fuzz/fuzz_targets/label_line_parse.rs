//! Fuzz target for YOLO label-line rewriting.
//!
//! Feeds arbitrary UTF-8 lines to the line parser and rewriter,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yoloprep::label::fuzz_process_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_process_line(line);
});
