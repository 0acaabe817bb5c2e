#![no_main]

use libfuzzer_sys::fuzz_target;
use seedfuzz::first_diagnostic_line;

fuzz_target!(|data: &[u8]| {
    let stderr = String::from_utf8_lossy(data);
    let _ = first_diagnostic_line(&stderr);
});
