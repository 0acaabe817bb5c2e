#![no_main]

use libfuzzer_sys::fuzz_target;
use seedfuzz::{parse_corpus, render, Dispatch, MethodDescriptor, Param, DEFAULT_TEMPLATE};

fuzz_target!(|data: &[u8]| {
    if data.len() > 32 * 1024 {
        return;
    }
    let raw = String::from_utf8_lossy(data);
    let (cases, imports) = parse_corpus(&raw);
    if cases.is_empty() {
        return;
    }

    // Exercise synthesis on whatever snippets survive parsing.
    let descriptor = MethodDescriptor {
        signature: "fuzzlib::Target::call(i32)".to_string(),
        type_path: "fuzzlib::Target".to_string(),
        method: "call".to_string(),
        dispatch: Dispatch::Static,
        params: vec![Param {
            name: "x".to_string(),
            ty: "i32".to_string(),
        }],
        returns: "()".to_string(),
    };
    let rendered = render(&descriptor, &cases, &imports, DEFAULT_TEMPLATE, "call0")
        .expect("default template always renders");
    assert_eq!(rendered.case_intervals.len(), cases.len());
    for pair in rendered.case_intervals.windows(2) {
        assert!(pair[0].end < pair[1].start, "case intervals overlap");
    }
});
