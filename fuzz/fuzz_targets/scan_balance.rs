#![no_main]
use cp2k_log::{BackendEvent, Cp2kParser, EventRecorder, ParserOptions};
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the scan, and every section it opens
    // must be closed exactly once before the session finishes.
    let options = ParserOptions {
        read_auxiliary_files: false,
        ..ParserOptions::default()
    };
    let Ok(parser) = Cp2kParser::new(options) else {
        return;
    };
    let Ok(parsed) = parser.parse_reader(data, None, EventRecorder::new()) else {
        return;
    };

    let mut open = HashSet::new();
    for event in parsed.backend.events() {
        match event {
            BackendEvent::OpenSection { index, .. } => assert!(open.insert(*index)),
            BackendEvent::CloseSection { index, .. } => assert!(open.remove(index)),
            BackendEvent::AddValue { index, .. } | BackendEvent::AddArrayValues { index, .. } => {
                assert!(open.contains(index))
            }
            _ => {}
        }
    }
    assert!(open.is_empty());
});
