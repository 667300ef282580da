#![no_main]

use huella::extract::{assignment_targets, is_identifier, tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Source lines are arbitrary text; extraction must never panic on them
    if let Ok(line) = std::str::from_utf8(data) {
        let tokens = tokenize(line);
        for path in &tokens.dotted {
            assert!(path.split('.').all(is_identifier));
        }
        for name in &tokens.names {
            assert!(is_identifier(name));
        }
        for target in assignment_targets(line) {
            assert!(is_identifier(target));
        }
    }
});
