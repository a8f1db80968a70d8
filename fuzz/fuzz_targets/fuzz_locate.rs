//! Fuzz target for the locator.
//!
//! Any accepted range must lie inside the container, start within the search
//! bound, and hold exactly the needle under the full policy.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use blobshim::locator::{locate_with, LocateOptions, MatchPolicy};

#[derive(Debug, Arbitrary)]
struct Input {
    container: Vec<u8>,
    needle: Vec<u8>,
    search_bound: u16,
    head_len: u8,
    prefix: bool,
}

fuzz_target!(|input: Input| {
    let options = LocateOptions {
        search_bound: input.search_bound as u64,
        head_len: input.head_len as usize,
        policy: if input.prefix { MatchPolicy::Prefix } else { MatchPolicy::Full },
    };
    if let Ok(range) = locate_with(&input.container, &input.needle, &options) {
        assert!(range.upper() as usize <= input.container.len());
        assert!(range.lower() < options.search_bound);
        assert_eq!(range.len() as usize, input.needle.len());
        if !input.prefix {
            let found = &input.container[range.lower() as usize..range.upper() as usize];
            assert_eq!(found, &input.needle[..]);
        }
    }
});
