//! Fuzz target for page alignment and companion-call translation.
//!
//! The real mapping must start on a page boundary, every translated companion
//! range must be page-aligned and stay inside the real mapping, and released
//! runs must start on a page, stay inside the mapping and never repeat.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use blobshim::mapping::{plan_mapping, ActiveMapping, ReleaseTracker};

#[derive(Debug, Arbitrary)]
struct Input {
    offset: u32,
    length: u32,
    page_shift: u8,
    real_page: u16,
    interior: u32,
    request_len: u32,
    fragments: Vec<(u32, u32)>,
}

fuzz_target!(|input: Input| {
    let page = 1usize << (12 + input.page_shift % 5);
    let length = input.length as usize + 1;
    let Some(request) = plan_mapping(input.offset as u64, length, page as u64) else {
        return;
    };
    assert_eq!(request.aligned_offset % page as u64, 0);
    assert_eq!(request.aligned_offset + request.remainder as u64, input.offset as u64);

    let real_base = (input.real_page as usize + 1) * page;
    let mapping = ActiveMapping::new(real_base, &request, page);
    let addr = mapping.caller_base() + input.interior as usize % length;
    let real = mapping.translate(addr, input.request_len as usize);

    if !real.is_empty() {
        assert_eq!(real.addr % page, 0);
        assert!(real.addr >= real_base);
        assert!(real.addr + real.len <= mapping.caller_base() + mapping.len());
    }

    let mut tracker = ReleaseTracker::new(&mapping, page);
    let total = tracker.resident();
    let mut released = 0;
    let real_end = mapping.caller_base() + mapping.len();
    for (at, len) in input.fragments.iter().take(16) {
        let at = mapping.caller_base() + *at as usize % length;
        let Some(mut span) = tracker.cover(at, *len as usize) else {
            continue;
        };
        while let Some(run) = tracker.take_run(&mut span) {
            assert_eq!(run.addr % page, 0);
            assert!(run.len % page == 0 || run.addr + run.len == real_end);
            assert!(run.addr >= real_base);
            assert!(run.addr + run.len <= real_end);
            released += run.len.div_ceil(page);
        }
    }
    assert_eq!(released + tracker.resident(), total);
});
