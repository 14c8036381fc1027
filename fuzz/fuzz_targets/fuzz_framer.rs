#![no_main]
use std::{cell::RefCell, rc::Rc};

use libfuzzer_sys::fuzz_target;
use memframe::{Framer, FramerError, IncrementalFramer, RingFramer};

const HEADER: usize = 4; // 4-byte split seed

/// Well-formed documents the structured pass draws from.
const CORPUS: &[&str] = &[
    "{}",
    "[]",
    r#"{"id":1}"#,
    r#"{"name":"test","values":[1,2,3]}"#,
    r#"[{"a":null},{"b":true}]"#,
    r#"{"m":"Q:\"x\" y"}"#,
    r#"{"nested":{"deep":[{"x":1},{"y":[]}]}}"#,
    r#"{"text":"a b  c","n":-12.5e3}"#,
];

const WHITESPACE: &[&str] = &[" ", "  ", "\n", "\t", "\r\n", ""];

fn collector(log: &Rc<RefCell<Vec<Vec<u8>>>>) -> impl FnMut(&[u8]) -> Result<(), FramerError> {
    let sink = Rc::clone(log);
    move |doc: &[u8]| {
        sink.borrow_mut().push(doc.to_vec());
        Ok(())
    }
}

/// Feed `data` in chunk sizes derived from `split_seed`.
fn feed_chunked<F: Framer>(framer: &mut F, data: &[u8], split_seed: u64) {
    let mut start = 0;
    while start < data.len() {
        let remaining = data.len() - start;
        let size = (split_seed as usize % remaining) + 1;
        framer.feed(&data[start..start + size]);
        start += size;
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() <= HEADER {
        return;
    }
    let split_seed = u32::from_le_bytes(data[..HEADER].try_into().unwrap()) as u64;
    let picks = &data[HEADER..];

    // Structured pass: a whitespace-separated concatenation of well-formed
    // documents must come back out exactly, from both variants, no matter
    // how the stream is chunked.
    let mut stream = Vec::new();
    let mut expected = Vec::new();
    for &pick in picks.iter().take(64) {
        let doc = CORPUS[(pick & 0x0F) as usize % CORPUS.len()];
        let ws = WHITESPACE[(pick >> 4) as usize % WHITESPACE.len()];
        stream.extend_from_slice(ws.as_bytes());
        stream.extend_from_slice(doc.as_bytes());
        expected.push(doc.as_bytes().to_vec());
    }
    stream.push(b' ');

    let incremental_log = Rc::new(RefCell::new(Vec::new()));
    let mut incremental = IncrementalFramer::new(collector(&incremental_log), |_err| {});
    feed_chunked(&mut incremental, &stream, split_seed);
    assert_eq!(*incremental_log.borrow(), expected);

    let ring_log = Rc::new(RefCell::new(Vec::new()));
    let mut ring = RingFramer::new(collector(&ring_log), |_err| {}, 32);
    feed_chunked(&mut ring, &stream, split_seed.wrapping_add(1));
    assert_eq!(*ring_log.borrow(), expected);

    // Robustness pass: raw bytes, however malformed, must never panic the
    // framers or the tracker.
    let mut incremental = IncrementalFramer::new(|_doc: &[u8]| Ok(()), |_err| {});
    feed_chunked(&mut incremental, picks, split_seed);
    let mut ring = RingFramer::with_capacity_limit(|_doc: &[u8]| Ok(()), |_err| {}, 32, 1024);
    feed_chunked(&mut ring, picks, split_seed);
});
