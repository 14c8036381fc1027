//! Ring-buffer framer.
//!
//! Bytes are written one at a time into a circular buffer; draining an
//! emitted document is an O(1) advance of the head index. The ring doubles
//! in place when full, copying the live span in order, so buffered bytes
//! keep their arrival order across growth.

use crate::{
    error::FramerError,
    framer::{Callbacks, Framer},
    tracker::DocumentTracker,
};

/// Initial ring capacity used when callers have no better estimate.
pub const DEFAULT_RING_CAPACITY: usize = 8192;

/// Framer backed by a growable byte ring.
///
/// `head == tail` denotes an empty ring; one slot is always kept open so
/// the two never collide while the ring holds data. When writing a byte
/// would close that gap the ring grows first, doubling its capacity.
///
/// # Examples
///
/// ```rust
/// use memframe::{Framer, RingFramer, DEFAULT_RING_CAPACITY};
///
/// let mut framer = RingFramer::new(
///     |doc: &[u8]| {
///         println!("{}", String::from_utf8_lossy(doc));
///         Ok(())
///     },
///     |err| eprintln!("{err}"),
///     DEFAULT_RING_CAPACITY,
/// );
/// framer.feed(b"{\"id\": 1}");
/// ```
#[derive(Debug)]
pub struct RingFramer<D, E> {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    max_capacity: Option<usize>,
    tracker: DocumentTracker,
    callbacks: Callbacks<D, E>,
}

impl<D, E> RingFramer<D, E>
where
    D: FnMut(&[u8]) -> Result<(), FramerError>,
    E: FnMut(FramerError),
{
    /// Creates a ring framer with unbounded growth.
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity` is zero.
    pub fn new(on_document: D, on_error: E, initial_capacity: usize) -> Self {
        assert!(initial_capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![0; initial_capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            max_capacity: None,
            tracker: DocumentTracker::new(),
            callbacks: Callbacks::new(on_document, on_error),
        }
    }

    /// Creates a ring framer that refuses to grow beyond `max_capacity`.
    ///
    /// When a document would need more room than the cap allows, the framer
    /// reports [`FramerError::Overflow`] and discards the partial document.
    /// The remainder of the oversized document still flows through the
    /// permissive tracker as it arrives, so framing reliably resumes once
    /// that tail has drained (or after [`Framer::clear`]).
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity` is zero or exceeds `max_capacity`.
    pub fn with_capacity_limit(
        on_document: D,
        on_error: E,
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Self {
        assert!(
            initial_capacity <= max_capacity,
            "initial ring capacity exceeds the configured limit"
        );
        let mut framer = Self::new(on_document, on_error, initial_capacity);
        framer.max_capacity = Some(max_capacity);
        framer
    }

    /// Bytes currently buffered between `head` and `tail`.
    fn len(&self) -> usize {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.buf.len() - self.head + self.tail
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if (self.tail + 1) % self.buf.len() == self.head && !self.grow() {
            // Overflow already reported; the byte is part of the discarded
            // document.
            return;
        }

        self.buf[self.tail] = byte;
        self.tail = (self.tail + 1) % self.buf.len();

        if self.tracker.step(byte) {
            self.emit_document();
            self.tracker.reset();
        }
    }

    /// Doubles the ring, copying the live span to the front of the new
    /// buffer. Returns `false` when the capacity limit forbids growth.
    fn grow(&mut self) -> bool {
        let capacity = self.buf.len();
        let needed = capacity * 2;
        if let Some(max) = self.max_capacity {
            if needed > max {
                self.callbacks.report(FramerError::Overflow { needed, max });
                self.head = 0;
                self.tail = 0;
                self.tracker.reset();
                return false;
            }
        }

        tracing::debug!(from = capacity, to = needed, "growing framer ring");

        let mut grown = vec![0; needed].into_boxed_slice();
        let size = self.len();
        let mut i = self.head;
        for slot in grown.iter_mut().take(size) {
            *slot = self.buf[i];
            i = (i + 1) % capacity;
        }

        self.buf = grown;
        self.head = 0;
        self.tail = size;
        true
    }

    /// Walks the ring from `head`, re-running the balance logic to locate
    /// the exact closing byte, then advances `head` past the document.
    fn emit_document(&mut self) {
        let capacity = self.buf.len();
        let mut document = Vec::new();
        let mut scan = DocumentTracker::new();

        let mut i = self.head;
        while i != self.tail {
            let byte = self.buf[i];

            if !scan.is_started() && byte != b'{' && byte != b'[' {
                i = (i + 1) % capacity;
                continue;
            }

            document.push(byte);
            if scan.step(byte) {
                self.head = (i + 1) % capacity;
                self.callbacks.dispatch(&document);
                return;
            }
            i = (i + 1) % capacity;
        }
    }
}

impl<D, E> Framer for RingFramer<D, E>
where
    D: FnMut(&[u8]) -> Result<(), FramerError>,
    E: FnMut(FramerError),
{
    fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.tracker.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::RingFramer;
    use crate::{error::FramerError, framer::Framer};

    type DocLog = Rc<RefCell<Vec<String>>>;

    fn collecting_framer(
        docs: &DocLog,
        capacity: usize,
    ) -> RingFramer<impl FnMut(&[u8]) -> Result<(), FramerError>, impl FnMut(FramerError)> {
        let sink = Rc::clone(docs);
        RingFramer::new(
            move |doc: &[u8]| {
                sink.borrow_mut()
                    .push(String::from_utf8_lossy(doc).into_owned());
                Ok(())
            },
            |err| panic!("unexpected framer error: {err}"),
            capacity,
        )
    }

    #[test]
    fn single_document() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(br#"{"name":"test"}"#);
        assert_eq!(docs.borrow().as_slice(), [r#"{"name":"test"}"#]);
    }

    #[test]
    fn large_document_grows_the_ring() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        let mut json = String::from(r#"{"data":["#);
        for i in 0..100_000 {
            if i > 0 {
                json.push(',');
            }
            json.push_str(&i.to_string());
        }
        json.push_str("]}");

        framer.feed(json.as_bytes());
        assert_eq!(docs.borrow().as_slice(), [json.as_str()]);
    }

    #[test]
    fn documents_across_feeds() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(br#"{"id":1}"#);
        framer.feed(br#"{"id":2}"#);
        assert_eq!(docs.borrow().as_slice(), [r#"{"id":1}"#, r#"{"id":2}"#]);
    }

    #[test]
    fn interior_whitespace_is_preserved() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(br#"{"m": "a b"}"#);
        assert_eq!(docs.borrow().as_slice(), [r#"{"m": "a b"}"#]);
    }

    #[test]
    fn surrounding_whitespace_is_stripped() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(b"  {\"id\":1}  \n  {\"id\":2}  ");
        assert_eq!(docs.borrow().as_slice(), [r#"{"id":1}"#, r#"{"id":2}"#]);
    }

    #[test]
    fn top_level_array() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(br#"[{"id":1},{"id":2}]"#);
        assert_eq!(docs.borrow().as_slice(), [r#"[{"id":1},{"id":2}]"#]);
    }

    #[test]
    fn wraparound_document_is_extracted_in_order() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 16);

        // Seven-byte documents against a 16-byte ring walk head and tail
        // around the buffer until a document straddles the wrap point.
        for id in 0..8 {
            framer.feed(format!("{{\"i\":{id}}}").as_bytes());
        }
        let expected: Vec<String> = (0..8).map(|id| format!("{{\"i\":{id}}}")).collect();
        assert_eq!(docs.borrow().as_slice(), expected.as_slice());
    }

    #[test]
    fn clear_discards_partial_input() {
        let docs: DocLog = Rc::default();
        let mut framer = collecting_framer(&docs, 32);

        framer.feed(br#"{"partial":"#);
        framer.clear();
        framer.feed(br#"{"id":7}"#);
        assert_eq!(docs.borrow().as_slice(), [r#"{"id":7}"#]);
    }

    #[test]
    fn capacity_limit_reports_overflow_and_resynchronizes() {
        let docs: DocLog = Rc::default();
        let errors: Rc<RefCell<Vec<FramerError>>> = Rc::default();
        let doc_sink = Rc::clone(&docs);
        let err_sink = Rc::clone(&errors);
        let mut framer = RingFramer::with_capacity_limit(
            move |doc: &[u8]| {
                doc_sink
                    .borrow_mut()
                    .push(String::from_utf8_lossy(doc).into_owned());
                Ok(())
            },
            move |err| err_sink.borrow_mut().push(err),
            16,
            16,
        );

        // 20 payload bytes cannot fit in a 16-byte ring that may not grow.
        framer.feed(br#"{"ns":[11,22,33,44]}"#);
        assert_eq!(
            errors.borrow().as_slice(),
            [FramerError::Overflow { needed: 32, max: 16 }]
        );

        // The oversized document's tail drains through the permissive
        // tracker; the next document frames normally.
        framer.feed(br#"{"id":1}"#);
        assert_eq!(docs.borrow().as_slice(), [r#"{"id":1}"#]);
    }
}
