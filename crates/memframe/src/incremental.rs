//! Linear-buffer framer.
//!
//! Input accumulates in a growable byte buffer; a resumption index records
//! how far the scan has progressed so re-feeding never re-processes bytes.
//! Emitted documents are erased from the front of the buffer.

use crate::{
    error::FramerError,
    framer::{Callbacks, Framer},
    tracker::DocumentTracker,
};

/// Framer backed by a growable linear buffer.
///
/// # Examples
///
/// ```rust
/// use memframe::{Framer, IncrementalFramer};
///
/// let mut docs: Vec<Vec<u8>> = Vec::new();
/// let mut framer = IncrementalFramer::new(
///     |doc: &[u8]| {
///         println!("{}", String::from_utf8_lossy(doc));
///         Ok(())
///     },
///     |err| eprintln!("{err}"),
/// );
/// framer.feed(b"{\"key\":");
/// framer.feed(b" 1}");
/// ```
#[derive(Debug)]
pub struct IncrementalFramer<D, E> {
    buffer: Vec<u8>,
    scan_pos: usize,
    tracker: DocumentTracker,
    callbacks: Callbacks<D, E>,
}

impl<D, E> IncrementalFramer<D, E>
where
    D: FnMut(&[u8]) -> Result<(), FramerError>,
    E: FnMut(FramerError),
{
    /// Creates a framer that hands each complete document to `on_document`.
    ///
    /// A validator error returned from `on_document` is routed to
    /// `on_error`.
    pub fn new(on_document: D, on_error: E) -> Self {
        Self {
            buffer: Vec::new(),
            scan_pos: 0,
            tracker: DocumentTracker::new(),
            callbacks: Callbacks::new(on_document, on_error),
        }
    }
}

impl<D, E> Framer for IncrementalFramer<D, E>
where
    D: FnMut(&[u8]) -> Result<(), FramerError>,
    E: FnMut(FramerError),
{
    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        let mut i = self.scan_pos;
        while i < self.buffer.len() {
            let byte = self.buffer[i];

            // Whitespace between documents never reaches the tracker.
            if !self.tracker.is_started() && byte.is_ascii_whitespace() {
                i += 1;
                continue;
            }

            if self.tracker.step(byte) {
                let document = self.buffer[..=i].trim_ascii();
                self.callbacks.dispatch(document);
                self.buffer.drain(..=i);
                self.tracker.reset();

                i = 0;
                while i < self.buffer.len() && self.buffer[i].is_ascii_whitespace() {
                    i += 1;
                }
                // Stop at anything that cannot open a document; later input
                // may still complete the picture.
                if i < self.buffer.len() && self.buffer[i] != b'{' && self.buffer[i] != b'[' {
                    break;
                }
            } else {
                i += 1;
            }
        }

        self.scan_pos = i;
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.scan_pos = 0;
        self.tracker.reset();
    }
}
