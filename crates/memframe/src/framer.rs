//! The framer capability set and the callback plumbing shared by both
//! variants.
//!
//! A framer consumes raw bytes in arbitrary-sized chunks and invokes its
//! document callback once per structurally complete top-level JSON document.
//! Both variants emit the document's bytes verbatim — interior whitespace,
//! including whitespace inside string values, is preserved — with only the
//! whitespace surrounding the document stripped.

use crate::error::FramerError;

/// A byte-stream framer for top-level JSON documents.
///
/// Implemented by [`IncrementalFramer`] and [`RingFramer`]; the two differ
/// only in buffer management. Callbacks run synchronously from [`feed`].
/// A framer is a single-threaded object: feed it from one thread at a time.
///
/// [`IncrementalFramer`]: crate::IncrementalFramer
/// [`RingFramer`]: crate::RingFramer
/// [`feed`]: Framer::feed
pub trait Framer {
    /// Appends a chunk of input, emitting any documents it completes.
    fn feed(&mut self, bytes: &[u8]);

    /// Drops all buffered input and resets framing state.
    fn clear(&mut self);
}

/// Document and error callbacks, dispatched together.
///
/// The document callback may act as a downstream validator by returning
/// `Err`; the framer routes that error to the error callback. Framing
/// itself never produces an error through the document path.
#[derive(Debug)]
pub(crate) struct Callbacks<D, E> {
    on_document: D,
    on_error: E,
}

impl<D, E> Callbacks<D, E>
where
    D: FnMut(&[u8]) -> Result<(), FramerError>,
    E: FnMut(FramerError),
{
    pub(crate) fn new(on_document: D, on_error: E) -> Self {
        Self {
            on_document,
            on_error,
        }
    }

    /// Hands one complete document to the caller, routing a validator
    /// rejection to the error callback. Empty documents are dropped.
    pub(crate) fn dispatch(&mut self, document: &[u8]) {
        if document.is_empty() {
            return;
        }
        if let Err(err) = (self.on_document)(document) {
            (self.on_error)(err);
        }
    }

    /// Reports a framer-level error (ring overflow) directly.
    pub(crate) fn report(&mut self, err: FramerError) {
        (self.on_error)(err);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::Callbacks;
    use crate::error::FramerError;

    #[test]
    fn validator_errors_reach_the_error_callback() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let mut callbacks = Callbacks::new(
            |_doc: &[u8]| {
                Err(FramerError::DocumentInvalid {
                    reason: "not valid".into(),
                })
            },
            move |err| sink.borrow_mut().push(err),
        );

        callbacks.dispatch(b"{}");
        assert_eq!(
            errors.borrow().as_slice(),
            [FramerError::DocumentInvalid {
                reason: "not valid".into()
            }]
        );
    }

    #[test]
    fn empty_documents_are_not_dispatched() {
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        let mut callbacks = Callbacks::new(
            move |_doc: &[u8]| {
                *seen.borrow_mut() += 1;
                Ok(())
            },
            |_err| {},
        );

        callbacks.dispatch(b"");
        callbacks.dispatch(b"{}");
        assert_eq!(*count.borrow(), 1);
    }
}
