//! Two systems-level primitives that show up together in streaming
//! services: a fixed-size [`ObjectPool`] that recycles storage for one value
//! type with per-thread free-list caches, and a pair of structural JSON
//! framers ([`IncrementalFramer`], [`RingFramer`]) that cut complete
//! top-level documents out of a byte stream arriving in arbitrary chunks —
//! without parsing field values.
//!
//! The framers share one [`DocumentTracker`], a pure byte-level state
//! machine counting braces and brackets modulo string and escape context.
//! They are independent of the pool; the pool is independent of them.
//!
//! # Examples
//!
//! ```rust
//! use memframe::{Framer, IncrementalFramer};
//!
//! let mut framer = IncrementalFramer::new(
//!     |doc: &[u8]| {
//!         assert_eq!(doc, br#"{"id":1}"#);
//!         Ok(())
//!     },
//!     |err| panic!("{err}"),
//! );
//! framer.feed(b"{\"id\"");
//! framer.feed(b":1}");
//! ```

mod error;
mod framer;
mod incremental;
mod pool;
mod ring;
mod shared;
mod tracker;

pub use error::{ConstructError, FramerError, PoolError};
pub use framer::Framer;
pub use incremental::IncrementalFramer;
pub use pool::{ObjectPool, PoolConfig};
pub use ring::{RingFramer, DEFAULT_RING_CAPACITY};
pub use shared::Shared;
pub use tracker::DocumentTracker;

#[cfg(test)]
mod tests;
