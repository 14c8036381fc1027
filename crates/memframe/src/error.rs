use thiserror::Error;

/// Runtime failure from pool allocation.
///
/// Exhaustion is the only recoverable allocation failure: the global free
/// list is empty and the pool cannot grow, either because it already holds
/// `max_chunks` chunks or because the host allocator refused a new chunk and
/// no idle chunk could be released to make room.
///
/// Misuse (deallocating a foreign pointer, dropping the pool with live
/// objects) is a defect, not an error, and panics in debug builds.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free slot is available and the pool cannot allocate another chunk.
    #[error("object pool exhausted ({total} slots across {chunks} chunk(s))")]
    Exhausted {
        /// Slots owned by the pool when allocation failed.
        total: usize,
        /// Chunks owned by the pool when allocation failed.
        chunks: usize,
    },
}

/// Failure from [`ObjectPool::construct_with`].
///
/// Either the pool could not provide a slot, or the caller's initializer
/// refused to produce a value. On the `Init` path the slot has already been
/// returned to the pool.
///
/// [`ObjectPool::construct_with`]: crate::ObjectPool::construct_with
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstructError<E> {
    /// The pool had no slot to construct into.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The initializer returned an error; the slot was reclaimed.
    #[error("object initialization failed: {0}")]
    Init(E),
}

/// Error delivered through a framer's error callback.
///
/// Framing itself never fails; `DocumentInvalid` originates from a
/// downstream validator plugged in as the document callback, and `Overflow`
/// only occurs on a [`RingFramer`] constructed with a capacity limit.
///
/// [`RingFramer`]: crate::RingFramer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramerError {
    /// A downstream validator rejected an emitted document.
    #[error("document rejected: {reason}")]
    DocumentInvalid {
        /// Validator-supplied description of the rejection.
        reason: String,
    },
    /// Growing the ring would exceed the configured capacity limit.
    #[error("ring buffer needs {needed} bytes but is capped at {max}")]
    Overflow {
        /// Capacity the ring would have needed to keep the document.
        needed: usize,
        /// Configured capacity limit.
        max: usize,
    },
}
