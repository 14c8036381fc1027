//! Reference-counted handles to pool-constructed values.
//!
//! A [`Shared`] schedules a `destroy` on its owning pool when the last
//! clone drops; the pool keeps sole ownership of the storage. The handle
//! borrows the pool, so the borrow checker enforces that the pool outlives
//! every handle.

use std::{fmt, ops::Deref, ptr::NonNull, sync::Arc};

use crate::{error::PoolError, pool::ObjectPool};

/// Control block behind every clone of one handle.
///
/// Dropping it runs the value's destructor and hands the slot back to the
/// dropping thread's cache (or the global list when caching is off) — the
/// drop may happen on any thread.
struct SharedBox<'pool, T> {
    pool: &'pool ObjectPool<T>,
    slot: NonNull<T>,
}

impl<T> Drop for SharedBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `slot` holds the live `T` constructed by `share`, and
        // this control block is its only owner.
        unsafe { self.pool.destroy(self.slot) };
    }
}

// Clones may read the `T` and drop the control block from any thread.
unsafe impl<T: Send + Sync> Send for SharedBox<'_, T> {}
unsafe impl<T: Send + Sync> Sync for SharedBox<'_, T> {}

/// Shared-ownership handle to a value living in an [`ObjectPool`] slot.
///
/// Clones share one slot; the slot counts as a single live object until the
/// last clone drops.
///
/// # Examples
///
/// ```rust
/// use memframe::ObjectPool;
///
/// let pool: ObjectPool<String> = ObjectPool::new();
/// let greeting = pool.share(String::from("hello"))?;
/// let other = greeting.clone();
/// assert_eq!(pool.allocated_count(), 1);
///
/// drop(greeting);
/// drop(other);
/// assert_eq!(pool.allocated_count(), 0);
/// # Ok::<(), memframe::PoolError>(())
/// ```
pub struct Shared<'pool, T> {
    inner: Arc<SharedBox<'pool, T>>,
}

impl<T> ObjectPool<T> {
    /// Constructs `value` in the pool and wraps it in a counted handle.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] when the pool cannot provide a slot.
    pub fn share(&self, value: T) -> Result<Shared<'_, T>, PoolError> {
        let slot = self.construct(value)?;
        Ok(Shared {
            inner: Arc::new(SharedBox { pool: self, slot }),
        })
    }
}

impl<T> Clone for Shared<'_, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Shared<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the slot stays initialized until the control block drops.
        unsafe { self.inner.slot.as_ref() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Display> fmt::Display for Shared<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::pool::{ObjectPool, PoolConfig};

    fn small_pool() -> ObjectPool<String> {
        ObjectPool::with_config(PoolConfig {
            chunk_blocks: 10,
            ..PoolConfig::default()
        })
    }

    #[test]
    fn handle_drop_returns_the_slot() {
        let pool = small_pool();
        {
            let value = pool.share(String::from("smart")).unwrap();
            assert_eq!(&*value, "smart");
            assert_eq!(pool.allocated_count(), 1);
        }
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 10);
    }

    #[test]
    fn clones_count_as_one_live_slot() {
        let pool = small_pool();
        let first = pool.share(String::from("shared")).unwrap();
        let second = first.clone();
        let third = second.clone();

        assert_eq!(pool.allocated_count(), 1);
        drop(first);
        drop(second);
        assert_eq!(pool.allocated_count(), 1);
        drop(third);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn handles_may_drop_on_another_thread() {
        let pool = small_pool();
        let handle = pool.share(String::from("crossing")).unwrap();

        thread::scope(|scope| {
            let moved = handle.clone();
            scope.spawn(move || {
                assert_eq!(&*moved, "crossing");
                drop(moved);
            });
        });

        drop(handle);
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), pool.total_count());
    }
}
