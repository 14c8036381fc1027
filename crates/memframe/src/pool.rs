//! Fixed-size object pool with optional per-thread free-list caches.
//!
//! The pool carves raw chunks from the global allocator and threads their
//! slots onto a singly-linked free list. Each slot is sized and aligned for
//! either one `T` or one free-list link, whichever is larger, so a free slot
//! stores its successor pointer in place. With thread-local caching enabled
//! (the default), allocation and deallocation usually touch only the calling
//! thread's own list; the pool mutex is taken only to refill an empty cache
//! or spill an overfull one, a batch at a time.
//!
//! Debug builds track every live slot: deallocating a pointer the pool never
//! issued panics, dropping the pool with live objects panics, and freed
//! slots are filled with a `0xDEADBEEF` word pattern to surface
//! use-after-free in a debugger.

use std::{
    alloc::{alloc, dealloc, handle_alloc_error, Layout},
    cell::UnsafeCell,
    collections::{HashMap, HashSet},
    fmt,
    io::{self, Write},
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
    sync::atomic::{AtomicUsize, Ordering},
    thread::{self, ThreadId},
};

use parking_lot::Mutex;

use crate::error::{ConstructError, PoolError};

/// Word pattern written over freed slots in debug builds.
#[cfg(debug_assertions)]
pub(crate) const DEAD_PATTERN: usize = 0xDEAD_BEEF;

/// In-place link stored in the first word of every free slot.
#[repr(C)]
struct FreeLink {
    next: *mut FreeLink,
}

/// Pool construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Slots per chunk.
    pub chunk_blocks: usize,
    /// Maximum number of chunks; `0` means unbounded.
    pub max_chunks: usize,
    /// Whether to keep per-thread free-list caches.
    pub thread_local: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_blocks: 1024,
            max_chunks: 0,
            thread_local: true,
        }
    }
}

/// One contiguous run of slots, owned by the pool for its whole lifetime.
struct Chunk {
    base: NonNull<u8>,
}

/// Pool-global resources, guarded by the pool mutex.
struct PoolState {
    chunks: Vec<Chunk>,
    free_head: *mut FreeLink,
    free_len: usize,
    total: usize,
}

/// Per-thread free list. The `head` is touched exclusively by the owning
/// thread; `len` is atomic so aggregate counters can read it from anywhere.
struct ThreadCache {
    head: UnsafeCell<*mut FreeLink>,
    len: AtomicUsize,
}

// The free-list head is only ever dereferenced by the thread that owns the
// cache entry; everything else reads the atomic length.
unsafe impl Sync for ThreadCache {}

impl ThreadCache {
    fn new() -> Self {
        Self {
            head: UnsafeCell::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }
}

/// A thread-aware allocator recycling fixed-size slots for values of one
/// type.
///
/// The pool trades generality for predictable latency: it never serves
/// arrays or foreign sizes, and it releases storage to the host allocator
/// only on teardown (or under out-of-memory pressure, when entire chunks
/// sit idle on the global free list).
///
/// # Examples
///
/// ```rust
/// use memframe::ObjectPool;
///
/// let pool: ObjectPool<u64> = ObjectPool::new();
/// let value = pool.share(7)?;
/// assert_eq!(*value, 7);
/// # Ok::<(), memframe::PoolError>(())
/// ```
pub struct ObjectPool<T> {
    block_count: usize,
    slot_size: usize,
    align: usize,
    max_chunks: usize,
    thread_local: bool,
    chunk_layout: Layout,

    state: Mutex<PoolState>,
    caches: Mutex<HashMap<ThreadId, Box<ThreadCache>>>,

    #[cfg(debug_assertions)]
    live: Mutex<HashSet<usize>>,

    _marker: PhantomData<T>,
}

// Slots hand out `T`s across threads; the free lists themselves are either
// mutex-guarded or thread-owned.
unsafe impl<T: Send> Send for ObjectPool<T> {}
unsafe impl<T: Send> Sync for ObjectPool<T> {}

impl<T> ObjectPool<T> {
    /// Creates a pool with the default configuration (1024-slot chunks,
    /// unbounded chunk count, thread-local caches on).
    ///
    /// # Panics
    ///
    /// Panics if the host allocator cannot provide the initial chunk.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool from an explicit [`PoolConfig`].
    ///
    /// One chunk is allocated eagerly so the first `allocate` never takes
    /// the slow path.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_blocks` is zero, if a chunk's byte size would
    /// overflow the address space, or if the host allocator cannot provide
    /// the initial chunk.
    #[must_use]
    pub fn with_config(config: PoolConfig) -> Self {
        assert!(config.chunk_blocks > 0, "chunk_blocks must be non-zero");

        let align = mem::align_of::<T>().max(mem::align_of::<FreeLink>());
        let slot_size = mem::size_of::<T>()
            .max(mem::size_of::<FreeLink>())
            .next_multiple_of(align);
        let chunk_layout = config
            .chunk_blocks
            .checked_mul(slot_size)
            .and_then(|bytes| Layout::from_size_align(bytes, align).ok())
            .unwrap_or_else(|| panic!("pool chunk of {} slots overflows the address space", config.chunk_blocks));

        let pool = Self {
            block_count: config.chunk_blocks,
            slot_size,
            align,
            max_chunks: config.max_chunks,
            thread_local: config.thread_local,
            chunk_layout,
            state: Mutex::new(PoolState {
                chunks: Vec::new(),
                free_head: ptr::null_mut(),
                free_len: 0,
                total: 0,
            }),
            caches: Mutex::new(HashMap::new()),
            #[cfg(debug_assertions)]
            live: Mutex::new(HashSet::new()),
            _marker: PhantomData,
        };

        {
            let mut state = pool.state.lock();
            if pool.allocate_chunk(&mut state).is_err() {
                handle_alloc_error(chunk_layout);
            }
        }

        pool
    }

    /// Hands out an uninitialized, correctly aligned slot.
    ///
    /// The caller owns the slot until it is passed back through
    /// [`deallocate`] or [`destroy`]; reading it before writing a `T` is
    /// undefined behavior.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] when every slot is live and the pool cannot
    /// grow.
    ///
    /// [`deallocate`]: ObjectPool::deallocate
    /// [`destroy`]: ObjectPool::destroy
    pub fn allocate(&self) -> Result<NonNull<T>, PoolError> {
        let link = if self.thread_local {
            self.allocate_cached()?
        } else {
            self.allocate_global()?
        };

        #[cfg(debug_assertions)]
        self.live.lock().insert(link as usize);

        // SAFETY: free-list nodes always point at slot boundaries inside
        // pool-owned chunks.
        Ok(unsafe { NonNull::new_unchecked(link.cast::<T>()) })
    }

    /// Allocates a slot and moves `value` into it.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] when the pool cannot provide a slot.
    pub fn construct(&self, value: T) -> Result<NonNull<T>, PoolError> {
        let slot = self.allocate()?;
        // SAFETY: `slot` is a fresh, uninitialized slot owned by the caller.
        unsafe { slot.as_ptr().write(value) };
        Ok(slot)
    }

    /// Allocates a slot and fills it from a fallible initializer.
    ///
    /// If `init` returns an error or unwinds, the slot goes straight back
    /// to the free list before the failure surfaces, so no storage is lost
    /// on the failure path.
    ///
    /// # Errors
    ///
    /// [`ConstructError::Pool`] when no slot is available,
    /// [`ConstructError::Init`] when the initializer refuses.
    pub fn construct_with<F, E>(&self, init: F) -> Result<NonNull<T>, ConstructError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let slot = self.allocate().map_err(ConstructError::Pool)?;

        struct Reclaim<'a, T> {
            pool: &'a ObjectPool<T>,
            slot: NonNull<T>,
        }

        impl<T> Drop for Reclaim<'_, T> {
            fn drop(&mut self) {
                // SAFETY: the slot came from `allocate` above and no `T`
                // was written into it.
                unsafe { self.pool.deallocate(self.slot) };
            }
        }

        let reclaim = Reclaim { pool: self, slot };
        match init() {
            Ok(value) => {
                mem::forget(reclaim);
                // SAFETY: `slot` is a fresh, uninitialized slot.
                unsafe { slot.as_ptr().write(value) };
                Ok(slot)
            }
            Err(err) => Err(ConstructError::Init(err)),
        }
    }

    /// Returns a slot to the pool without running `T`'s destructor.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`allocate`] on this pool, must not have
    /// been deallocated since, and any `T` in the slot must already have
    /// been dropped or moved out.
    ///
    /// [`allocate`]: ObjectPool::allocate
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        #[cfg(debug_assertions)]
        {
            let mut live = self.live.lock();
            assert!(
                live.remove(&(ptr.as_ptr() as usize)),
                "pointer {:p} was not allocated by this pool (or was freed twice)",
                ptr
            );
            drop(live);
            // SAFETY: the slot belongs to this pool and holds no live `T`.
            unsafe { self.fill_dead(ptr.as_ptr().cast::<u8>()) };
        }

        let link = ptr.as_ptr().cast::<FreeLink>();
        if self.thread_local {
            // SAFETY: `link` is a pool-owned slot released by its owner.
            unsafe { self.deallocate_cached(link) };
        } else {
            let mut state = self.state.lock();
            // SAFETY: same as above; the slot becomes a list node again.
            unsafe { (*link).next = state.free_head };
            state.free_head = link;
            state.free_len += 1;
        }
    }

    /// Drops the `T` in the slot, then returns the slot to the pool.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live, initialized `T` obtained from this pool
    /// and must not be used afterwards.
    pub unsafe fn destroy(&self, ptr: NonNull<T>) {
        // SAFETY: per the contract, the slot holds a live `T`.
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
            self.deallocate(ptr);
        }
    }

    /// Grows the pool until it owns at least `chunks` chunks.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] if the chunk cap or the host allocator
    /// stops growth first.
    pub fn reserve(&self, chunks: usize) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        while state.chunks.len() < chunks {
            self.allocate_chunk(&mut state)?;
        }
        Ok(())
    }

    /// Whether `ptr` lies on a slot boundary of a chunk owned by this pool.
    #[must_use]
    pub fn owns(&self, ptr: NonNull<T>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let chunk_bytes = self.block_count * self.slot_size;
        let state = self.state.lock();
        state.chunks.iter().any(|chunk| {
            let base = chunk.base.as_ptr() as usize;
            addr >= base && addr < base + chunk_bytes && (addr - base) % self.slot_size == 0
        })
    }

    /// Free slots across the global list and every thread cache.
    #[must_use]
    pub fn free_count(&self) -> usize {
        let state = self.state.lock();
        let caches = self.caches.lock();
        state.free_len
            + caches
                .values()
                .map(|cache| cache.len.load(Ordering::Relaxed))
                .sum::<usize>()
    }

    /// Total slots owned by the pool.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.state.lock().total
    }

    /// Slots currently live. Exact at quiescent points.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.total_count().saturating_sub(self.free_count())
    }

    /// Writes the keyed statistics block to `sink`.
    ///
    /// The field names and layout are part of the operational contract and
    /// are consumed by log-scraping tooling; debug builds append the live
    /// object count.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `sink`.
    pub fn print_stats<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        let total = self.total_count();
        let free = self.free_count();
        let chunks = self.state.lock().chunks.len();

        writeln!(sink, "Memory Pool Stats:")?;
        writeln!(sink, "  Total blocks: {total}")?;
        writeln!(sink, "  Free blocks: {free}")?;
        writeln!(sink, "  Allocated blocks: {}", total.saturating_sub(free))?;
        writeln!(sink, "  Block size: {} bytes", self.slot_size)?;
        writeln!(sink, "  Alignment: {} bytes", self.align)?;
        if self.max_chunks > 0 {
            writeln!(sink, "  Chunks allocated: {chunks} (max: {})", self.max_chunks)?;
        } else {
            writeln!(sink, "  Chunks allocated: {chunks}")?;
        }
        writeln!(
            sink,
            "  Memory usage: {} KB",
            (total * self.slot_size) as f64 / 1024.0
        )?;
        writeln!(
            sink,
            "  Thread local storage: {}",
            if self.thread_local { "Enabled" } else { "Disabled" }
        )?;

        #[cfg(debug_assertions)]
        writeln!(sink, "  Currently allocated objects: {}", self.live.lock().len())?;

        Ok(())
    }

    // ---- slow paths -----------------------------------------------------

    fn allocate_cached(&self) -> Result<*mut FreeLink, PoolError> {
        let cache = self.cache_ptr();
        // SAFETY: the cache entry is pinned behind a `Box` for the pool's
        // lifetime and its list is touched only by this thread.
        unsafe {
            let head = (*cache).head.get();
            if (*head).is_null() {
                self.refill_cache(&*cache)?;
            }
            let link = *head;
            *head = (*link).next;
            (*cache).len.fetch_sub(1, Ordering::Relaxed);
            Ok(link)
        }
    }

    fn allocate_global(&self) -> Result<*mut FreeLink, PoolError> {
        let mut state = self.state.lock();
        if state.free_head.is_null() {
            self.allocate_chunk(&mut state)?;
        }
        let link = state.free_head;
        // SAFETY: non-null head of the pool's own free list.
        unsafe { state.free_head = (*link).next };
        state.free_len -= 1;
        Ok(link)
    }

    /// Moves a batch of `min(32, chunk_blocks / 4)` slots (at least one)
    /// from the global list to `cache`, growing the pool if the global
    /// list is empty.
    fn refill_cache(&self, cache: &ThreadCache) -> Result<(), PoolError> {
        let batch = (self.block_count / 4).clamp(1, 32);

        let mut state = self.state.lock();
        if state.free_head.is_null() {
            self.allocate_chunk(&mut state)?;
        }

        let batch_head = state.free_head;
        let mut tail = batch_head;
        let mut count = 1;
        // SAFETY: list nodes are pool-owned slots; the spliced segment is
        // detached from the global list before the cache sees it.
        unsafe {
            while count < batch && !(*tail).next.is_null() {
                tail = (*tail).next;
                count += 1;
            }
            state.free_head = (*tail).next;
            state.free_len -= count;

            (*tail).next = *cache.head.get();
            *cache.head.get() = batch_head;
        }
        cache.len.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// # Safety
    ///
    /// `link` must be a pool-owned slot holding no live `T`, released by
    /// the calling thread.
    unsafe fn deallocate_cached(&self, link: *mut FreeLink) {
        let cache = self.cache_ptr();
        // SAFETY: only this thread touches the cache's list.
        let len = unsafe {
            let head = (*cache).head.get();
            (*link).next = *head;
            *head = link;
            (*cache).len.fetch_add(1, Ordering::Relaxed) + 1
        };

        // A cache holding more than one chunk's worth of slots spills half
        // of them back in a single splice.
        if len > self.block_count {
            // SAFETY: the cache belongs to this thread and holds `len`
            // nodes.
            unsafe { self.spill_cache(&*cache, len / 2) };
        }
    }

    /// # Safety
    ///
    /// `cache` must be the calling thread's cache and must hold at least
    /// `count >= 1` nodes.
    unsafe fn spill_cache(&self, cache: &ThreadCache, count: usize) {
        // SAFETY: per the contract the first `count` nodes exist.
        unsafe {
            let head_slot = cache.head.get();
            let batch_head = *head_slot;
            let mut tail = batch_head;
            for _ in 1..count {
                tail = (*tail).next;
            }
            *head_slot = (*tail).next;
            cache.len.fetch_sub(count, Ordering::Relaxed);

            let mut state = self.state.lock();
            (*tail).next = state.free_head;
            state.free_head = batch_head;
            state.free_len += count;
        }
    }

    fn cache_ptr(&self) -> *const ThreadCache {
        let tid = thread::current().id();
        let mut caches = self.caches.lock();
        let entry = caches.entry(tid).or_insert_with(|| Box::new(ThreadCache::new()));
        &**entry as *const ThreadCache
    }

    /// Appends one chunk's worth of slots to the global free list. On host
    /// allocation failure, retries up to twice after releasing idle chunks.
    fn allocate_chunk(&self, state: &mut PoolState) -> Result<(), PoolError> {
        if self.max_chunks > 0 && state.chunks.len() >= self.max_chunks {
            return Err(PoolError::Exhausted {
                total: state.total,
                chunks: state.chunks.len(),
            });
        }

        // SAFETY: the chunk layout has non-zero size.
        let mut base = unsafe { alloc(self.chunk_layout) };
        if base.is_null() {
            for _ in 0..2 {
                let released = self.release_idle_chunks(state);
                if released == 0 {
                    break;
                }
                tracing::warn!(
                    released,
                    remaining = state.chunks.len(),
                    "chunk allocation failed; released idle chunks and retrying"
                );
                // SAFETY: as above.
                base = unsafe { alloc(self.chunk_layout) };
                if !base.is_null() {
                    break;
                }
            }
        }
        let Some(base) = NonNull::new(base) else {
            return Err(PoolError::Exhausted {
                total: state.total,
                chunks: state.chunks.len(),
            });
        };

        // SAFETY: every node lies inside the freshly allocated chunk, on a
        // slot boundary.
        unsafe {
            for i in 0..self.block_count {
                let node = base.as_ptr().add(i * self.slot_size).cast::<FreeLink>();
                (*node).next = state.free_head;
                state.free_head = node;
            }
        }
        state.free_len += self.block_count;
        state.total += self.block_count;
        state.chunks.push(Chunk { base });

        tracing::debug!(
            chunks = state.chunks.len(),
            total_slots = state.total,
            "allocated pool chunk"
        );
        Ok(())
    }

    /// Releases up to `max(1, chunks / 4)` chunks whose every slot sits on
    /// the global free list, returning how many were released. Chunks with
    /// live or thread-cached slots are never touched.
    fn release_idle_chunks(&self, state: &mut PoolState) -> usize {
        let want = (state.chunks.len() / 4).max(1);
        let chunk_bytes = self.block_count * self.slot_size;

        let mut free_slots = HashSet::with_capacity(state.free_len);
        let mut node = state.free_head;
        while !node.is_null() {
            free_slots.insert(node as usize);
            // SAFETY: walking the pool's own list.
            node = unsafe { (*node).next };
        }

        let mut released = 0;
        let mut idx = state.chunks.len();
        while idx > 0 && released < want {
            idx -= 1;
            let base = state.chunks[idx].base.as_ptr() as usize;
            let idle = (0..self.block_count)
                .all(|i| free_slots.contains(&(base + i * self.slot_size)));
            if !idle {
                continue;
            }

            let range = base..base + chunk_bytes;
            // SAFETY: unlinking this chunk's nodes from the pool's own
            // list; the cursor always points at a valid link field.
            unsafe {
                let mut cursor: *mut *mut FreeLink = &mut state.free_head;
                loop {
                    let node = *cursor;
                    if node.is_null() {
                        break;
                    }
                    if range.contains(&(node as usize)) {
                        *cursor = (*node).next;
                    } else {
                        cursor = &mut (*node).next;
                    }
                }
            }
            state.free_len -= self.block_count;
            state.total -= self.block_count;
            let chunk = state.chunks.swap_remove(idx);
            // SAFETY: chunks are allocated with `chunk_layout`.
            unsafe { dealloc(chunk.base.as_ptr(), self.chunk_layout) };
            released += 1;
        }
        released
    }

    #[cfg(debug_assertions)]
    unsafe fn fill_dead(&self, slot: *mut u8) {
        let words = self.slot_size / mem::size_of::<usize>();
        let slot = slot.cast::<usize>();
        for i in 0..words {
            // SAFETY: the slot spans `slot_size` writable bytes.
            unsafe { slot.add(i).write(DEAD_PATTERN) };
        }
    }
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("block_count", &self.block_count)
            .field("slot_size", &self.slot_size)
            .field("align", &self.align)
            .field("max_chunks", &self.max_chunks)
            .field("thread_local", &self.thread_local)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let live = self.live.get_mut();
            if !live.is_empty() {
                tracing::error!(count = live.len(), "object pool dropped with live objects");
                panic!("object pool dropped with {} live object(s)", live.len());
            }
        }

        let layout = self.chunk_layout;
        let state = self.state.get_mut();
        for chunk in state.chunks.drain(..) {
            // SAFETY: chunks are allocated with `chunk_layout` and nothing
            // references them once the pool is gone.
            unsafe { dealloc(chunk.base.as_ptr(), layout) };
        }
    }
}
