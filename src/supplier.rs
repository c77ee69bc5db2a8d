use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

/// Alignment every supplied block must start on.
///
/// Requests aligned to at most this many bytes never need padding at the
/// start of a fresh block.
pub const BLOCK_ALIGN: usize = 64;

/// A raw memory block handed out by a [`BufferSupplier`].
///
/// The block is owned by whoever holds the `Buffer`; it is returned to its
/// supplier through [`BufferSupplier::release`]. Dropping a `Buffer` without
/// releasing it leaks the block.
#[derive(Debug)]
pub struct Buffer {
    data: NonNull<u8>,
    len: usize,
}

// SAFETY: a Buffer is the sole owner of its block.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Wraps a raw block.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `len` bytes, aligned to
    /// [`BLOCK_ALIGN`], and not owned by anything else until the buffer is
    /// released.
    #[must_use]
    pub const unsafe fn from_raw_parts(data: NonNull<u8>, len: usize) -> Self {
        Self { data, len }
    }

    /// A zero-length buffer that owns no memory.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            data: NonNull::dangling(),
            len: 0,
        }
    }

    /// Returns the start of the block.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Returns the block size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length buffer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Source of the raw blocks an arena carves allocations from.
///
/// A supplier may refuse or shrink any request, which is how memory budgets
/// are enforced. It must never panic or abort on exhaustion: denial is
/// reported by returning `None`.
pub trait BufferSupplier {
    /// Requests a block of `requested_size` bytes.
    ///
    /// Returns a block of at most `requested_size` bytes, ideally at least
    /// `minimal_size`. `None` or an empty block means the request was denied.
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer>;

    /// Takes back a block previously returned by [`request`](Self::request).
    fn release(&self, buffer: Buffer);
}

impl<T: BufferSupplier + ?Sized> BufferSupplier for &T {
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        (**self).request(minimal_size, requested_size)
    }

    fn release(&self, buffer: Buffer) {
        (**self).release(buffer);
    }
}

impl<T: BufferSupplier + ?Sized> BufferSupplier for Arc<T> {
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        (**self).request(minimal_size, requested_size)
    }

    fn release(&self, buffer: Buffer) {
        (**self).release(buffer);
    }
}

/// Unbounded supplier backed by the global heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapSupplier;

impl HeapSupplier {
    fn alloc(len: usize) -> Option<Buffer> {
        if len == 0 {
            return None;
        }
        let layout = Layout::from_size_align(len, BLOCK_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let data = NonNull::new(unsafe { std::alloc::alloc(layout) })?;
        // SAFETY: freshly allocated, `len` bytes, aligned to BLOCK_ALIGN.
        Some(unsafe { Buffer::from_raw_parts(data, len) })
    }
}

impl BufferSupplier for HeapSupplier {
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        Self::alloc(requested_size).or_else(|| {
            if minimal_size < requested_size {
                Self::alloc(minimal_size)
            } else {
                None
            }
        })
    }

    fn release(&self, buffer: Buffer) {
        if buffer.is_empty() {
            return;
        }
        if let Ok(layout) = Layout::from_size_align(buffer.len(), BLOCK_ALIGN) {
            // SAFETY: the block came from `alloc` with this exact layout.
            unsafe { std::alloc::dealloc(buffer.as_ptr(), layout) };
        }
    }
}

/// Supplier that caps the total bytes outstanding across all its users.
///
/// Wraps a delegate supplier. A request is granted
/// `min(requested_size, available())` bytes when that is at least
/// `minimal_size`, and denied otherwise. Released blocks return their bytes
/// to the quota. Share one instance between arenas through `Arc` or `&` to
/// enforce a common budget.
///
/// # Example
///
/// ```
/// use region_arena::{Arena, LimitedSupplier};
///
/// let budget = LimitedSupplier::new(256);
/// let arena = Arena::with_supplier(&budget, 128, 128);
/// assert_eq!(budget.usage(), 128);
///
/// assert!(arena.allocate(128).is_ok());
/// assert!(arena.allocate(128).is_ok());
/// assert!(arena.allocate(1).is_err());
/// assert_eq!(arena.memory_footprint(), 256);
/// ```
#[derive(Debug)]
pub struct LimitedSupplier<S = HeapSupplier> {
    delegate: S,
    quota: usize,
    usage: AtomicUsize,
}

impl LimitedSupplier {
    /// Creates a heap-backed supplier with a budget of `quota` bytes.
    #[must_use]
    pub const fn new(quota: usize) -> Self {
        Self::with_delegate(HeapSupplier, quota)
    }
}

impl<S> LimitedSupplier<S> {
    /// Creates a supplier that forwards granted requests to `delegate`.
    #[must_use]
    pub const fn with_delegate(delegate: S, quota: usize) -> Self {
        Self {
            delegate,
            quota,
            usage: AtomicUsize::new(0),
        }
    }

    /// Returns the budget in bytes.
    #[must_use]
    pub const fn quota(&self) -> usize {
        self.quota
    }

    /// Returns the bytes currently handed out.
    #[must_use]
    pub fn usage(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }

    /// Returns the bytes still available under the budget.
    #[must_use]
    pub fn available(&self) -> usize {
        self.quota.saturating_sub(self.usage())
    }

    /// Reserves up to `requested_size` bytes of quota, or nothing if less
    /// than `minimal_size` (or zero) bytes remain.
    fn reserve(&self, minimal_size: usize, requested_size: usize) -> Option<usize> {
        let mut usage = self.usage.load(Ordering::Acquire);
        loop {
            let grant = requested_size.min(self.quota.saturating_sub(usage));
            if grant == 0 || grant < minimal_size {
                return None;
            }
            match self.usage.compare_exchange_weak(
                usage,
                usage + grant,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(grant),
                Err(observed) => usage = observed,
            }
        }
    }
}

impl<S: BufferSupplier> BufferSupplier for LimitedSupplier<S> {
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        let Some(grant) = self.reserve(minimal_size, requested_size) else {
            trace!(
                minimal_size,
                requested_size,
                usage = self.usage(),
                quota = self.quota,
                "quota exhausted, request denied"
            );
            return None;
        };

        let Some(buffer) = self.delegate.request(minimal_size.min(grant), grant) else {
            self.usage.fetch_sub(grant, Ordering::AcqRel);
            return None;
        };
        let unused = grant.saturating_sub(buffer.len());
        if unused > 0 {
            self.usage.fetch_sub(unused, Ordering::AcqRel);
        }
        trace!(granted = buffer.len(), usage = self.usage(), quota = self.quota, "buffer granted");
        Some(buffer)
    }

    fn release(&self, buffer: Buffer) {
        let len = buffer.len();
        self.delegate.release(buffer);
        self.usage.fetch_sub(len, Ordering::AcqRel);
        trace!(released = len, usage = self.usage(), "buffer released");
    }
}
