use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use tracing::debug;

use crate::allocator::ArenaAllocator;
use crate::component::{Component, size_needed_for};
use crate::mode::{Cursor, Mode, MultiWriter, SingleWriter};
use crate::supplier::{Buffer, BufferSupplier, HeapSupplier};
use crate::{Error, Result};

/// Initial buffer size used by `Default`.
pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 4 * 1024;

/// Maximum buffer size used by `Default`.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Single-writer region arena.
///
/// `Send` but not `Sync`: one thread allocates at a time.
pub type Arena<S = HeapSupplier> = ArenaCore<SingleWriter, S>;

/// Multi-writer region arena with lock-free allocation.
///
/// `Send + Sync`: any number of threads may allocate through `&self`.
pub type ThreadSafeArena<S = HeapSupplier> = ArenaCore<MultiWriter, S>;

/// Region allocator over a growable chain of buffers.
///
/// Allocations bump a cursor inside the current buffer ("component"). When it
/// is exhausted a new component is requested from the [`BufferSupplier`],
/// twice the size of the previous one and capped at `max_buffer_size`.
/// Memory is never freed per allocation: every pointer stays valid until
/// [`reset`](Self::reset) or drop. Both take `&mut self`, so the borrow
/// checker rules out resetting while references into the arena are alive.
///
/// Values placed in the arena are never dropped.
///
/// Use the [`Arena`] and [`ThreadSafeArena`] aliases rather than naming the
/// mode directly.
///
/// # Example
///
/// ```
/// use region_arena::Arena;
///
/// let mut arena = Arena::new(128, 4096);
/// let hello = arena.add_str("hello").unwrap();
/// let n = arena.construct(42u64).unwrap();
///
/// assert_eq!(hello, "hello");
/// assert_eq!(*n, 42);
///
/// arena.reset();
/// assert_eq!(arena.memory_footprint(), 128);
/// ```
///
/// # Architecture
///
/// Components are boxed and referenced through raw pointers, so a component
/// never moves once created. `current` always points at the most recently
/// appended one and is published with `Release` after the component is fully
/// built; the fast path reads it with `Acquire`. The component list is only
/// mutated while holding the mode's growth lock, or through `&mut self`.
pub struct ArenaCore<M: Mode, S: BufferSupplier = HeapSupplier> {
    supplier: S,
    /// Every retained component, oldest first. Never empty.
    components: UnsafeCell<Vec<NonNull<Component<M::Cursor>>>>,
    /// Last element of `components`.
    current: AtomicPtr<Component<M::Cursor>>,
    max_buffer_size: usize,
    /// Sum of the capacities of `components`.
    footprint: AtomicUsize,
    lock: M::Lock,
}

// SAFETY: the arena exclusively owns every component and its block.
unsafe impl<M: Mode, S: BufferSupplier + Send> Send for ArenaCore<M, S> {}

// SAFETY: with `MultiWriter` the cursor is atomic and the component list is
// only mutated under the growth mutex or through `&mut self`.
unsafe impl<S: BufferSupplier + Send + Sync> Sync for ArenaCore<MultiWriter, S> {}

impl<M: Mode> ArenaCore<M, HeapSupplier> {
    /// Creates an arena backed by the global heap, with no total size limit.
    ///
    /// The first buffer holds `initial_buffer_size` bytes (capped at
    /// `max_buffer_size`); later buffers double in size up to
    /// `max_buffer_size`.
    #[must_use]
    pub fn new(initial_buffer_size: usize, max_buffer_size: usize) -> Self {
        Self::with_supplier(HeapSupplier, initial_buffer_size, max_buffer_size)
    }
}

impl<M: Mode> Default for ArenaCore<M, HeapSupplier> {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BUFFER_SIZE, DEFAULT_MAX_BUFFER_SIZE)
    }
}

impl<M: Mode, S: BufferSupplier> ArenaCore<M, S> {
    /// Creates an arena drawing its buffers from `supplier`.
    ///
    /// Never fails: if the supplier denies the initial buffer, the arena
    /// starts with an empty one and the first allocation grows it.
    #[must_use]
    pub fn with_supplier(supplier: S, initial_buffer_size: usize, max_buffer_size: usize) -> Self {
        let initial = initial_buffer_size.min(max_buffer_size);
        let buffer = supplier
            .request(0, initial)
            .filter(|buffer| !buffer.is_empty())
            .unwrap_or_else(Buffer::empty);
        let capacity = buffer.len();
        let component = NonNull::from(Box::leak(Box::new(Component::new(buffer))));

        Self {
            supplier,
            components: UnsafeCell::new(vec![component]),
            current: AtomicPtr::new(component.as_ptr()),
            max_buffer_size,
            footprint: AtomicUsize::new(capacity),
            lock: M::Lock::default(),
        }
    }

    /// Allocates `size` bytes with no alignment requirement.
    ///
    /// # Errors
    ///
    /// See [`allocate_aligned`](Self::allocate_aligned).
    #[inline]
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.allocate_aligned(size, 1)
    }

    /// Allocates `size` bytes whose address is a multiple of `align`.
    ///
    /// The memory is uninitialized and stays valid until the arena is reset
    /// or dropped. `align` must be a power of two; anything else is a caller
    /// bug (checked only in debug builds).
    ///
    /// # Errors
    ///
    /// Fails if the current component is full and a new one cannot be
    /// created: the supplier denied it ([`Error::GrowthDenied`]), shrank it
    /// too far ([`Error::BufferTooSmall`]), or the request is larger than
    /// `max_buffer_size` ([`Error::ExceedsMaxBufferSize`]). A `size` so large
    /// that alignment padding overflows `usize` yields [`Error::SizeOverflow`].
    /// Contention with other writers never causes a failure.
    #[inline]
    pub fn allocate_aligned(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        debug_assert!(align.is_power_of_two(), "bad alignment: {align}");
        let current = self.current();
        if let Some(ptr) = current.try_allocate(size, align) {
            return Ok(ptr);
        }
        self.allocate_fallback(size, align, current)
    }

    /// Slow path: grows the arena under the growth lock and retries once.
    #[cold]
    #[inline(never)]
    fn allocate_fallback(
        &self,
        size: usize,
        align: usize,
        exhausted: &Component<M::Cursor>,
    ) -> Result<NonNull<u8>> {
        let _guard = M::lock(&self.lock);

        let current = self.current();
        if !std::ptr::eq(current, exhausted) {
            // Another writer grew the arena while we waited for the lock.
            if let Some(ptr) = current.try_allocate(size, align) {
                return Ok(ptr);
            }
        }

        let needed = size_needed_for(size, align).ok_or(Error::SizeOverflow)?;
        if needed > self.max_buffer_size {
            return Err(Error::ExceedsMaxBufferSize {
                needed,
                max_buffer_size: self.max_buffer_size,
            });
        }
        let next_size = current
            .capacity()
            .saturating_mul(2)
            .max(needed)
            .max(1)
            .min(self.max_buffer_size);

        let Some(buffer) = self
            .supplier
            .request(needed, next_size)
            .filter(|buffer| !buffer.is_empty())
        else {
            debug!(requested = next_size, minimal = needed, "buffer supplier denied growth");
            return Err(Error::GrowthDenied {
                requested: next_size,
                minimal: needed,
            });
        };
        debug_assert!(buffer.len() <= next_size, "supplier exceeded request");

        let granted = buffer.len();
        // SAFETY: the growth lock is held.
        let component = unsafe { self.push_component(buffer) };
        component.try_allocate(size, align).ok_or_else(|| {
            debug!(needed, granted, "supplied buffer too small for request");
            Error::BufferTooSmall { needed, granted }
        })
    }

    /// Appends a component over `buffer` and publishes it as current.
    ///
    /// # Safety
    ///
    /// The caller must hold the growth lock (or `&mut self`).
    unsafe fn push_component(&self, buffer: Buffer) -> &Component<M::Cursor> {
        let capacity = buffer.len();
        let component = NonNull::from(Box::leak(Box::new(Component::new(buffer))));

        // SAFETY: only the lock holder touches the list.
        let components = unsafe { &mut *self.components.get() };
        components.push(component);
        let footprint = self.footprint.fetch_add(capacity, Ordering::AcqRel) + capacity;

        // Pairs with the Acquire load in `current`.
        self.current.store(component.as_ptr(), Ordering::Release);

        debug!(
            capacity,
            footprint,
            components = components.len(),
            mode = M::NAME,
            "arena grew"
        );
        // SAFETY: the component lives until reset or drop, both of which
        // need `&mut self`.
        unsafe { component.as_ref() }
    }

    fn current(&self) -> &Component<M::Cursor> {
        // SAFETY: `current` always points at a live, fully built component
        // owned by `components`; components are freed only through `&mut self`.
        unsafe { &*self.current.load(Ordering::Acquire) }
    }

    /// Copies `data` into the arena and returns the copy.
    ///
    /// # Errors
    ///
    /// See [`allocate_aligned`](Self::allocate_aligned).
    #[allow(clippy::mut_from_ref)] // every call returns a fresh, disjoint region
    pub fn add_bytes(&self, data: &[u8]) -> Result<&mut [u8]> {
        self.add_slice(data)
    }

    /// Copies `s` into the arena and returns the copy.
    ///
    /// # Errors
    ///
    /// See [`allocate_aligned`](Self::allocate_aligned).
    #[allow(clippy::mut_from_ref)]
    pub fn add_str(&self, s: &str) -> Result<&mut str> {
        let bytes = self.add_bytes(s.as_bytes())?;
        // SAFETY: a byte-for-byte copy of a valid `str`.
        Ok(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Copies a slice of plain values into the arena, aligned for `T`.
    ///
    /// # Errors
    ///
    /// See [`allocate_aligned`](Self::allocate_aligned).
    #[allow(clippy::mut_from_ref)]
    pub fn add_slice<T: Copy>(&self, data: &[T]) -> Result<&mut [T]> {
        let size = std::mem::size_of_val(data);
        let ptr = self
            .allocate_aligned(size, std::mem::align_of::<T>())?
            .cast::<T>();
        // SAFETY: the region is fresh, sized and aligned for `data.len()`
        // values of `T`, and disjoint from `data`.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
            Ok(std::slice::from_raw_parts_mut(ptr.as_ptr(), data.len()))
        }
    }

    /// Copies the bytes `src` refers to into the arena and returns a view of
    /// the copy.
    ///
    /// The copy borrows only the arena, so it outlives `src`. A view can be
    /// repointed in place with `view = arena.relocate(view)?`; on failure it
    /// keeps pointing at the original bytes.
    ///
    /// # Errors
    ///
    /// See [`allocate_aligned`](Self::allocate_aligned).
    pub fn relocate<'a>(&'a self, src: &[u8]) -> Result<&'a [u8]> {
        self.add_bytes(src).map(|copy| &*copy)
    }

    /// Moves `value` into the arena and returns a reference to it.
    ///
    /// The value's destructor never runs.
    ///
    /// # Errors
    ///
    /// Returns the allocation error instead of a reference when the arena
    /// cannot grow. See [`allocate_aligned`](Self::allocate_aligned).
    #[allow(clippy::mut_from_ref)]
    pub fn construct<T>(&self, value: T) -> Result<&mut T> {
        self.construct_with(|| value)
    }

    /// Allocates room for a `T` and initializes it with `init`.
    ///
    /// `init` only runs if the allocation succeeded.
    ///
    /// # Errors
    ///
    /// See [`construct`](Self::construct).
    #[allow(clippy::mut_from_ref)]
    pub fn construct_with<T, F>(&self, init: F) -> Result<&mut T>
    where
        F: FnOnce() -> T,
    {
        let ptr = self
            .allocate_aligned(std::mem::size_of::<T>(), std::mem::align_of::<T>())?
            .cast::<T>();
        // SAFETY: fresh region sized and aligned for `T`, handed out once.
        unsafe {
            ptr.as_ptr().write(init());
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Returns an [`Allocator`](allocator_api2::alloc::Allocator) drawing
    /// from this arena, for use with arena-backed collections.
    #[must_use]
    pub const fn allocator(&self) -> ArenaAllocator<'_, M, S> {
        ArenaAllocator::new(self)
    }

    /// Discards all allocations.
    ///
    /// Every component but the most recent one is returned to the supplier;
    /// the last one is kept and rewound, so an allocate/reset loop settles on
    /// a single buffer and stops calling the supplier.
    pub fn reset(&mut self) {
        let components = self.components.get_mut();
        let Some(last) = components.pop() else {
            return;
        };
        let released = components.len();
        for component in components.drain(..) {
            release(&self.supplier, component);
        }
        components.push(last);

        // SAFETY: `&mut self` gives exclusive access to every component.
        let retained = unsafe {
            let component = &mut *last.as_ptr();
            component.reset();
            component.capacity()
        };
        *self.footprint.get_mut() = retained;
        *self.current.get_mut() = last.as_ptr();

        debug!(released, retained, "arena reset");
    }

    /// Total capacity of all retained buffers, in bytes.
    ///
    /// Always at least the number of bytes handed out.
    #[must_use]
    pub fn memory_footprint(&self) -> usize {
        self.footprint.load(Ordering::Acquire)
    }

    /// Upper bound on the size of any newly created buffer.
    #[must_use]
    pub const fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Number of retained buffers.
    ///
    /// Takes the growth lock, so concurrent writers may add a buffer right
    /// after the count is read.
    #[must_use]
    pub fn component_count(&self) -> usize {
        let _guard = M::lock(&self.lock);
        // SAFETY: the list only changes under the growth lock or through
        // `&mut self`.
        unsafe { (*self.components.get()).len() }
    }

    /// Capacity of each retained buffer, oldest first.
    #[cfg(test)]
    pub(crate) fn capacities(&mut self) -> Vec<usize> {
        self.components
            .get_mut()
            .iter()
            // SAFETY: `&mut self`; every listed component is live.
            .map(|component| unsafe { component.as_ref() }.capacity())
            .collect()
    }

    /// Bytes consumed in the current buffer, including padding.
    #[cfg(test)]
    pub(crate) fn current_used(&self) -> usize {
        self.current().used()
    }
}

/// Frees a component and returns its block to `supplier`.
fn release<C: Cursor, S: BufferSupplier>(supplier: &S, component: NonNull<Component<C>>) {
    // SAFETY: every listed component came from `Box::leak` and is removed
    // from the list before it is freed.
    let component = unsafe { Box::from_raw(component.as_ptr()) };
    let buffer = component.into_buffer();
    if !buffer.is_empty() {
        supplier.release(buffer);
    }
}

impl<M: Mode, S: BufferSupplier> Drop for ArenaCore<M, S> {
    fn drop(&mut self) {
        for component in self.components.get_mut().drain(..) {
            release(&self.supplier, component);
        }
    }
}

impl<M: Mode, S: BufferSupplier> std::fmt::Debug for ArenaCore<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaCore")
            .field("mode", &M::NAME)
            .field("memory_footprint", &self.memory_footprint())
            .field("max_buffer_size", &self.max_buffer_size)
            .finish_non_exhaustive()
    }
}
