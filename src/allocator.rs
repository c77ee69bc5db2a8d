use std::alloc::Layout;
use std::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::arena::ArenaCore;
use crate::mode::Mode;
use crate::supplier::{BufferSupplier, HeapSupplier};
use crate::Result;

/// Allocator handle that carves memory out of an arena.
///
/// Lets `allocator_api2` collections live in arena memory. Deallocation is a
/// no-op: memory comes back only when the arena is reset or dropped, and the
/// handle borrows the arena so neither can happen while it is alive.
///
/// Two handles compare equal iff they draw from the same arena.
///
/// # Example
///
/// ```
/// use allocator_api2::vec::Vec;
/// use region_arena::Arena;
///
/// let arena = Arena::new(1024, 1024);
/// let mut v = Vec::new_in(arena.allocator());
/// v.extend_from_slice(&[1u32, 2, 3]);
/// assert_eq!(v, [1, 2, 3]);
/// ```
pub struct ArenaAllocator<'a, M: Mode, S: BufferSupplier = HeapSupplier> {
    arena: &'a ArenaCore<M, S>,
}

impl<'a, M: Mode, S: BufferSupplier> ArenaAllocator<'a, M, S> {
    /// Creates a handle bound to `arena`.
    #[must_use]
    pub const fn new(arena: &'a ArenaCore<M, S>) -> Self {
        Self { arena }
    }

    /// Returns the arena this handle draws from.
    #[must_use]
    pub const fn arena(&self) -> &'a ArenaCore<M, S> {
        self.arena
    }

    /// Allocates uninitialized room for `count` values of `T`.
    ///
    /// # Errors
    ///
    /// Fails if the arena cannot grow, or with
    /// [`Error::SizeOverflow`](crate::Error::SizeOverflow) if
    /// `count * size_of::<T>()` does not fit in `usize`.
    pub fn allocate_array<T>(&self, count: usize) -> Result<NonNull<T>> {
        let size = std::mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(crate::Error::SizeOverflow)?;
        let ptr = self
            .arena
            .allocate_aligned(size, std::mem::align_of::<T>())?;
        Ok(ptr.cast())
    }

    /// Gives back an array from [`allocate_array`](Self::allocate_array).
    ///
    /// Does nothing: the memory stays valid and counted in the footprint
    /// until the arena is reset or dropped. Safe to call with any pointer.
    #[allow(clippy::unused_self)]
    pub const fn deallocate_array<T>(&self, _ptr: NonNull<T>, _count: usize) {}
}

impl<M: Mode, S: BufferSupplier> Clone for ArenaAllocator<'_, M, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: Mode, S: BufferSupplier> Copy for ArenaAllocator<'_, M, S> {}

impl<M: Mode, S: BufferSupplier> PartialEq for ArenaAllocator<'_, M, S> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena)
    }
}

impl<M: Mode, S: BufferSupplier> Eq for ArenaAllocator<'_, M, S> {}

impl<M: Mode, S: BufferSupplier> std::fmt::Debug for ArenaAllocator<'_, M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ArenaAllocator")
            .field(&std::ptr::from_ref(self.arena))
            .finish()
    }
}

// SAFETY: blocks stay valid until the arena is reset or dropped, both of
// which need `&mut` access that the borrow in every handle rules out.
unsafe impl<M: Mode, S: BufferSupplier> Allocator for ArenaAllocator<'_, M, S> {
    fn allocate(&self, layout: Layout) -> core::result::Result<NonNull<[u8]>, AllocError> {
        let ptr = self
            .arena
            .allocate_aligned(layout.size(), layout.align())
            .map_err(|_| AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    // Individual blocks are never freed.
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}
