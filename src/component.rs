use std::ptr::NonNull;

use crate::mode::Cursor;
use crate::supplier::Buffer;

/// One block of arena memory with its own bump cursor.
///
/// The block is fixed for the component's lifetime; only the cursor moves.
/// Invariant: `0 <= cursor <= capacity`.
pub(crate) struct Component<C> {
    buffer: Buffer,
    cursor: C,
}

impl<C: Cursor> Component<C> {
    pub(crate) fn new(buffer: Buffer) -> Self {
        Self {
            buffer,
            cursor: C::new(),
        }
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes consumed so far, including alignment padding.
    #[cfg(test)]
    pub(crate) fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Carves `size` bytes aligned to `align` out of the unused tail.
    ///
    /// Returns `None` and leaves the cursor unchanged if they do not fit.
    #[inline]
    pub(crate) fn try_allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.buffer.as_ptr();
        let capacity = self.buffer.len();
        let start = self
            .cursor
            .advance(|offset| carve(base.addr(), offset, size, align, capacity))?;
        // SAFETY: start + size <= capacity, so the pointer stays inside the block.
        Some(unsafe { NonNull::new_unchecked(base.add(start)) })
    }

    pub(crate) fn reset(&mut self) {
        self.cursor.reset();
    }

    pub(crate) fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// Computes the `(start, end)` offsets of a `size`-byte region aligned to
/// `align`, placed at or after `offset` in a block starting at address `base`.
///
/// Padding is derived from the real address, so any power-of-two alignment
/// works regardless of how the block itself is aligned. `end` may equal
/// `capacity`.
#[inline]
pub(crate) const fn carve(
    base: usize,
    offset: usize,
    size: usize,
    align: usize,
    capacity: usize,
) -> Option<(usize, usize)> {
    let padding = base.wrapping_add(offset).wrapping_neg() & (align - 1);
    let Some(start) = offset.checked_add(padding) else {
        return None;
    };
    let Some(end) = start.checked_add(size) else {
        return None;
    };
    if end <= capacity {
        Some((start, end))
    } else {
        None
    }
}

/// Smallest fresh-block size guaranteed to fit `size` bytes aligned to
/// `align`, given blocks start on a [`BLOCK_ALIGN`](crate::BLOCK_ALIGN)
/// boundary.
pub(crate) const fn size_needed_for(size: usize, align: usize) -> Option<usize> {
    if align <= crate::supplier::BLOCK_ALIGN {
        Some(size)
    } else {
        size.checked_add(align - crate::supplier::BLOCK_ALIGN)
    }
}
