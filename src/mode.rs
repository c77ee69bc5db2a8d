//! Concurrency strategies for [`ArenaCore`](crate::ArenaCore).
//!
//! The allocation algorithm is written once against [`Mode`]; the two modes
//! differ only in how a component's cursor is bumped and whether growth is
//! serialized by a mutex.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

mod sealed {
    pub trait Sealed {}
}

/// Bump cursor of a single component.
///
/// `advance` hands the current offset to `carve`, which returns the
/// `(start, end)` of the region to claim, or `None` if it does not fit. On
/// success the cursor moves to `end` and `start` is returned; on failure the
/// cursor is left untouched.
pub trait Cursor: sealed::Sealed {
    /// Creates a cursor at offset 0.
    fn new() -> Self;

    /// Returns the current offset.
    fn get(&self) -> usize;

    /// Claims the region computed by `carve` from the current offset.
    fn advance<F>(&self, carve: F) -> Option<usize>
    where
        F: Fn(usize) -> Option<(usize, usize)>;

    /// Rewinds the cursor to offset 0.
    fn reset(&mut self);
}

/// Unsynchronized cursor for single-writer arenas.
#[derive(Debug)]
pub struct LocalCursor(Cell<usize>);

impl sealed::Sealed for LocalCursor {}

impl Cursor for LocalCursor {
    fn new() -> Self {
        Self(Cell::new(0))
    }

    fn get(&self) -> usize {
        self.0.get()
    }

    #[inline]
    fn advance<F>(&self, carve: F) -> Option<usize>
    where
        F: Fn(usize) -> Option<(usize, usize)>,
    {
        let (start, end) = carve(self.0.get())?;
        self.0.set(end);
        Some(start)
    }

    fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }
}

/// Lock-free cursor for multi-writer arenas.
///
/// Claims are a compare-and-swap loop: a writer that loses a race re-reads
/// the cursor and recomputes its region. Lock-free but not wait-free; there is
/// no backoff.
#[derive(Debug)]
pub struct AtomicCursor(AtomicUsize);

impl sealed::Sealed for AtomicCursor {}

impl Cursor for AtomicCursor {
    fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn advance<F>(&self, carve: F) -> Option<usize>
    where
        F: Fn(usize) -> Option<(usize, usize)>,
    {
        let mut offset = self.0.load(Ordering::Acquire);
        loop {
            let (start, end) = carve(offset)?;
            match self
                .0
                .compare_exchange_weak(offset, end, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(start),
                // Raced with another writer.
                Err(observed) => offset = observed,
            }
        }
    }

    fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }
}

/// Concurrency mode of an arena, fixed at the type level.
///
/// Implemented by [`SingleWriter`] and [`MultiWriter`] only.
pub trait Mode: sealed::Sealed {
    /// Cursor type used by every component.
    type Cursor: Cursor;

    /// Lock serializing growth of the component list.
    type Lock: Default;

    /// Human-readable mode name, used in `Debug` output.
    const NAME: &'static str;

    /// Enters the growth critical section; it ends when the guard drops.
    fn lock(lock: &Self::Lock) -> impl Sized;
}

/// One thread of control allocates and resets; no internal synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleWriter {}

impl sealed::Sealed for SingleWriter {}

impl Mode for SingleWriter {
    type Cursor = LocalCursor;
    type Lock = ();

    const NAME: &'static str = "single-writer";

    #[inline]
    fn lock(_lock: &Self::Lock) -> impl Sized {}
}

/// Any number of threads allocate concurrently.
///
/// The fast path is a lock-free cursor bump; growth is serialized by a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiWriter {}

impl sealed::Sealed for MultiWriter {}

impl Mode for MultiWriter {
    type Cursor = AtomicCursor;
    type Lock = Mutex<()>;

    const NAME: &'static str = "multi-writer";

    fn lock(lock: &Self::Lock) -> impl Sized {
        lock.lock()
    }
}
