//! Region ("arena") allocator for byte blobs and typed objects.
//!
//! `region-arena` hands out memory from a chain of buffers by bumping a
//! cursor, and reclaims it only in bulk. It suits workloads that make many
//! small allocations tied to one unit of work (a query, a batch, a request)
//! and then drop them all at once.
//!
//! # Arena types
//!
//! - [`Arena`] — single writer, no internal synchronization (`Send`)
//! - [`ThreadSafeArena`] — many writers, lock-free fast path (`Send + Sync`)
//!
//! Both are [`ArenaCore`] instantiated with a [`Mode`](mode::Mode); the
//! algorithm is shared and only the synchronization differs.
//!
//! # Key properties
//!
//! - **Stable pointers**: nothing moves until [`reset`](ArenaCore::reset) or drop
//! - **Doubling growth**: each new buffer is twice the previous, up to a cap
//! - **Pluggable memory source**: buffers come from a [`BufferSupplier`], which
//!   may deny requests to enforce a budget; denial surfaces as an [`Error`]
//! - **Cheap reset**: keeps the last buffer, so allocate/reset loops stop
//!   calling the supplier once warmed up
//!
//! # Example
//!
//! ```
//! use std::thread;
//! use region_arena::ThreadSafeArena;
//!
//! let arena = ThreadSafeArena::new(1024, 64 * 1024);
//! thread::scope(|s| {
//!     for t in 0..4u8 {
//!         let arena = &arena;
//!         s.spawn(move || {
//!             let bytes = arena.add_bytes(&[t; 16]).unwrap();
//!             assert_eq!(bytes, &[t; 16]);
//!         });
//!     }
//! });
//! assert!(arena.memory_footprint() >= 64);
//! ```

#![deny(missing_docs)]

mod allocator;
mod arena;
mod component;
mod error;
pub mod mode;
mod supplier;

pub use allocator::ArenaAllocator;
pub use arena::{
    Arena, ArenaCore, DEFAULT_INITIAL_BUFFER_SIZE, DEFAULT_MAX_BUFFER_SIZE, ThreadSafeArena,
};
pub use error::{Error, Result};
pub use supplier::{BLOCK_ALIGN, Buffer, BufferSupplier, HeapSupplier, LimitedSupplier};

#[cfg(test)]
mod tests;
