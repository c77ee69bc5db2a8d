use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Buffer, BufferSupplier, HeapSupplier};

/// Heap supplier that counts every request and release.
#[derive(Default)]
struct CountingSupplier {
    requests: AtomicUsize,
    releases: AtomicUsize,
    outstanding: AtomicUsize,
}

impl CountingSupplier {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl BufferSupplier for CountingSupplier {
    fn request(&self, minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let buffer = HeapSupplier.request(minimal_size, requested_size)?;
        self.outstanding.fetch_add(buffer.len(), Ordering::SeqCst);
        Some(buffer)
    }

    fn release(&self, buffer: Buffer) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.outstanding.fetch_sub(buffer.len(), Ordering::SeqCst);
        HeapSupplier.release(buffer);
    }
}

/// Supplier that never hands out more than `limit` bytes per block.
struct ShrinkingSupplier {
    limit: usize,
}

impl BufferSupplier for ShrinkingSupplier {
    fn request(&self, _minimal_size: usize, requested_size: usize) -> Option<Buffer> {
        HeapSupplier.request(0, requested_size.min(self.limit))
    }

    fn release(&self, buffer: Buffer) {
        HeapSupplier.release(buffer);
    }
}

fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
    // SAFETY: callers pass a live arena allocation of `len` bytes.
    unsafe { ptr.as_ptr().write_bytes(byte, len) };
}

fn holds(ptr: NonNull<u8>, len: usize, byte: u8) -> bool {
    // SAFETY: callers pass a live, initialized arena allocation of `len` bytes.
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
        .iter()
        .all(|&b| b == byte)
}

fn is_aligned(ptr: NonNull<u8>, align: usize) -> bool {
    ptr.as_ptr().addr() % align == 0
}

mod properties;
