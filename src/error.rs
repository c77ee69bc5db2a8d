use thiserror::Error;

/// Result type alias for arena allocations.
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons an arena allocation can fail.
///
/// Every variant is an expected, recoverable condition. Caller bugs such as a
/// non power-of-two alignment are not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The buffer supplier refused to hand out a new buffer.
    #[error("buffer supplier denied a {requested}-byte buffer (needed at least {minimal})")]
    GrowthDenied {
        /// Size the arena asked for.
        requested: usize,
        /// Smallest size that would have satisfied the pending allocation.
        minimal: usize,
    },

    /// The request cannot fit in any buffer this arena is allowed to create.
    #[error("request needs {needed} bytes but buffers are capped at {max_buffer_size}")]
    ExceedsMaxBufferSize {
        /// Bytes needed, including worst-case alignment padding.
        needed: usize,
        /// The arena's maximum buffer size.
        max_buffer_size: usize,
    },

    /// The supplier shrank the new buffer below what the request needs.
    #[error("supplied buffer of {granted} bytes cannot hold {needed} bytes")]
    BufferTooSmall {
        /// Bytes needed, including worst-case alignment padding.
        needed: usize,
        /// Size of the buffer actually supplied.
        granted: usize,
    },

    /// The request size, after padding or multiplying out an array length,
    /// does not fit in `usize`.
    #[error("requested size overflows usize")]
    SizeOverflow,
}
