//! The error type shared by all buffer operations.
use core::fmt;

/// The result type of buffer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong with a buffer operation.
///
/// None of these are retried internally. `Exhausted` and `NotReady` are the expected outcomes of
/// polling a busy or idle buffer, the others signal a violated contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The memory region can not hold a buffer with the requested configuration.
    ///
    /// Returned when the region is misaligned or too small, when the cache line width is not a
    /// power of two, or when attaching to a region whose control block does not match the
    /// expected configuration.
    Misconfigured,

    /// The requested length is zero or not below [`MAX_LEN`](crate::wire::MAX_LEN).
    ///
    /// Also returned when committing more bytes than were reserved.
    BadSize,

    /// Not enough free space for even the smallest packet.
    ///
    /// Space is freed as the consumer catches up, so it makes sense to try again later.
    Exhausted,

    /// No committed packet is available yet.
    NotReady,

    /// The destination buffer is smaller than the pending packet.
    ///
    /// The packet was not consumed and can be read with a larger buffer.
    BufferTooSmall,

    /// The operation was not permitted in the current state.
    ///
    /// Returned when freeing a packet that is not the currently claimed one, or when committing
    /// without a prior allocation.
    Illegal,

    /// A record in the data region has an impossible header, or an index points outside of it.
    ///
    /// This indicates memory corruption or that both sides disagree on the layout.
    Malformed,

    /// Utilization tracking was not compiled in.
    Unsupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Error::Misconfigured => "memory region does not fit the buffer configuration",
            Error::BadSize => "invalid packet length",
            Error::Exhausted => "no space left in buffer",
            Error::NotReady => "no packet available",
            Error::BufferTooSmall => "destination smaller than pending packet",
            Error::Illegal => "operation not permitted in current state",
            Error::Malformed => "malformed record header or index",
            Error::Unsupported => "utilization tracking not enabled",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
