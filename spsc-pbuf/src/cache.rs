//! Data cache maintenance.
//!
//! When the producer and the consumer run on cores that do not keep their data caches coherent,
//! every byte written by one side must be written back to memory before the other side may see
//! it, and the other side must discard its cached copy before reading. The buffer performs these
//! operations itself at exactly two points: the producer writes back a record before publishing
//! the write index, the consumer invalidates a record after observing the write index.
//!
//! Which instructions do this is up to the platform. The implementation is chosen through a type
//! parameter of the buffer so that the common case of coherent memory, [`NoCache`], compiles to
//! nothing at all.

/// Write back and invalidate ranges of the data cache.
pub trait CacheOps {
    /// Write back all cache lines overlapping the range to memory.
    fn flush(&self, addr: *const u8, len: usize);

    /// Discard all cache lines overlapping the range, the next read goes to memory.
    ///
    /// The buffer only invalidates ranges its own side never writes, so no dirty data is lost.
    fn invalidate(&self, addr: *const u8, len: usize);
}

/// Cache operations for coherent memory, which do nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoCache;

/// Cache operations provided by platform functions.
///
/// Typically these would be the data cache range routines of a vendor HAL or of a kernel.
#[derive(Clone, Copy, Debug)]
pub struct FnCache {
    flush: unsafe fn(*const u8, usize),
    invalidate: unsafe fn(*const u8, usize),
}

impl CacheOps for NoCache {
    #[inline(always)]
    fn flush(&self, _: *const u8, _: usize) { }

    #[inline(always)]
    fn invalidate(&self, _: *const u8, _: usize) { }
}

impl FnCache {
    /// Wrap a pair of platform routines.
    ///
    /// # Safety
    ///
    /// Both functions must be safe to call with any range inside a buffer region, including
    /// ranges that are not aligned to cache lines.
    pub const unsafe fn new(
        flush: unsafe fn(*const u8, usize),
        invalidate: unsafe fn(*const u8, usize),
    ) -> Self {
        FnCache { flush, invalidate }
    }
}

impl CacheOps for FnCache {
    fn flush(&self, addr: *const u8, len: usize) {
        // SAFETY: the caller of `new` promised this is fine for ranges in the region.
        unsafe { (self.flush)(addr, len) }
    }

    fn invalidate(&self, addr: *const u8, len: usize) {
        // SAFETY: the caller of `new` promised this is fine for ranges in the region.
        unsafe { (self.invalidate)(addr, len) }
    }
}

impl<C: CacheOps + ?Sized> CacheOps for &'_ C {
    fn flush(&self, addr: *const u8, len: usize) {
        (**self).flush(addr, len)
    }

    fn invalidate(&self, addr: *const u8, len: usize) {
        (**self).invalidate(addr, len)
    }
}
