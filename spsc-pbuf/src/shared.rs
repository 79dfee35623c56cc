//! Raw access to the shared region.
//!
//! Everything that touches the memory of a buffer goes through here. The region is addressed by
//! byte offsets, either of control block fields or into the data region, and never by references
//! that outlive a single operation. Index fields are only accessed atomically, which is how the
//! two sides order their accesses to the data region in between.
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::cache::CacheOps;
use crate::error::{Error, Result};
use crate::layout::{Flags, Layout, FLAGS_MASK};
use crate::wire::{RecordHeader, WORD};

/// One side's access to a buffer region.
pub(crate) struct Shared<'r, C> {
    base: NonNull<u8>,
    layout: Layout,
    cache: C,
    region: PhantomData<&'r mut [u8]>,
}

// SAFETY: the region is only accessed through the operations of one side, which restrict
// themselves to fields and data owned by that side (or atomic accesses).
unsafe impl<C: Send> Send for Shared<'_, C> {}

impl<'r, C: CacheOps> Shared<'r, C> {
    /// Take over a region for the given layout.
    ///
    /// Fails if the region is too short or misaligned for the layout.
    pub(crate) fn new(region: &'r mut [u8], layout: Layout, cache: C) -> Result<Self> {
        if region.len() < layout.region_len() {
            return Err(Error::Misconfigured);
        }

        if region.as_ptr() as usize % layout.align() != 0 {
            pbuf_debug!("region at {:p} not aligned to {}", region.as_ptr(), layout.align());
            return Err(Error::Misconfigured);
        }

        Ok(Shared {
            base: NonNull::from(region).cast(),
            layout,
            cache,
            region: PhantomData,
        })
    }

    /// Create a second handle to the same region.
    ///
    /// Safety: the two handles must then be used by different sides only.
    pub(crate) unsafe fn duplicate(&self) -> Self where C: Clone {
        Shared {
            base: self.base,
            layout: self.layout,
            cache: self.cache.clone(),
            region: PhantomData,
        }
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Write a pristine control block.
    pub(crate) fn format(&self) {
        let flags = self.layout.flags().bits();
        self.word(self.layout.len_offset()).store(self.layout.data_len() as u32, Ordering::Relaxed);
        self.word(self.layout.flags_offset()).store(flags, Ordering::Relaxed);
        self.word(self.layout.read_index_offset()).store(0, Ordering::Relaxed);
        self.word(self.layout.write_index_offset()).store(0, Ordering::Release);
        self.flush(0, self.layout.data_offset());
    }

    /// Read the static part of the control block, as initialized by the other side.
    pub(crate) fn stored_config(&self) -> (usize, Flags) {
        self.invalidate(0, self.layout.read_index_offset());
        let len = self.word(self.layout.len_offset()).load(Ordering::Acquire);
        let flags = self.word(self.layout.flags_offset()).load(Ordering::Acquire);
        (len as usize, Flags::from_bits_retain(flags & FLAGS_MASK))
    }

    pub(crate) fn load_read_index(&self) -> Result<usize> {
        self.load_index(self.layout.read_index_offset())
    }

    pub(crate) fn load_write_index(&self) -> Result<usize> {
        self.load_index(self.layout.write_index_offset())
    }

    /// Load an index written by either side.
    ///
    /// The value comes from shared memory and is only trusted once it is a word aligned offset
    /// into the data region. All offsets derived from it stay in bounds from there on.
    fn load_index(&self, offset: usize) -> Result<usize> {
        self.invalidate(offset, WORD);
        let index = self.word(offset).load(Ordering::Acquire) as usize;
        if index >= self.layout.data_len() || index % WORD != 0 {
            pbuf_debug!("index {} at offset {} is outside the data region", index, offset);
            return Err(Error::Malformed);
        }

        Ok(index)
    }

    pub(crate) fn store_read_index(&self, index: usize) {
        debug_assert!(index < self.layout.data_len());
        let offset = self.layout.read_index_offset();
        self.word(offset).store(index as u32, Ordering::Release);
        self.flush(offset, WORD);
    }

    pub(crate) fn store_write_index(&self, index: usize) {
        debug_assert!(index < self.layout.data_len());
        let offset = self.layout.write_index_offset();
        self.word(offset).store(index as u32, Ordering::Release);
        self.flush(offset, WORD);
    }

    /// Get the current high-water mark of bytes in use.
    pub(crate) fn utilization(&self) -> Result<usize> {
        if cfg!(feature = "utilization") {
            let offset = self.layout.flags_offset();
            self.invalidate(offset, WORD);
            let flags = self.word(offset).load(Ordering::Acquire);
            Ok((flags >> crate::layout::UTILIZATION_SHIFT) as usize)
        } else {
            Err(Error::Unsupported)
        }
    }

    /// Raise the high-water mark, consumer only.
    #[cfg(feature = "utilization")]
    pub(crate) fn record_utilization(&self, in_use: usize) {
        use crate::layout::{UTILIZATION_MAX, UTILIZATION_SHIFT};

        let offset = self.layout.flags_offset();
        let word = self.word(offset);
        let flags = word.load(Ordering::Relaxed);
        let in_use = (in_use as u32).min(UTILIZATION_MAX);
        if in_use > flags >> UTILIZATION_SHIFT {
            word.store((flags & FLAGS_MASK) | (in_use << UTILIZATION_SHIFT), Ordering::Relaxed);
            self.flush(offset, WORD);
        }
    }

    #[cfg(not(feature = "utilization"))]
    pub(crate) fn record_utilization(&self, _: usize) { }

    /// Read the record header at a data offset, bypassing the cache.
    pub(crate) fn read_header(&self, at: usize) -> Result<RecordHeader> {
        debug_assert!(at + WORD <= self.layout.data_len());
        let mut bytes = [0; WORD];
        self.invalidate_data(at, WORD);
        // SAFETY: in bounds of the data region, checked by `new`.
        unsafe { ptr::copy_nonoverlapping(self.data_ptr(at), bytes.as_mut_ptr(), WORD) };
        RecordHeader::decode(bytes)
    }

    /// Write a record header at a data offset.
    ///
    /// Safety: the offset must lie in the unpublished part of the data region, owned by the
    /// producer.
    pub(crate) unsafe fn write_header(&self, at: usize, header: RecordHeader) {
        debug_assert!(at + WORD <= self.layout.data_len());
        let bytes = header.encode();
        ptr::copy_nonoverlapping(bytes.as_ptr(), self.data_ptr(at), WORD);
    }

    /// Borrow bytes of the data region.
    ///
    /// Safety: the range must be a published record that is not freed while borrowed.
    pub(crate) unsafe fn data(&self, at: usize, len: usize) -> &[u8] {
        debug_assert!(at + len <= self.layout.data_len());
        core::slice::from_raw_parts(self.data_ptr(at), len)
    }

    /// Mutably borrow bytes of the data region.
    ///
    /// Safety: the range must be in the unpublished part of the data region.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self, at: usize, len: usize) -> &mut [u8] {
        debug_assert!(at + len <= self.layout.data_len());
        core::slice::from_raw_parts_mut(self.data_ptr(at), len)
    }

    pub(crate) fn flush_data(&self, at: usize, len: usize) {
        self.flush(self.layout.data_offset() + at, len)
    }

    pub(crate) fn invalidate_data(&self, at: usize, len: usize) {
        self.invalidate(self.layout.data_offset() + at, len)
    }

    fn flush(&self, offset: usize, len: usize) {
        if self.layout.cached() {
            // SAFETY: callers only pass ranges inside the region.
            let addr = unsafe { self.base.as_ptr().add(offset) };
            self.cache.flush(addr, len);
        }
    }

    fn invalidate(&self, offset: usize, len: usize) {
        if self.layout.cached() {
            // SAFETY: callers only pass ranges inside the region.
            let addr = unsafe { self.base.as_ptr().add(offset) };
            self.cache.invalidate(addr, len);
        }
    }

    fn data_ptr(&self, at: usize) -> *mut u8 {
        // SAFETY: the data region is inside the region, checked by `new`.
        unsafe { self.base.as_ptr().add(self.layout.data_offset() + at) }
    }

    fn word(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % WORD == 0 && offset < self.layout.data_offset());
        // SAFETY: control block fields are in bounds and word aligned since the base is at least
        // word aligned. The memory is only ever accessed atomically as long as the buffer lives.
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU32) }
    }
}
