//! Placement of the control block and the data region.
//!
//! The control block occupies the start of the region. Its first half belongs to the consumer
//! and its second half, beginning with the write index, to the producer:
//!
//! ```text
//! 0      4        8            12 (or one cache line)
//! | len  | flags  | read_index | [pad] | write_index | data ...
//! \_______ consumer owned ____/        \_ producer owned ____/
//! ```
//!
//! Without cache maintenance there is no padding. With cache maintenance the write index starts
//! at the next cache line boundary so that neither side ever writes back a line holding the
//! other side's field. The data region begins right after the write index and extends up to the
//! last word boundary of the region.
use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::wire::{self, MAX_LEN, WORD};

bitflags! {
    /// Options stored in the control block.
    ///
    /// Only the low byte holds options, the upper bits of the word store the utilization
    /// counter when that is enabled.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Both sides do not share a coherent data cache.
        const CACHE = 1 << 0;
        /// The producer may rewind both indices of an empty buffer to the region start.
        const FULL_CAPACITY = 1 << 1;
    }
}

/// Mask of the option bits in the flags word.
pub(crate) const FLAGS_MASK: u32 = 0xFF;
/// Offset of the utilization counter in the flags word.
pub(crate) const UTILIZATION_SHIFT: u32 = 8;
/// The largest value the utilization counter can hold.
#[cfg_attr(not(feature = "utilization"), allow(dead_code))]
pub(crate) const UTILIZATION_MAX: u32 = (1 << 24) - 1;

/// Configuration of a buffer, which must be identical on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Config {
    flags: Flags,
    cache_line: usize,
}

/// Byte offsets of all parts of an initialized region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    flags: Flags,
    /// Required alignment of the region base.
    align: usize,
    write_index: usize,
    data: usize,
    data_len: usize,
}

impl Config {
    /// A configuration for sides sharing coherent memory.
    pub const fn new() -> Self {
        Config {
            flags: Flags::empty(),
            cache_line: WORD,
        }
    }

    /// Enable cache maintenance with the given line width.
    ///
    /// The width must be the larger of the data cache lines of both sides.
    pub const fn with_cache_line(self, line: usize) -> Self {
        Config {
            flags: self.flags.union(Flags::CACHE),
            cache_line: line,
        }
    }

    /// Allow a packet to occupy all of an empty buffer.
    ///
    /// Without this option, the largest packet that is guaranteed to fit into an empty buffer is
    /// only about half its capacity since the indices may rest anywhere. With it, the producer
    /// rewinds both indices to the region start when it finds the buffer empty and the consumer
    /// reports when it has drained the buffer (see [`FreeStatus::Empty`]).
    ///
    /// [`FreeStatus::Empty`]: crate::consumer::FreeStatus::Empty
    ///
    /// # Safety
    ///
    /// The rewind writes the read index, which otherwise belongs to the consumer. It is based on
    /// nothing but the observation that both indices are equal. The caller must guarantee that the
    /// consumer does not run `claim` or `free` while the producer runs `alloc` on an empty
    /// buffer, for example by having the consumer stop polling after a `FreeStatus::Empty` until
    /// it is notified of new data.
    pub const unsafe fn allow_full_capacity(self) -> Self {
        Config {
            flags: self.flags.union(Flags::FULL_CAPACITY),
            cache_line: self.cache_line,
        }
    }

    /// The options that will be stored in the control block.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Compute the layout for a region of `len` bytes.
    pub fn layout(&self, len: usize) -> Result<Layout> {
        let align = if self.flags.contains(Flags::CACHE) {
            if !self.cache_line.is_power_of_two() || self.cache_line < WORD {
                pbuf_debug!("invalid cache line width {}", self.cache_line);
                return Err(Error::Misconfigured);
            }
            self.cache_line
        } else {
            WORD
        };

        // Consumer fields: len, flags, read_index.
        let consumer_end = 3*WORD;
        let write_index = wire::align_up(consumer_end, align);
        let data = write_index + WORD;

        let data_len = wire::align_down(len.saturating_sub(data), WORD);
        if data_len < 2*WORD || data_len > u32::max_value() as usize {
            return Err(Error::Misconfigured);
        }

        Ok(Layout {
            flags: self.flags,
            align,
            write_index,
            data,
            data_len,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Layout {
    /// The options of this buffer.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Whether cache maintenance is performed.
    pub fn cached(&self) -> bool {
        self.flags.contains(Flags::CACHE)
    }

    /// Whether the producer may rewind an empty buffer.
    pub fn full_capacity(&self) -> bool {
        self.flags.contains(Flags::FULL_CAPACITY)
    }

    /// Required alignment of the region base address.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Offset of the total length field.
    pub fn len_offset(&self) -> usize {
        0
    }

    /// Offset of the flags field.
    pub fn flags_offset(&self) -> usize {
        WORD
    }

    /// Offset of the read index.
    pub fn read_index_offset(&self) -> usize {
        2*WORD
    }

    /// Offset of the write index.
    pub fn write_index_offset(&self) -> usize {
        self.write_index
    }

    /// Offset of the data region.
    pub fn data_offset(&self) -> usize {
        self.data
    }

    /// Length of the data region, the modulus of both indices.
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Number of bytes in the region that are used.
    pub fn region_len(&self) -> usize {
        self.data + self.data_len
    }

    /// Usable bytes of the data region.
    ///
    /// One word is held back so that a full buffer can be told apart from an empty one.
    pub fn capacity(&self) -> usize {
        self.data_len - WORD
    }

    /// The largest packet that will surely fit into an empty buffer.
    pub fn max_packet_size(&self) -> usize {
        let capacity = self.capacity();
        let max = if self.full_capacity() {
            capacity - WORD
        } else {
            // The empty buffer may rest at any offset, only one half can be relied upon.
            let half = wire::align_down((capacity - WORD) / 2, WORD);
            half.saturating_sub(WORD)
        };

        max.min(MAX_LEN - 1)
    }
}
