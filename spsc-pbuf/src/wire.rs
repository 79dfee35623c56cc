//! Representation of records inside the data region.
//!
//! Every record starts with a single header word. For a packet the word holds the payload length
//! and is followed by the payload, padded with zeroes up to the next word boundary. A padding
//! record consists of the header alone and marks the rest of the data region as dead, the reader
//! continues at offset zero.
//!
//! ```text
//! | len: u32 | payload ... | 0-pad |   packet record
//! | 0xFFFF   | (unused until the end of the region) |   padding record
//! ```
//!
//! The header word is stored in native byte order, both sides of a buffer are expected to agree
//! on it. Payload lengths must stay below [`MAX_LEN`], values above are reserved for markers.
use byteorder::{ByteOrder, NativeEndian};

use crate::error::{Error, Result};

/// The width of the header word and of each index.
pub const WORD: usize = core::mem::size_of::<u32>();

/// Exclusive upper bound on the payload length of a single packet.
///
/// As an allocation length it requests the largest span currently available.
pub const MAX_LEN: usize = 0xFF00;

/// Header value of a padding record.
pub const PADDING_MARK: u32 = 0xFFFF;

/// The decoded header word of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordHeader {
    /// A packet with a payload of the given length.
    Packet(usize),
    /// Skip to the start of the data region.
    Padding,
}

impl RecordHeader {
    /// Parse a header word.
    pub fn decode(bytes: [u8; WORD]) -> Result<Self> {
        match NativeEndian::read_u32(&bytes) {
            PADDING_MARK => Ok(RecordHeader::Padding),
            len if len > 0 && (len as usize) < MAX_LEN => Ok(RecordHeader::Packet(len as usize)),
            _ => Err(Error::Malformed),
        }
    }

    /// Create the header word.
    ///
    /// Panics if this is a packet with an invalid length.
    pub fn encode(self) -> [u8; WORD] {
        let value = match self {
            RecordHeader::Padding => PADDING_MARK,
            RecordHeader::Packet(len) => {
                assert!(len > 0 && len < MAX_LEN, "invalid packet length {}", len);
                len as u32
            },
        };

        let mut bytes = [0; WORD];
        NativeEndian::write_u32(&mut bytes, value);
        bytes
    }

    /// The number of bytes the record occupies in the data region.
    ///
    /// Padding records report only their header, they implicitly extend to the end of the region.
    pub fn record_len(self) -> usize {
        match self {
            RecordHeader::Packet(len) => record_len(len),
            RecordHeader::Padding => WORD,
        }
    }
}

/// Size of a packet record including its header and alignment padding.
pub fn record_len(payload: usize) -> usize {
    WORD + align_up(payload, WORD)
}

/// Round up to a multiple of the power-of-two `align`.
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Round down to a multiple of the power-of-two `align`.
pub fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}
