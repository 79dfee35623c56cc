//! The reading side of a buffer.
//!
//! Packets are received in two phases, mirroring the producer. [`claim`] locates the oldest
//! committed packet and returns a [`Packet`] token for it, without moving the read index. Its
//! payload can be inspected in place with [`payload`]. Then [`free`] releases the packet by
//! moving the read index past it, which returns the space to the producer.
//!
//! [`claim`]: struct.Consumer.html#method.claim
//! [`payload`]: struct.Consumer.html#method.payload
//! [`free`]: struct.Consumer.html#method.free
use crate::cache::CacheOps;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shared::Shared;
use crate::wire::{self, RecordHeader, WORD};

/// The consumer handle of a buffer.
///
/// Owns the read index. Obtained from [`PacketBuffer`](crate::PacketBuffer).
pub struct Consumer<'r, C> {
    shared: Shared<'r, C>,
    /// The packet returned by the last `claim`.
    claimed: Option<Packet>,
}

/// A claimed packet in the data region.
///
/// This is only a token, the payload is accessed through [`Consumer::payload`]. It stays valid
/// until it is freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Packet {
    /// Offset of the record header.
    at: usize,
    len: usize,
}

/// The state of the buffer after freeing a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FreeStatus {
    /// More packets may be available.
    Pending,

    /// The buffer has been drained.
    ///
    /// Only reported for buffers allowing full capacity packets. Since the producer may then
    /// rewind the buffer at any time, the consumer must not poll it again until it has been
    /// notified of new data.
    Empty,
}

/// The result of a successful `read`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Received {
    /// Number of bytes copied.
    pub len: usize,
    /// Whether another packet was pending right after.
    ///
    /// Always `false` once a buffer allowing full capacity packets has been drained, see
    /// [`FreeStatus::Empty`].
    pub more: bool,
}

impl Packet {
    /// The length of the payload.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload is empty, which is never the case for a committed packet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'r, C: CacheOps> Consumer<'r, C> {
    pub(crate) fn new(shared: Shared<'r, C>) -> Self {
        Consumer {
            shared,
            claimed: None,
        }
    }

    /// The layout of the region.
    pub fn layout(&self) -> &Layout {
        self.shared.layout()
    }

    /// Usable bytes of the data region.
    pub fn capacity(&self) -> usize {
        self.layout().capacity()
    }

    /// The largest packet that will surely fit into an empty buffer.
    pub fn max_packet_size(&self) -> usize {
        self.layout().max_packet_size()
    }

    /// The largest number of bytes ever in use at once.
    ///
    /// This is updated on every `free`. Returns `Err(Error::Unsupported)` unless the
    /// `utilization` feature is enabled.
    pub fn utilization(&self) -> Result<usize> {
        self.shared.utilization()
    }

    /// Check if there is no committed packet.
    ///
    /// Fails with `Error::Malformed` if an index in the control block is corrupted.
    pub fn is_empty(&self) -> Result<bool> {
        let write = self.shared.load_write_index()?;
        Ok(self.shared.load_read_index()? == write)
    }

    /// Find the oldest committed packet.
    ///
    /// Returns `Ok(None)` if the buffer is empty. Claiming again before `free` returns the same
    /// packet. Fails with `Error::Malformed` if the record found or one of the indices is not
    /// valid.
    pub fn claim(&mut self) -> Result<Option<Packet>> {
        self.claimed = None;
        let write = self.shared.load_write_index()?;
        let mut read = self.shared.load_read_index()?;

        if read == write {
            pbuf_trace!("nothing to claim at {}", read);
            return Ok(None);
        }

        let mut header = self.shared.read_header(read)?;
        if header == RecordHeader::Padding {
            pbuf_trace!("skipping wrap padding at {}", read);
            read = 0;
            if read == write {
                return Err(Error::Malformed);
            }
            header = self.shared.read_header(read)?;
        }

        let len = match header {
            RecordHeader::Packet(len) => len,
            // Two padding records in a row.
            RecordHeader::Padding => return Err(Error::Malformed),
        };

        let data_len = self.layout().data_len();
        let record = wire::record_len(len);
        if record > occupied(data_len, read, write) || read + record > data_len {
            pbuf_debug!("record of {} bytes at {} overruns write index {}", len, read, write);
            return Err(Error::Malformed);
        }

        self.shared.invalidate_data(read + WORD, len);
        let packet = Packet { at: read, len };
        self.claimed = Some(packet);
        Ok(Some(packet))
    }

    /// Access the payload of the claimed packet.
    ///
    /// Fails with `Error::Illegal` if the packet is not the currently claimed one.
    pub fn payload(&self, packet: &Packet) -> Result<&[u8]> {
        if self.claimed.as_ref() != Some(packet) {
            return Err(Error::Illegal);
        }

        // SAFETY: the record is published and stays so until it is freed, which requires a
        // mutable borrow of `self`.
        Ok(unsafe { self.shared.data(packet.at + WORD, packet.len) })
    }

    /// Release the claimed packet.
    ///
    /// Fails with `Error::Illegal`, without modifying the buffer, if the packet is not the
    /// currently claimed one.
    pub fn free(&mut self, packet: Packet) -> Result<FreeStatus> {
        if self.claimed != Some(packet) {
            pbuf_debug!("freeing unclaimed packet at {}", packet.at);
            return Err(Error::Illegal);
        }

        let data_len = self.layout().data_len();
        let write = self.shared.load_write_index()?;
        let in_use = occupied(data_len, self.shared.load_read_index()?, write);

        let mut read = packet.at + wire::record_len(packet.len);
        if read == data_len {
            read = 0;
        }

        // Pass over a padding record right away, so that the read index always points to a
        // packet record or to the write index. The packet itself was fine, a malformed record
        // after it is left in place for the next `claim` to report.
        if read != write {
            match self.shared.read_header(read) {
                Ok(RecordHeader::Padding) => read = 0,
                Ok(RecordHeader::Packet(_)) | Err(_) => {},
            }
        }

        self.shared.store_read_index(read);
        self.shared.record_utilization(in_use);
        self.claimed = None;

        if self.layout().full_capacity() && read == write {
            Ok(FreeStatus::Empty)
        } else {
            Ok(FreeStatus::Pending)
        }
    }

    /// Copy the oldest packet out of the buffer.
    ///
    /// Fails with `Error::NotReady` if there is no packet and with `Error::BufferTooSmall` if
    /// the packet does not fit into `buffer`. In the latter case the packet stays in the buffer.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<Received> {
        let packet = self.claim()?.ok_or(Error::NotReady)?;
        let len = packet.len();
        if buffer.len() < len {
            return Err(Error::BufferTooSmall);
        }

        buffer[..len].copy_from_slice(self.payload(&packet)?);
        let more = match self.free(packet)? {
            // The producer may be rewinding right now, the indices must not be looked at again.
            FreeStatus::Empty => false,
            // The packet is gone either way. Report a corrupted index with the next call.
            FreeStatus::Pending => self.is_empty().map_or(true, |empty| !empty),
        };

        Ok(Received { len, more })
    }

    /// The length of the oldest packet, without consuming it.
    pub fn pending_len(&mut self) -> Result<Option<usize>> {
        Ok(self.claim()?.map(|packet| packet.len()))
    }
}

/// Bytes between the read index and the write index.
fn occupied(data_len: usize, read: usize, write: usize) -> usize {
    if read > write {
        data_len - (read - write)
    } else {
        write - read
    }
}
