//! The writing side of a buffer.
//!
//! Packets are sent in two phases. First [`alloc`] reserves a contiguous span in the data region
//! and hands it out for writing. Nothing is visible to the consumer at this point, and nothing
//! needs to be undone if the packet is abandoned: the next allocation simply reuses the space.
//! Then [`commit`] writes the record header, writes the record back from the cache if required
//! and only then moves the write index past it, which publishes the packet.
//!
//! [`alloc`]: struct.Producer.html#method.alloc
//! [`commit`]: struct.Producer.html#method.commit
use crate::cache::CacheOps;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shared::Shared;
use crate::wire::{self, RecordHeader, MAX_LEN, WORD};

/// The producer handle of a buffer.
///
/// Owns the write index. Obtained from [`PacketBuffer`](crate::PacketBuffer).
pub struct Producer<'r, C> {
    shared: Shared<'r, C>,
    /// The reservation handed out by the last `alloc`.
    pending: Option<Reservation>,
}

/// A span in the data region that was handed out but not yet committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Reservation {
    /// Offset of the record header.
    at: usize,
    /// Number of payload bytes available.
    len: usize,
    /// Offset of a padding record written in front of the wrap.
    padding: Option<usize>,
}

/// A candidate span for a new record.
#[derive(Clone, Copy)]
struct Span {
    at: usize,
    /// Free bytes, a multiple of the word size.
    free: usize,
    wraps: bool,
}

impl<'r, C: CacheOps> Producer<'r, C> {
    pub(crate) fn new(shared: Shared<'r, C>) -> Self {
        Producer {
            shared,
            pending: None,
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

    /// The largest number of bytes ever in use at once, as recorded by the consumer.
    pub fn utilization(&self) -> Result<usize> {
        self.shared.utilization()
    }

    /// Reserve space for a packet of `len` bytes.
    ///
    /// Returns the reserved payload bytes for writing. If the full length is not available then
    /// the largest span that is available is reserved instead, which may be shorter than
    /// requested. Pass [`MAX_LEN`] to ask for the largest span outright. Fails with
    /// `Error::Exhausted` if not even a single byte can be reserved and with `Error::Malformed` if
    /// an index in the control block is corrupted.
    ///
    /// The reservation is published by [`commit`]. Another `alloc` without commit discards the
    /// previous reservation.
    ///
    /// [`commit`]: #method.commit
    pub fn alloc(&mut self, len: usize) -> Result<&mut [u8]> {
        if len == 0 || len > MAX_LEN {
            return Err(Error::BadSize);
        }

        self.pending = None;
        let data_len = self.layout().data_len();
        let (read, write) = self.indices()?;

        let wanted = wire::record_len(len.min(MAX_LEN - 1));
        let (tail, head) = Self::spans(data_len, read, write);

        let span = if len < MAX_LEN && tail.free >= wanted {
            tail
        } else if len < MAX_LEN && head.free >= wanted {
            head
        } else if head.free > tail.free {
            head
        } else {
            tail
        };

        // The span must hold the header and at least one payload byte, i.e. two words.
        if span.free <= WORD {
            return Err(Error::Exhausted);
        }

        let payload = (span.free - WORD).min(len).min(MAX_LEN - 1);
        let padding = if span.wraps {
            pbuf_trace!("wrap padding at {}", write);
            // SAFETY: the tail from the write index on is unpublished.
            unsafe { self.shared.write_header(write, RecordHeader::Padding) };
            Some(write)
        } else {
            None
        };

        self.pending = Some(Reservation {
            at: span.at,
            len: payload,
            padding,
        });

        // SAFETY: the span is unpublished and no longer than its free space.
        Ok(unsafe { self.shared.data_mut(span.at + WORD, payload) })
    }

    /// Publish the packet reserved by the last `alloc`.
    ///
    /// The `len` is the number of bytes actually written, it must not be larger than the
    /// reservation. A length of zero drops the reservation without sending anything.
    pub fn commit(&mut self, len: usize) -> Result<()> {
        let reservation = match self.pending {
            Some(reservation) => reservation,
            None => return Err(Error::Illegal),
        };

        if len > reservation.len {
            return Err(Error::BadSize);
        }

        self.pending = None;
        if len == 0 {
            return Ok(());
        }

        let Reservation { at, padding, .. } = reservation;
        let record = wire::record_len(len);
        // SAFETY: the reservation is still unpublished, the write index did not move. The
        // alignment padding is part of the span the reservation was cut from.
        unsafe {
            self.shared.data_mut(at + WORD + len, record - WORD - len).fill(0);
            self.shared.write_header(at, RecordHeader::Packet(len));
        }

        self.shared.flush_data(at, record);
        if let Some(padding) = padding {
            self.shared.flush_data(padding, WORD);
        }

        let mut write = at + record;
        if write == self.layout().data_len() {
            write = 0;
        }

        self.shared.store_write_index(write);
        Ok(())
    }

    /// Copy a packet into the buffer.
    ///
    /// Returns the number of bytes written, which is less than the length of `data` if the
    /// buffer did not have enough space for all of it. Fails with `Error::BadSize` if `data` is
    /// empty or not shorter than [`MAX_LEN`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        // `MAX_LEN` only has its special meaning for `alloc`.
        if data.len() >= MAX_LEN {
            return Err(Error::BadSize);
        }

        let buffer = self.alloc(data.len())?;
        let len = buffer.len();
        buffer.copy_from_slice(&data[..len]);
        self.commit(len)?;
        Ok(len)
    }

    /// Load both indices, rewinding an empty buffer if permitted.
    fn indices(&mut self) -> Result<(usize, usize)> {
        let read = self.shared.load_read_index()?;
        let write = self.shared.load_write_index()?;

        if self.layout().full_capacity() && read == write && write != 0 {
            pbuf_trace!("rewinding empty buffer from {}", write);
            // SAFETY: the producer may only touch the read index in this single case. Both indices
            // are equal so the buffer is empty, and `Config::allow_full_capacity` made the caller
            // guarantee that the consumer is not concurrently claiming or freeing.
            self.shared.store_read_index(0);
            self.shared.store_write_index(0);
            return Ok((0, 0));
        }

        Ok((read, write))
    }

    /// The two candidate spans: from the write index on and, after wrapping, from the start.
    ///
    /// A word always stays free in front of the read index, so that the write index can not catch
    /// up with it, which would make a full buffer look empty.
    fn spans(data_len: usize, read: usize, write: usize) -> (Span, Span) {
        if read > write {
            let tail = Span { at: write, free: read - write - WORD, wraps: false };
            let none = Span { at: 0, free: 0, wraps: false };
            return (tail, none);
        }

        let tail_free = if read == 0 {
            // Filling up the end would wrap the write index onto the read index.
            data_len - write - WORD
        } else {
            data_len - write
        };

        let tail = Span { at: write, free: tail_free, wraps: false };
        let head = Span { at: 0, free: read.saturating_sub(WORD), wraps: true };
        (tail, head)
    }
}
