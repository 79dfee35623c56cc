//! Setting up a buffer in a memory region.
use crate::cache::{CacheOps, NoCache};
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::layout::{Config, Layout};
use crate::producer::Producer;
use crate::shared::Shared;

/// A packet buffer placed in a memory region, before it is handed to its users.
///
/// The region is formatted once, by whichever side owns it, with [`init`]. A side that receives
/// an already formatted region, for example the second core of a shared memory pair, uses
/// [`attach`] instead. Afterwards the buffer is converted into the handle of the role the side
/// plays, or [`split`] into both if producer and consumer live in the same address space.
///
/// [`init`]: #method.init
/// [`attach`]: #method.attach
/// [`split`]: #method.split
pub struct PacketBuffer<'r, C = NoCache> {
    shared: Shared<'r, C>,
}

impl<'r, C: CacheOps> PacketBuffer<'r, C> {
    /// Format a region as an empty buffer.
    ///
    /// The region must be aligned to a word, or to the cache line when cache maintenance is
    /// configured. Any bytes after the last word boundary are left unused.
    ///
    /// The control block is placed inside the region, in front of the data region. All sizes
    /// reported by the buffer, [`capacity`] and [`max_packet_size`] included, are measured
    /// against the data region only. A region of 80 bytes without cache maintenance, for
    /// example, has a data region of 64 bytes and a capacity of 60.
    ///
    /// [`capacity`]: #method.capacity
    /// [`max_packet_size`]: #method.max_packet_size
    pub fn init(region: &'r mut [u8], config: Config, cache: C) -> Result<Self> {
        let layout = config.layout(region.len())?;
        let shared = Shared::new(region, layout, cache)?;
        shared.format();
        pbuf_debug!("initialized buffer with {} data bytes, flags {:?}",
            layout.data_len(), layout.flags());
        Ok(PacketBuffer { shared })
    }

    /// Use a region that was already formatted by the other side.
    ///
    /// The configuration must be the same that the region was initialized with. The stored
    /// control block is validated against it, including the length of the data region, so that
    /// both sides are guaranteed to agree on the layout.
    pub fn attach(region: &'r mut [u8], config: Config, cache: C) -> Result<Self> {
        let layout = config.layout(region.len())?;
        let shared = Shared::new(region, layout, cache)?;
        let (len, flags) = shared.stored_config();

        if len != layout.data_len() || flags != layout.flags() {
            pbuf_debug!("stored control block ({}, {:?}) does not match ({}, {:?})",
                len, flags, layout.data_len(), layout.flags());
            return Err(Error::Misconfigured);
        }

        Ok(PacketBuffer { shared })
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
    /// Returns `Err(Error::Unsupported)` unless the `utilization` feature is enabled.
    pub fn utilization(&self) -> Result<usize> {
        self.shared.utilization()
    }

    /// Use the buffer as its producer.
    pub fn into_producer(self) -> Producer<'r, C> {
        Producer::new(self.shared)
    }

    /// Use the buffer as its consumer.
    pub fn into_consumer(self) -> Consumer<'r, C> {
        Consumer::new(self.shared)
    }

    /// Get both sides of the buffer.
    ///
    /// The two handles can be moved to different threads.
    pub fn split(self) -> (Producer<'r, C>, Consumer<'r, C>) where C: Clone {
        // SAFETY: one handle goes to each side.
        let consumer = unsafe { self.shared.duplicate() };
        (Producer::new(self.shared), Consumer::new(consumer))
    }
}
