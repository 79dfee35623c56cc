//! A packet buffer for passing messages between two cores through plain shared memory.
//!
//! ## Table of contents
//!
//! 1. [Highlights](#highlights)
//! 2. [Design](#design-and-relevant-core-concepts)
//! 3. [Memory layout](layout/index.html)
//! 4. [Records](wire/index.html)
//! 5. [Cache maintenance](cache/index.html)
//! 6. [Producing](producer/index.html) and [consuming](consumer/index.html)
//!
//! ## Highlights
//!
//! * Variable length packets, processed in place without copies if desired.
//! * No locks, no allocation, no blocking. Every operation is bounded and returns immediately.
//! * Works across cores without cache coherency, with the cache routines of your platform.
//!
//! ## Design and relevant core concepts
//!
//! The buffer lives entirely inside a memory region that the caller provides. Its start holds a
//! small control block, the rest is a circular data area. The control block is split in two
//! halves: the first one, holding the read index, is only ever written by the consumer while the
//! second one, holding the write index, is only ever written by the producer. With cache
//! maintenance enabled the two halves are padded apart to land on different cache lines.
//!
//! The two sides are modelled as two distinct handles, [`Producer`] and [`Consumer`]. Each of
//! them may only mutate its own half. Sending a packet is a two-phase operation: reserve space
//! with [`Producer::alloc`], fill it, publish it with [`Producer::commit`]. Receiving mirrors
//! this: [`Consumer::claim`] finds the oldest packet without moving the read index, and
//! [`Consumer::free`] releases it afterwards. The copying wrappers [`Producer::write`] and
//! [`Consumer::read`] combine both phases.
//!
//! There is no notification mechanism. Whatever doorbell, interrupt or polling loop signals the
//! other side that data or space became available is up to the caller, as is any retry policy.
//!
//! ```
//! use spsc_pbuf::{Config, NoCache, PacketBuffer};
//!
//! // 16 bytes of control block followed by a 64 byte data region.
//! let mut memory = [0u32; 20];
//! let region = spsc_pbuf::region_of_words(&mut memory);
//! let buffer = PacketBuffer::init(region, Config::new(), NoCache).unwrap();
//! assert_eq!(buffer.capacity(), 60);
//!
//! let (mut producer, mut consumer) = buffer.split();
//! assert_eq!(producer.write(b"HELLO"), Ok(5));
//!
//! let mut out = [0; 16];
//! let received = consumer.read(&mut out).unwrap();
//! assert_eq!(&out[..received.len], b"HELLO");
//! assert!(!received.more);
//! ```
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;
pub mod buffer;
pub mod cache;
pub mod consumer;
pub mod error;
pub mod layout;
pub mod producer;
mod shared;
pub mod wire;

#[cfg(test)]
mod tests;

pub use self::buffer::PacketBuffer;
pub use self::cache::{CacheOps, FnCache, NoCache};
pub use self::consumer::{Consumer, FreeStatus, Packet, Received};
pub use self::error::{Error, Result};
pub use self::layout::{Config, Flags, Layout};
pub use self::producer::Producer;

/// View a word array as the byte region of a buffer.
///
/// A convenient way to get a suitably aligned region on the stack or in a static when cache
/// maintenance is not required.
pub fn region_of_words(words: &mut [u32]) -> &mut [u8] {
    let len = core::mem::size_of_val(words);
    // SAFETY: u8 has no alignment or validity requirements and the length covers exactly the
    // memory of the borrowed words.
    unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, len) }
}
