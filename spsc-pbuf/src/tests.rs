//! Scenario tests of producer and consumer working on the same buffer.
use std::collections::VecDeque;

use proptest::prelude::*;

use crate::{region_of_words, Config, Consumer, Error, FreeStatus, NoCache, PacketBuffer, Producer};
use crate::wire::{MAX_LEN, WORD};

/// Words for a 16 byte control block without padding and a 64 byte data region.
const SMALL: usize = 20;

fn split(memory: &mut [u32], config: Config) -> (Producer<'_, NoCache>, Consumer<'_, NoCache>) {
    let region = region_of_words(memory);
    PacketBuffer::init(region, config, NoCache)
        .unwrap()
        .split()
}

fn full_capacity() -> Config {
    // SAFETY: all tests here drive both sides from a single thread.
    unsafe { Config::new().allow_full_capacity() }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn read_vec(consumer: &mut Consumer<'_, NoCache>) -> Result<Vec<u8>, Error> {
    let mut out = vec![0; MAX_LEN];
    let received = consumer.read(&mut out)?;
    out.truncate(received.len);
    Ok(out)
}

/// Move both indices of an empty buffer to `at`.
fn park_at(producer: &mut Producer<'_, NoCache>, consumer: &mut Consumer<'_, NoCache>, at: usize) {
    if at == 0 {
        return;
    }

    assert!(at >= 2*WORD);
    assert_eq!(producer.write(&pattern(at - WORD, 0)), Ok(at - WORD));
    assert_eq!(read_vec(consumer).map(|v| v.len()), Ok(at - WORD));
}

#[test]
fn hello() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());
    assert_eq!(producer.capacity(), 60);
    assert_eq!(producer.max_packet_size(), 24);
    assert_eq!(consumer.capacity(), 60);

    assert_eq!(producer.write(b"HELLO"), Ok(5));

    let mut out = [0; 16];
    let received = consumer.read(&mut out).unwrap();
    assert_eq!(&out[..received.len], b"HELLO");
    assert_eq!(received.len, 5);
    assert!(!received.more);
    assert_eq!(consumer.read(&mut out), Err(Error::NotReady));
}

#[test]
fn round_trip_every_size() {
    for &(words, config) in &[(SMALL, Config::new()), (SMALL, full_capacity()), (70, Config::new())] {
        let mut memory = vec![0u32; words];
        let (mut producer, mut consumer) = split(&mut memory, config);

        for len in 1..=producer.max_packet_size() {
            let data = pattern(len, len as u8);
            assert_eq!(producer.write(&data), Ok(len));
            assert_eq!(read_vec(&mut consumer), Ok(data));
        }
    }
}

#[test]
fn fifo() {
    let mut memory = [0u32; 70];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());

    let packets: Vec<_> = (1..=12).map(|len| pattern(len, 0x40 + len as u8)).collect();
    for packet in &packets {
        assert_eq!(producer.write(packet), Ok(packet.len()));
    }

    for packet in &packets {
        assert_eq!(read_vec(&mut consumer).as_ref(), Ok(packet));
    }

    assert_eq!(consumer.pending_len(), Ok(None));
}

#[test]
fn max_packet_fits_anywhere() {
    for &config in &[Config::new(), full_capacity()] {
        let mut at = 0;
        while at < 64 {
            let mut memory = [0u32; SMALL];
            let (mut producer, mut consumer) = split(&mut memory, config);
            park_at(&mut producer, &mut consumer, at);

            let max = producer.max_packet_size();
            let data = pattern(max, at as u8);
            assert_eq!(producer.write(&data), Ok(max), "parked at {}", at);
            assert_eq!(read_vec(&mut consumer), Ok(data));

            at = if at == 0 { 2*WORD } else { at + WORD };
        }
    }
}

#[test]
fn beyond_max_packet() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());
    park_at(&mut producer, &mut consumer, 32);

    // Only 28 bytes of contiguous space remain at the start, 32 at the end.
    let max = producer.max_packet_size();
    let written = producer.write(&pattern(40, 1)).unwrap();
    assert!(written > max && written < 40);
    assert_eq!(read_vec(&mut consumer), Ok(pattern(written, 1)));

    // Still well defined afterwards.
    assert_eq!(producer.write(b"after"), Ok(5));
    assert_eq!(read_vec(&mut consumer), Ok(b"after".to_vec()));
    assert_eq!(consumer.is_empty(), Ok(true));
}

#[test]
fn oversized_request_never_corrupts() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());
    let max = producer.max_packet_size();
    assert_eq!(producer.write(&pattern(max, 9)), Ok(max));

    match producer.write(&pattern(max + 1, 10)) {
        Ok(written) => {
            assert!(written <= max + 1);
            assert_eq!(read_vec(&mut consumer), Ok(pattern(max, 9)));
            assert_eq!(read_vec(&mut consumer), Ok(pattern(written, 10)));
        },
        Err(err) => {
            assert_eq!(err, Error::Exhausted);
            assert_eq!(read_vec(&mut consumer), Ok(pattern(max, 9)));
        },
    }

    assert_eq!(consumer.read(&mut [0; 64]), Err(Error::NotReady));
    assert_eq!(producer.write(&pattern(max, 11)), Ok(max));
}

#[test]
fn wraparound() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());

    let mut total = 0;
    for round in 0..200usize {
        let len = 1 + (round * 7) % producer.max_packet_size();
        let data = pattern(len, round as u8);
        assert_eq!(producer.write(&data), Ok(len));
        assert_eq!(read_vec(&mut consumer), Ok(data));
        total += len;
    }

    // Crossed the end of the region many times.
    assert!(total > 20 * 64);
}

#[test]
fn wraparound_with_backlog() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());
    let mut expected = VecDeque::new();

    for round in 0..500usize {
        let len = 1 + (round * 5) % 20;
        let data = pattern(len, round as u8);
        loop {
            match producer.write(&data) {
                Ok(written) if written == len => break,
                Ok(written) => {
                    // Truncated, pass it on as is and retry the rest later.
                    expected.push_back(data[..written].to_vec());
                },
                Err(Error::Exhausted) => {},
                Err(err) => panic!("unexpected {:?}", err),
            }
            let got = read_vec(&mut consumer).unwrap();
            assert_eq!(Some(got), expected.pop_front());
        }
        expected.push_back(data);
    }

    while let Some(data) = expected.pop_front() {
        assert_eq!(read_vec(&mut consumer), Ok(data));
    }
}

#[test]
fn padding_skipped_on_free() {
    let mut memory = [0u32; SMALL];
    {
        let (mut producer, mut consumer) = split(&mut memory, Config::new());
        park_at(&mut producer, &mut consumer, 40);

        // 20 bytes at the end (40..60) leave 4 for the padding mark.
        assert_eq!(producer.write(&pattern(16, 1)), Ok(16));
        assert_eq!(producer.write(&pattern(12, 2)), Ok(12));

        let first = consumer.claim().unwrap().unwrap();
        assert_eq!(consumer.free(first), Ok(FreeStatus::Pending));
    }

    // The read index passed over the padding record at 60 directly.
    assert_eq!(memory[2], 0);
    assert_eq!(memory[3], 16);
    assert_eq!(memory[4 + 60/4], 0xFFFF);

    let region = region_of_words(&mut memory);
    let mut consumer = PacketBuffer::attach(region, Config::new(), NoCache)
        .unwrap()
        .into_consumer();
    assert_eq!(read_vec(&mut consumer), Ok(pattern(12, 2)));
}

#[test]
fn full_capacity_rewinds() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, full_capacity());
    assert_eq!(producer.max_packet_size(), 56);

    assert_eq!(producer.write(&pattern(10, 1)), Ok(10));
    let packet = consumer.claim().unwrap().unwrap();
    assert_eq!(consumer.free(packet), Ok(FreeStatus::Empty));

    // Resting at 12, only the whole buffer offers 56 contiguous bytes.
    assert_eq!(producer.write(&pattern(56, 2)), Ok(56));
    let packet = consumer.claim().unwrap().unwrap();
    assert_eq!(consumer.payload(&packet), Ok(&pattern(56, 2)[..]));
    assert_eq!(consumer.free(packet), Ok(FreeStatus::Empty));
}

#[test]
fn full_capacity_pending() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, full_capacity());
    producer.write(b"one").unwrap();
    producer.write(b"two").unwrap();

    let packet = consumer.claim().unwrap().unwrap();
    assert_eq!(consumer.free(packet), Ok(FreeStatus::Pending));
    let packet = consumer.claim().unwrap().unwrap();
    assert_eq!(consumer.free(packet), Ok(FreeStatus::Empty));
}

#[test]
fn cache_padded_layout() {
    #[repr(C, align(64))]
    struct Aligned([u8; 256]);

    let mut memory = Aligned([0; 256]);
    let config = Config::new().with_cache_line(64);
    let buffer = PacketBuffer::init(&mut memory.0[..], config, NoCache).unwrap();
    assert_eq!(buffer.layout().write_index_offset(), 64);
    assert_eq!(buffer.capacity(), 184);

    let (mut producer, mut consumer) = buffer.split();
    for round in 0..50 {
        let data = pattern(1 + round % 80, round as u8);
        assert_eq!(producer.write(&data), Ok(data.len()));
        assert_eq!(read_vec(&mut consumer), Ok(data));
    }

    // Misaligned by a word.
    let region = &mut memory.0[4..];
    assert!(matches!(PacketBuffer::init(region, config, NoCache), Err(Error::Misconfigured)));
}

#[cfg(feature = "utilization")]
#[test]
fn utilization_high_water_mark() {
    let mut memory = [0u32; SMALL];
    let (mut producer, mut consumer) = split(&mut memory, Config::new());
    assert_eq!(consumer.utilization(), Ok(0));

    // Two records of 20 bytes each.
    producer.write(&pattern(16, 1)).unwrap();
    producer.write(&pattern(16, 2)).unwrap();
    read_vec(&mut consumer).unwrap();
    read_vec(&mut consumer).unwrap();
    assert!(consumer.utilization().unwrap() >= 40);
    assert_eq!(producer.utilization(), consumer.utilization());

    let mut last = consumer.utilization().unwrap();
    for round in 0..50usize {
        producer.write(&pattern(1 + round % 24, 3)).unwrap();
        read_vec(&mut consumer).unwrap();
        let now = consumer.utilization().unwrap();
        assert!(now >= last);
        last = now;
    }
}

#[cfg(not(feature = "utilization"))]
#[test]
fn utilization_unsupported() {
    let mut memory = [0u32; SMALL];
    let (producer, consumer) = split(&mut memory, Config::new());
    assert_eq!(producer.utilization(), Err(Error::Unsupported));
    assert_eq!(consumer.utilization(), Err(Error::Unsupported));
}

#[derive(Clone, Debug)]
enum Op {
    Write(usize),
    Read,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..=40).prop_map(Op::Write),
        Just(Op::Read),
    ]
}

proptest! {
    #[test]
    fn behaves_like_a_queue(ops in proptest::collection::vec(op(), 1..200)) {
        let mut memory = [0u32; 36];
        let (mut producer, mut consumer) = split(&mut memory, Config::new());
        let mut model = VecDeque::new();

        for (idx, op) in ops.into_iter().enumerate() {
            match op {
                Op::Write(len) => {
                    let data = pattern(len, idx as u8);
                    match producer.write(&data) {
                        Ok(written) => {
                            prop_assert!(written > 0 && written <= len);
                            model.push_back(data[..written].to_vec());
                        },
                        Err(err) => prop_assert_eq!(err, Error::Exhausted),
                    }
                },
                Op::Read => match model.pop_front() {
                    Some(expected) => prop_assert_eq!(read_vec(&mut consumer), Ok(expected)),
                    None => prop_assert_eq!(read_vec(&mut consumer), Err(Error::NotReady)),
                },
            }
        }

        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(read_vec(&mut consumer), Ok(expected));
        }
        prop_assert_eq!(consumer.is_empty(), Ok(true));
    }
}
