//! Sends packets between two processes through an anonymous shared mapping.
//!
//! # Usage
//!
//! The parent maps a region shared with its children, formats a buffer in it and forks. The child
//! attaches to the buffer as its consumer and checks every packet it receives, while the parent
//! produces a numbered stream of packets of varying length. Neither side has any other way to
//! talk to the other, both poll.
//!
//!   > $ cargo run --release --example fork_pipe -- --count 1000000 --size 200
#[cfg(unix)]
use std::{io, ptr, slice, thread, time::Instant};
#[cfg(unix)]
use structopt::StructOpt;

#[cfg(unix)]
use spsc_pbuf::{Config, Error, NoCache, PacketBuffer};

#[cfg(unix)]
#[derive(Clone, StructOpt)]
struct Options {
    /// Number of packets to send.
    #[structopt(short = "n", long, default_value = "100000")]
    count: u32,

    /// Length of the largest packet, at least 4 bytes for the sequence number.
    #[structopt(short = "s", long, default_value = "200")]
    size: usize,

    /// Bytes of shared memory to map.
    #[structopt(long, default_value = "4096")]
    region: usize,
}

#[cfg(unix)]
fn main() {
    let Options { count, size, region: region_len } = Options::from_args();

    let memory = unsafe {
        libc::mmap(
            ptr::null_mut(),
            region_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            -1,
            0)
    };

    if memory == libc::MAP_FAILED {
        panic!("Couldn't map shared region: {}", io::Error::last_os_error());
    }

    // The mapping stays in place until the very end of both processes.
    let region = || unsafe { slice::from_raw_parts_mut(memory as *mut u8, region_len) };

    let max_packet_size = PacketBuffer::init(region(), Config::new(), NoCache)
        .expect("Couldn't format the region")
        .max_packet_size();
    assert!(size >= 4, "Packets must hold a sequence number");
    assert!(size <= max_packet_size, "At most {} bytes fit into the region", max_packet_size);

    match unsafe { libc::fork() } {
        -1 => panic!("Couldn't fork: {}", io::Error::last_os_error()),
        0 => {
            let code = match consume(region(), count, size) {
                Ok(()) => 0,
                Err(err) => {
                    eprintln!("Consumer failed: {}", err);
                    1
                },
            };
            unsafe { libc::_exit(code) }
        },
        child => {
            let start = Instant::now();
            produce(region(), count, size).expect("Producer failed");

            let mut status = 0;
            if unsafe { libc::waitpid(child, &mut status, 0) } == -1 {
                panic!("Couldn't wait for consumer: {}", io::Error::last_os_error());
            }

            let elapsed = start.elapsed();
            assert!(libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0,
                "Consumer exited with {}", status);
            println!("Sent {} packets in {:?} ({:.0} packets/s)",
                count, elapsed, f64::from(count) / elapsed.as_secs_f64());

            unsafe { libc::munmap(memory, region_len) };
        },
    }
}

#[cfg(unix)]
fn packet_len(seq: u32, size: usize) -> usize {
    4 + (seq as usize * 7) % (size - 3)
}

#[cfg(unix)]
fn produce(region: &mut [u8], count: u32, size: usize) -> spsc_pbuf::Result<()> {
    let mut producer = PacketBuffer::attach(region, Config::new(), NoCache)?.into_producer();

    for seq in 0..count {
        let len = packet_len(seq, size);
        loop {
            match producer.alloc(len) {
                Ok(space) if space.len() == len => {
                    space[..4].copy_from_slice(&seq.to_le_bytes());
                    space[4..].iter_mut().for_each(|byte| *byte = seq as u8);
                    producer.commit(len)?;
                    break;
                },
                Ok(_) | Err(Error::Exhausted) => thread::yield_now(),
                Err(err) => return Err(err),
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn consume(region: &mut [u8], count: u32, size: usize) -> Result<(), String> {
    let mut consumer = PacketBuffer::attach(region, Config::new(), NoCache)
        .map_err(|err| err.to_string())?
        .into_consumer();
    let mut buffer = vec![0; size];

    for seq in 0..count {
        let received = loop {
            match consumer.read(&mut buffer) {
                Ok(received) => break received,
                Err(Error::NotReady) => thread::yield_now(),
                Err(err) => return Err(format!("packet {}: {}", seq, err)),
            }
        };

        let packet = &buffer[..received.len];
        if received.len != packet_len(seq, size)
            || packet[..4] != seq.to_le_bytes()
            || packet[4..].iter().any(|&byte| byte != seq as u8)
        {
            return Err(format!("packet {} corrupted: {:?}", seq, packet));
        }
    }

    println!("Received {} packets, high-water mark {:?}", count, consumer.utilization());
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("This example requires fork and shared mappings.");
}
