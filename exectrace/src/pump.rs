use std::io;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use aya::maps::{MapData, RingBuf};
use log::{debug, warn};

use exectrace_common::ExecEvent;

use crate::event::Event;
use crate::queue::EventQueue;

/// How long a single poll may block before the stop flag is re-checked.
pub const POLL_TIMEOUT_MS: i32 = 100;

/// Move records from the kernel ring buffer into the queue until `stop` is
/// set. This is the time-critical side of the pipeline: per record it does one
/// copy and one push, nothing that can block on the consumer.
///
/// Blocks in `poll(2)` with a bounded timeout so a stop request is observed
/// within [`POLL_TIMEOUT_MS`] even if no events arrive.
pub fn pump_events(
    mut ring: RingBuf<MapData>,
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
) -> Result<(), anyhow::Error> {
    let mut poll_fd = libc::pollfd {
        fd: ring.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    while !stop.load(Ordering::SeqCst) {
        let ret = unsafe { libc::poll(&mut poll_fd, 1, POLL_TIMEOUT_MS) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                // benign signal, treat like an empty poll
                continue;
            }
            return Err(err).context("polling exec event ring buffer");
        }
        let mut fetched = 0usize;
        while let Some(record) = ring.next() {
            handle_record(&queue, &record);
            fetched += 1;
        }
        if fetched > 0 {
            debug!(
                "fetched {} record(s) from ring buffer, queue depth {}",
                fetched,
                queue.len()
            );
        }
    }
    Ok(())
}

/// Callback for one ring buffer record. `data` is borrowed from the ring
/// buffer and recycled once this returns, so the event is copied out before
/// it is enqueued. A short record is dropped rather than propagated; the
/// delivery path must never stall or die over a single bad record.
pub fn handle_record(queue: &EventQueue, data: &[u8]) {
    let Some(raw) = parse_record(data) else {
        warn!("dropping short ring buffer record: {} bytes", data.len());
        return;
    };
    queue.push(Event::from_raw(&raw));
}

fn parse_record(data: &[u8]) -> Option<ExecEvent> {
    if data.len() < ExecEvent::SIZE {
        return None;
    }
    // the ring buffer hands out raw bytes; ExecEvent is repr(C) POD
    Some(unsafe { core::ptr::read_unaligned(data.as_ptr() as *const ExecEvent) })
}

#[cfg(test)]
mod tests {
    use exectrace_common::{COMM_LEN, FILENAME_LEN};

    use super::*;

    fn record_bytes(raw: &ExecEvent) -> &[u8] {
        unsafe { core::slice::from_raw_parts(raw as *const ExecEvent as *const u8, ExecEvent::SIZE) }
    }

    fn sample_record(pid: i32) -> ExecEvent {
        let mut raw = ExecEvent {
            pid,
            uid: 1000,
            comm: [0; COMM_LEN],
            filename: [0; FILENAME_LEN],
        };
        raw.comm[..4].copy_from_slice(b"bash");
        raw.filename[..7].copy_from_slice(b"/bin/ls");
        raw
    }

    #[test]
    fn well_formed_record_is_enqueued() {
        let queue = EventQueue::new();
        let raw = sample_record(123);
        handle_record(&queue, record_bytes(&raw));

        let event = queue.pop().expect("record should be enqueued");
        assert_eq!(event.pid(), 123);
        assert_eq!(event.uid(), 1000);
        assert_eq!(event.comm(), "bash");
        assert_eq!(event.filename(), "/bin/ls");
    }

    #[test]
    fn short_record_is_dropped() {
        let queue = EventQueue::new();
        handle_record(&queue, &[0u8; 8]);
        assert!(queue.is_empty());
    }

    #[test]
    fn records_keep_arrival_order() {
        let queue = EventQueue::new();
        for pid in 1..=3 {
            let raw = sample_record(pid);
            handle_record(&queue, record_bytes(&raw));
        }
        for pid in 1..=3 {
            assert_eq!(queue.pop().map(|e| e.pid()), Some(pid));
        }
    }
}
