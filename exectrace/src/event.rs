use std::ffi::CStr;

use exectrace_common::{ExecEvent, COMM_LEN, FILENAME_LEN};

/// Owned copy of one captured execve, detached from the ring buffer record it
/// was read from. Built once by the producer side and never mutated after;
/// ownership moves producer -> queue -> worker, so no field needs its own
/// synchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pid: i32,
    uid: u32,
    comm: [u8; COMM_LEN],
    filename: [u8; FILENAME_LEN],
}

impl Event {
    /// Build an event from loose fields. Text fields longer than their
    /// capacity are silently truncated to capacity - 1 bytes plus the
    /// terminator, same as the kernel-side probe does.
    pub fn new(pid: i32, uid: u32, comm: &str, filename: &str) -> Self {
        Self {
            pid,
            uid,
            comm: truncate_to(comm),
            filename: truncate_to(filename),
        }
    }

    /// Copy a raw ring buffer record. The caller owns `raw` only for the
    /// duration of the callback; the returned event owns its bytes.
    pub fn from_raw(raw: &ExecEvent) -> Self {
        Self {
            pid: raw.pid,
            uid: raw.uid,
            comm: raw.comm,
            filename: raw.filename,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn comm(&self) -> &str {
        str_field(&self.comm)
    }

    pub fn filename(&self) -> &str {
        str_field(&self.filename)
    }
}

fn truncate_to<const N: usize>(src: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = src.len().min(N - 1);
    buf[..len].copy_from_slice(&src.as_bytes()[..len]);
    buf
}

fn str_field(bytes: &[u8]) -> &str {
    CStr::from_bytes_until_nul(bytes)
        .unwrap_or(c"")
        .to_str()
        .unwrap_or("")
}
