#![cfg_attr(not(feature = "user"), no_std)]

/// Size of the `comm` field, terminator included. Matches the kernel's
/// TASK_COMM_LEN.
pub const COMM_LEN: usize = 16;
/// Size of the captured execve path, terminator included. Longer paths are
/// truncated by the kernel-side probe.
pub const FILENAME_LEN: usize = 128;

/// Raw record written by the eBPF program into the ring buffer, one per
/// sys_enter_execve. Layout is shared with the kernel side, keep it POD.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct ExecEvent {
    pub pid: i32,
    pub uid: u32,
    pub comm: [u8; COMM_LEN],
    pub filename: [u8; FILENAME_LEN],
}

impl ExecEvent {
    pub const SIZE: usize = core::mem::size_of::<Self>();
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ExecEvent {}
