#![no_std]
#![no_main]
#![allow(non_upper_case_globals)]
#![allow(non_snake_case)]
#![allow(non_camel_case_types)]
#![allow(dead_code)]

use aya_ebpf::helpers::{
    bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid,
    bpf_probe_read_user_str_bytes,
};
use aya_ebpf::macros::{map, tracepoint};
use aya_ebpf::maps::RingBuf;
use aya_ebpf::programs::TracePointContext;
use aya_log_ebpf::warn;

use exectrace_common::ExecEvent;

// ring buffer size must be a multiple of the page size; 256 KiB
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

// trace_event_raw_sys_enter: 8 byte common header + 8 byte syscall nr,
// then the argument array; args[0] of execve is the filename pointer
const FILENAME_ARG_OFFSET: usize = 16;

#[tracepoint(category = "syscalls", name = "sys_enter_execve")]
pub fn exectrace(ctx: TracePointContext) -> u32 {
    match try_exectrace(ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_exectrace(ctx: TracePointContext) -> Result<(), i64> {
    let Some(mut entry) = EVENTS.reserve::<ExecEvent>(0) else {
        warn!(&ctx, "ring buffer full, dropping event");
        return Err(1);
    };
    let event = unsafe { &mut *entry.as_mut_ptr() };
    event.pid = (bpf_get_current_pid_tgid() >> 32) as i32;
    event.uid = bpf_get_current_uid_gid() as u32;
    match fill_names(&ctx, event) {
        Ok(()) => {
            entry.submit(0);
            Ok(())
        }
        Err(err) => {
            entry.discard(0);
            Err(err)
        }
    }
}

fn fill_names(ctx: &TracePointContext, event: &mut ExecEvent) -> Result<(), i64> {
    event.comm = bpf_get_current_comm()?;
    event.filename = [0; exectrace_common::FILENAME_LEN];
    let filename_ptr: *const u8 = unsafe { ctx.read_at(FILENAME_ARG_OFFSET)? };
    unsafe {
        bpf_probe_read_user_str_bytes(filename_ptr, &mut event.filename)?;
    }
    Ok(())
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(target_arch = "bpf")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
