use std::path::PathBuf;
use std::process;

use anyhow::Context;
use aya::programs::TracePoint;
use aya::Ebpf;
use aya_log::EbpfLogger;
use clap::Parser;
use log::{debug, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// compiled eBPF object to load (built with `cargo xtask build-ebpf`)
    #[arg(
        short,
        long,
        default_value = "target/bpfel-unknown-none/release/exectrace-ebpf"
    )]
    pub program: PathBuf,
}

pub fn check_permission() {
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("currently only supports running as the root user.");
        process::exit(1);
    }
}

/// Lift the memlock rlimit so BPF map creation is not refused on kernels
/// without memcg-based accounting.
pub fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {}", ret);
    }
}

/// Load the tracepoint program and attach it to syscalls/sys_enter_execve.
/// Any failure here is fatal to startup; the caller runs cleanup and exits.
pub fn load_and_attach(args: &Args) -> Result<Ebpf, anyhow::Error> {
    let mut bpf = Ebpf::load_file(&args.program)
        .with_context(|| format!("loading eBPF object {}", args.program.display()))?;
    if let Err(e) = EbpfLogger::init(&mut bpf) {
        // This can happen if you remove all log statements from your eBPF program.
        warn!("failed to initialize eBPF logger: {}", e);
    }
    let program: &mut TracePoint = bpf
        .program_mut("exectrace")
        .context("program 'exectrace' not found in eBPF object")?
        .try_into()
        .context("program 'exectrace' is not a tracepoint")?;
    program.load().context("loading tracepoint program")?;
    program
        .attach("syscalls", "sys_enter_execve")
        .context("attaching to syscalls/sys_enter_execve")?;
    Ok(bpf)
}
