use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use aya::maps::RingBuf;
use clap::Parser;
use log::{info, warn};
use tokio::signal;
use tokio::task;

use crate::queue::EventQueue;
use crate::setup::{bump_memlock_rlimit, check_permission, load_and_attach, Args};
use crate::worker::Pipeline;

mod event;
mod pump;
mod queue;
mod setup;
mod worker;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    check_permission();
    env_logger::init();
    let args = Args::parse();
    bump_memlock_rlimit();

    // consumer side first so nothing captured is ever without a home
    let pipeline = Pipeline::start()?;
    let stop = Arc::new(AtomicBool::new(false));

    let result = run(&args, pipeline.queue(), Arc::clone(&stop)).await;

    // the full shutdown sequence runs no matter which path ended the pump:
    // production has stopped by now, so wake the worker and let it drain
    info!("stopping, draining queued events");
    pipeline.shutdown();
    result
}

/// Set up the capture side and pump ring buffer records into the queue until
/// a stop request or a fatal transport error. Returning (either way) detaches
/// the eBPF program, which stops new event production.
async fn run(
    args: &Args,
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
) -> Result<(), anyhow::Error> {
    let mut bpf = load_and_attach(args)?;
    let ring = RingBuf::try_from(
        bpf.take_map("EVENTS")
            .context("map 'EVENTS' not found in eBPF object")?,
    )
    .context("opening ring buffer map")?;

    tokio::spawn({
        let stop = Arc::clone(&stop);
        async move {
            if let Err(err) = signal::ctrl_c().await {
                warn!("failed to wait for Ctrl-C: {}", err);
            }
            stop.store(true, Ordering::SeqCst);
        }
    });

    info!("tracing execve, hit Ctrl-C to stop");
    task::spawn_blocking(move || pump::pump_events(ring, queue, stop))
        .await
        .context("ring buffer pump thread panicked")?
}
