use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use log::{error, info};
use prettytable::{color, row, Attr, Cell, Row, Table};
use users::get_user_by_uid;

use crate::event::Event;
use crate::queue::EventQueue;

/// The shared queue plus the consumer thread draining it.
pub struct Pipeline {
    queue: Arc<EventQueue>,
    worker: JoinHandle<()>,
}

impl Pipeline {
    /// Build a fresh queue and spawn the consumer thread against it.
    pub fn start() -> Result<Self, anyhow::Error> {
        let queue = Arc::new(EventQueue::new());
        let worker = spawn_worker(Arc::clone(&queue), print_event)?;
        Ok(Self { queue, worker })
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    /// Wake the consumer, let it drain whatever is still queued, and wait for
    /// it to exit. Callers stop feeding the queue first so the drain is
    /// bounded.
    pub fn shutdown(self) {
        self.queue.signal_shutdown();
        if self.worker.join().is_err() {
            error!("worker thread panicked");
        }
    }
}

/// Consumer loop. `pop` returning `None` is the one and only exit condition:
/// it happens exactly when shutdown was signaled and the queue is drained.
pub fn run(queue: &EventQueue, mut process: impl FnMut(Event)) {
    while let Some(event) = queue.pop() {
        process(event);
    }
}

fn spawn_worker(
    queue: Arc<EventQueue>,
    process: impl FnMut(Event) + Send + 'static,
) -> Result<JoinHandle<()>, anyhow::Error> {
    thread::Builder::new()
        .name("exectrace-worker".into())
        .spawn(move || {
            info!("worker thread started, waiting for events");
            run(&queue, process);
            info!("worker thread exiting");
        })
        .context("spawning worker thread")
}

// The slow half of the pipeline. Username lookup and table rendering can take
// arbitrarily long; the queue exists so none of this runs on the delivery path.
fn print_event(event: Event) {
    let user = match get_user_by_uid(event.uid()) {
        None => format!("{}", event.uid()),
        Some(user) => user.name().to_string_lossy().to_string(),
    };
    let mut table = Table::new();
    table.set_titles(row!["pid", "user", "comm", "exec"]);
    table.add_row(Row::new(vec![
        Cell::new(&format!("{}", event.pid())).with_style(Attr::ForegroundColor(color::BLUE)),
        Cell::new(&user).with_style(Attr::ForegroundColor(color::BRIGHT_YELLOW)),
        Cell::new(event.comm()).with_style(Attr::ForegroundColor(color::BRIGHT_WHITE)),
        Cell::new(event.filename()).with_style(Attr::ForegroundColor(color::BRIGHT_WHITE)),
    ]));
    if let Err(err) = table.print_tty(true) {
        error!("failed to print event: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn event(tag: i32) -> Event {
        Event::new(tag, 0, "test", "/bin/test")
    }

    #[test]
    fn run_processes_everything_then_returns() {
        let queue = EventQueue::new();
        for tag in 0..10 {
            queue.push(event(tag));
        }
        queue.signal_shutdown();

        let mut seen = Vec::new();
        run(&queue, |e| seen.push(e.pid()));

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn blocked_worker_terminates_on_shutdown() {
        let queue = Arc::new(EventQueue::new());
        let (tx, rx) = mpsc::channel();
        let worker = spawn_worker(Arc::clone(&queue), move |e| {
            tx.send(e.pid()).unwrap();
        })
        .unwrap();

        queue.push(event(1));
        queue.push(event(2));
        // worker may already be blocked in pop or still starting; both must
        // observe the items and then the shutdown
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);

        queue.signal_shutdown();
        worker.join().unwrap();
        assert_eq!(rx.try_recv(), Err(mpsc::TryRecvError::Disconnected));
    }

    #[test]
    fn pipeline_shutdown_joins_cleanly() {
        let pipeline = Pipeline::start().unwrap();
        assert!(!pipeline.queue().is_shutdown());
        pipeline.shutdown();
    }
}
