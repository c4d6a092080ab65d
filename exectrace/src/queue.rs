use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::event::Event;

/// Unbounded FIFO handoff between the ring buffer pump and the worker thread.
///
/// `push` never blocks; `pop` blocks while the queue is empty until either an
/// item arrives or [`signal_shutdown`](Self::signal_shutdown) is called. Once
/// shutdown is signaled, `pop` keeps returning items until the queue is empty
/// and only then reports `None`, so nothing enqueued before (or after, see
/// `push`) the shutdown is lost.
///
/// Events move by value through `push`/`pop`, so at any instant each event has
/// exactly one owner and needs no synchronization of its own.
pub struct EventQueue {
    state: Mutex<State>,
    available: Condvar,
}

struct State {
    items: VecDeque<Event>,
    shutdown: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an event and wake one waiting consumer. Never blocks beyond the
    /// internal lock, which is only ever held for pointer-sized bookkeeping.
    ///
    /// Pushing after shutdown is allowed: a late arrival is still drained if
    /// the consumer has not yet observed the queue empty.
    pub fn push(&self, event: Event) {
        let mut state = self.lock();
        state.items.push_back(event);
        // one consumer, so waking a single waiter is enough
        self.available.notify_one();
    }

    /// Take the oldest event, blocking while the queue is empty and shutdown
    /// has not been signaled. Returns `None` exactly when the queue is empty
    /// and shutdown is in effect; that is the consumer's termination signal.
    pub fn pop(&self) -> Option<Event> {
        let mut state = self.lock();
        // re-check on every wake: wakes can be spurious, and a shutdown wake
        // must still drain any items that beat it into the queue
        while state.items.is_empty() && !state.shutdown {
            state = self
                .available
                .wait(state)
                .expect("event queue lock poisoned");
        }
        state.items.pop_front()
    }

    /// Flip the shutdown flag and wake every blocked `pop`. The flag never
    /// reverts; calling this more than once is a no-op.
    pub fn signal_shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        // every waiter has to re-evaluate the flag, not just one
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a poisoned lock means a thread panicked mid push/pop; the queue
        // state is a VecDeque and a bool, both still coherent, but there is
        // no useful way to continue the pipeline
        self.state.lock().expect("event queue lock poisoned")
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;

    fn event(tag: i32) -> Event {
        Event::new(tag, 0, "test", "/bin/test")
    }

    #[test]
    fn pops_in_push_order() {
        let queue = EventQueue::new();
        for tag in 0..100 {
            queue.push(event(tag));
        }
        assert_eq!(queue.len(), 100);
        for tag in 0..100 {
            assert_eq!(queue.pop().map(|e| e.pid()), Some(tag));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drains_exactly_k_items_after_shutdown() {
        let queue = EventQueue::new();
        for tag in 0..5 {
            queue.push(event(tag));
        }
        queue.signal_shutdown();
        for tag in 0..5 {
            assert_eq!(queue.pop().map(|e| e.pid()), Some(tag));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn pop_on_shutdown_empty_queue_returns_immediately() {
        let queue = EventQueue::new();
        queue.signal_shutdown();
        assert_eq!(queue.pop(), None);
        // and stays that way
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let queue = EventQueue::new();
        queue.push(event(1));
        queue.signal_shutdown();
        queue.signal_shutdown();
        assert!(queue.is_shutdown());
        assert_eq!(queue.pop().map(|e| e.pid()), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_after_shutdown_is_still_drained() {
        let queue = EventQueue::new();
        queue.signal_shutdown();
        queue.push(event(9));
        assert_eq!(queue.pop().map(|e| e.pid()), Some(9));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn scenario_push_pop_shutdown() {
        let queue = EventQueue::new();
        queue.push(event(1));
        queue.push(event(2));
        assert_eq!(queue.pop().map(|e| e.pid()), Some(1));
        assert_eq!(queue.pop().map(|e| e.pid()), Some(2));
        queue.signal_shutdown();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn blocked_pop_wakes_on_push() {
        // repeat to shake out missed-wakeup races; the barrier makes sure the
        // consumer is committed to pop before the producer pushes, and a
        // missed wakeup would hang the join (caught by the test harness)
        for round in 0..100 {
            let queue = Arc::new(EventQueue::new());
            let barrier = Arc::new(Barrier::new(2));

            let consumer = {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    queue.pop()
                })
            };

            barrier.wait();
            queue.push(event(round));
            assert_eq!(
                consumer.join().unwrap().map(|e| e.pid()),
                Some(round),
                "round {round}"
            );
        }
    }

    #[test]
    fn blocked_pop_wakes_on_shutdown() {
        for _ in 0..100 {
            let queue = Arc::new(EventQueue::new());
            let barrier = Arc::new(Barrier::new(2));

            let consumer = {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    queue.pop()
                })
            };

            barrier.wait();
            queue.signal_shutdown();
            assert_eq!(consumer.join().unwrap(), None);
        }
    }

    #[test]
    fn no_loss_with_concurrent_producer() {
        let queue = Arc::new(EventQueue::new());
        const N: i32 = 1_000;

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for tag in 0..N {
                    queue.push(event(tag));
                }
                queue.signal_shutdown();
            })
        };

        let mut seen = Vec::new();
        while let Some(e) = queue.pop() {
            seen.push(e.pid());
        }
        producer.join().unwrap();

        assert_eq!(seen, (0..N).collect::<Vec<_>>());
    }
}
