//! Deferred calls: run a task once after a delay, with a cancel handle.
//!
//! The scheduler never blocks; it posts its next pass and its beat
//! notifications through a [`Deferrer`].

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{AudioClock, ManualClock};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Deadline used when `Instant + delay` would overflow.
const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Cancels a deferred task. Cancelling after the task ran is a no-op.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub trait Deferrer: Send + Sync {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;
}

struct Entry<T> {
    due: T,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

// Min-heap on (due, seq) so equal deadlines keep posting order.
impl<T: PartialOrd> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .partial_cmp(&self.due)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T: PartialOrd> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T: PartialOrd> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<T: PartialOrd> Eq for Entry<T> {}

enum TimerMessage {
    Schedule(Entry<Instant>),
    Shutdown,
}

/// Runs deferred tasks on one background thread, in deadline order.
pub struct ThreadTimer {
    sender: Sender<TimerMessage>,
    seq: AtomicU64,
    thread: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        let thread = thread::Builder::new()
            .name("beatkeeper-timer".to_string())
            .spawn(move || Self::run(receiver))
            .ok();
        if thread.is_none() {
            log::error!("Failed to spawn timer thread; deferred tasks will not run");
        }

        Self {
            sender,
            seq: AtomicU64::new(0),
            thread,
        }
    }

    fn run(receiver: Receiver<TimerMessage>) {
        let mut queue: BinaryHeap<Entry<Instant>> = BinaryHeap::new();

        loop {
            let message = match queue.peek() {
                Some(next) => receiver.recv_deadline(next.due),
                None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(TimerMessage::Schedule(entry)) => queue.push(entry),
                Ok(TimerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            while queue.peek().is_some_and(|next| next.due <= now) {
                if let Some(entry) = queue.pop()
                    && !entry.handle.is_cancelled()
                {
                    (entry.task)();
                }
            }
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferrer for ThreadTimer {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let now = Instant::now();
        let due = now.checked_add(delay).unwrap_or_else(|| {
            log::warn!("Timer delay {:?} out of range; clamped", delay);
            now + MAX_DELAY
        });
        let entry = Entry {
            due,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            handle: handle.clone(),
            task,
        };
        if self.sender.send(TimerMessage::Schedule(entry)).is_err() {
            log::warn!("Timer thread is gone; deferred task dropped");
        }
        handle
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        let _ = self.sender.send(TimerMessage::Shutdown);
        // The last owner may be a task running on the timer thread itself.
        if let Some(thread) = self.thread.take()
            && thread.thread().id() != thread::current().id()
        {
            let _ = thread.join();
        }
    }
}

/// Deferred calls against a [`ManualClock`]; tasks only run from [`ManualTimer::run_until`].
pub struct ManualTimer {
    clock: Arc<ManualClock>,
    queue: Mutex<BinaryHeap<Entry<f64>>>,
    seq: AtomicU64,
}

impl ManualTimer {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            queue: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Advance the clock to `time`, running every task that falls due on the
    /// way at its own due time. Tasks posted while running are honoured too.
    pub fn run_until(&self, time: f64) {
        loop {
            let entry = match self.queue.lock() {
                Ok(mut queue) if queue.peek().is_some_and(|e| e.due <= time) => queue.pop(),
                _ => None,
            };
            let Some(entry) = entry else { break };

            self.clock.set(entry.due);
            if !entry.handle.is_cancelled() {
                (entry.task)();
            }
        }
        self.clock.set(time);
    }

    /// Tasks still queued and not cancelled.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .map(|q| q.iter().filter(|e| !e.handle.is_cancelled()).count())
            .unwrap_or(0)
    }
}

impl Deferrer for ManualTimer {
    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let entry = Entry {
            due: self.clock.now() + delay.as_secs_f64(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            handle: handle.clone(),
            task,
        };
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(entry);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_timer_runs_in_deadline_order() {
        let timer = ThreadTimer::new();
        let (tx, rx) = channel::unbounded();

        for (label, ms) in [("c", 60u64), ("a", 10), ("b", 30)] {
            let tx = tx.clone();
            timer.after(
                Duration::from_millis(ms),
                Box::new(move || {
                    let _ = tx.send(label);
                }),
            );
        }

        let order: Vec<&str> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_thread_timer_cancel() {
        let timer = ThreadTimer::new();
        let (tx, rx) = channel::unbounded();

        let tx_cancelled = tx.clone();
        let handle = timer.after(
            Duration::from_millis(20),
            Box::new(move || {
                let _ = tx_cancelled.send("cancelled");
            }),
        );
        timer.after(
            Duration::from_millis(40),
            Box::new(move || {
                let _ = tx.send("kept");
            }),
        );
        handle.cancel();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "kept");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_thread_timer_survives_huge_delay() {
        let timer = ThreadTimer::new();
        let (tx, rx) = channel::unbounded();

        let far = timer.after(Duration::MAX, Box::new(|| {}));
        timer.after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send("soon");
            }),
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "soon");
        far.cancel();
    }

    #[test]
    fn test_manual_timer_sets_clock_to_due_time() {
        let clock = Arc::new(ManualClock::new(1.0));
        let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_task = Arc::clone(&seen);
        let clock_task = Arc::clone(&clock);
        timer.after(
            Duration::from_millis(250),
            Box::new(move || seen_task.lock().unwrap().push(clock_task.now())),
        );

        timer.run_until(1.1);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(timer.pending(), 1);

        timer.run_until(2.0);
        assert_eq!(*seen.lock().unwrap(), vec![1.25]);
        assert_eq!(clock.now(), 2.0);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn test_manual_timer_runs_reposted_tasks() {
        let clock = Arc::new(ManualClock::new(0.0));
        let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
        let fired = Arc::new(AtomicBool::new(false));

        let inner_timer = Arc::clone(&timer);
        let inner_fired = Arc::clone(&fired);
        timer.after(
            Duration::from_millis(100),
            Box::new(move || {
                inner_timer.after(
                    Duration::from_millis(100),
                    Box::new(move || inner_fired.store(true, Ordering::SeqCst)),
                );
            }),
        );

        timer.run_until(0.5);
        assert!(fired.load(Ordering::SeqCst));
    }
}
