//! Strand-ordered task scheduler.
//!
//! Work is posted against a [`ContentId`] "strand". Tasks posted to the
//! same non-empty strand run in FIFO order, one at a time; tasks posted
//! to different strands (or to the empty strand, which carries no
//! ordering at all) may run concurrently against a fixed pool of worker
//! threads. See the module-level comment on [`StrandState`] for how that
//! guarantee is implemented.

use std::sync::Arc;
use std::thread::JoinHandle;

use asset_core::ContentId;
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

/// A unit of work posted to the scheduler. Boxed because strands carry a
/// heterogeneous mix of closures.
type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("scheduler has been shut down")]
    QueueClosed,
}

enum Message {
    Run { strand: ContentId, task: Task },
    Shutdown,
}

/// Per-strand bookkeeping: the queue of tasks waiting behind the one
/// currently running, and whether one is currently running at all.
///
/// Only one task per strand is ever in flight. When a worker finishes a
/// strand's task it calls [`Inner::advance`], which either hands the next
/// queued task to a worker or marks the strand idle again. This is the
/// whole of the ordering guarantee: strands never contend with each
/// other, only with their own queue.
#[derive(Default)]
struct StrandState {
    queue: std::collections::VecDeque<Task>,
    running: bool,
}

struct Inner {
    strands: DashMap<ContentId, Mutex<StrandState>>,
}

impl Inner {
    /// Called by a worker after finishing a strand's task. Dispatches the
    /// next queued task for that strand, if any, or marks it idle.
    fn advance(self: &Arc<Self>, sender: &Sender<Message>, strand: ContentId) {
        let Some(state) = self.strands.get(&strand) else {
            return;
        };
        let mut state = state.lock();
        match state.queue.pop_front() {
            Some(task) => {
                drop(state);
                // The strand stays marked `running`; we just handed its
                // next task straight to a worker rather than reader from
                // idle.
                let _ = sender.send(Message::Run { strand, task });
            }
            None => {
                state.running = false;
            }
        }
    }
}

/// A fixed pool of worker threads dispatching strand-ordered work.
///
/// Dropping the scheduler signals every worker to stop after it finishes
/// its current task and joins all of them, so no task is ever abandoned
/// mid-execution.
pub struct Scheduler {
    inner: Arc<Inner>,
    sender: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns `worker_threads` named worker threads. Each is named
    /// `asset-scheduler-worker-N` so panics and tracing spans can be
    /// attributed to a specific worker.
    pub fn new(worker_threads: usize) -> Result<Self, SchedulerError> {
        let worker_threads = worker_threads.max(1);
        let (sender, receiver): (Sender<Message>, Receiver<Message>) = crossbeam_channel::unbounded();
        let inner = Arc::new(Inner {
            strands: DashMap::new(),
        });

        let mut workers = Vec::with_capacity(worker_threads);
        for index in 0..worker_threads {
            let receiver = receiver.clone();
            let sender = sender.clone();
            let inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("asset-scheduler-worker-{index}"))
                .spawn(move || worker_loop(index, receiver, sender, inner))
                .map_err(SchedulerError::ThreadSpawn)?;
            workers.push(handle);
        }

        Ok(Self {
            inner,
            sender,
            workers,
        })
    }

    /// Posts `task` to `strand`. Tasks posted to [`ContentId::EMPTY`] carry
    /// no ordering and may run on any free worker immediately; tasks
    /// posted to any other strand run after every task already queued on
    /// that same strand, never concurrently with them.
    ///
    /// The only failure mode is the scheduler having already been shut
    /// down.
    pub fn post_work(
        &self,
        strand: ContentId,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), SchedulerError> {
        let task: Task = Box::new(task);

        if strand.is_empty() {
            return self
                .sender
                .send(Message::Run { strand, task })
                .map_err(|_| SchedulerError::QueueClosed);
        }

        let entry = self
            .inner
            .strands
            .entry(strand)
            .or_insert_with(|| Mutex::new(StrandState::default()));
        let mut state = entry.lock();
        if state.running {
            state.queue.push_back(task);
            Ok(())
        } else {
            state.running = true;
            drop(state);
            self.sender
                .send(Message::Run { strand, task })
                .map_err(|_| SchedulerError::QueueClosed)
        }
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(index: usize, receiver: Receiver<Message>, sender: Sender<Message>, inner: Arc<Inner>) {
    tracing::debug!(worker = index, "scheduler worker starting");
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run { strand, task } => {
                task();
                if !strand.is_empty() {
                    inner.advance(&sender, strand);
                }
            }
            Message::Shutdown => break,
        }
    }
    tracing::debug!(worker = index, "scheduler worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn strand_preserves_fifo_order() {
        let scheduler = Scheduler::new(4).unwrap();
        let strand = ContentId::from_name("scenario-e");
        let order = Arc::new(StdMutex::new(Vec::new()));

        for i in 0..100 {
            let order = Arc::clone(&order);
            scheduler.post_work(strand, move || order.lock().unwrap().push(i)).unwrap();
        }

        // Give the strand time to drain; dropping the scheduler at the
        // end of the test also joins every worker, guaranteeing the
        // queue has fully drained before we assert.
        std::thread::sleep(Duration::from_millis(200));
        drop(scheduler);

        let order = order.lock().unwrap();
        let expected: Vec<usize> = (0..100).collect();
        assert_eq!(*order, expected);
    }

    #[test]
    fn empty_strand_has_no_ordering_but_all_tasks_run() {
        let scheduler = Scheduler::new(4).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let count = Arc::clone(&count);
            scheduler
                .post_work(ContentId::EMPTY, move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        drop(scheduler);
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn distinct_strands_do_not_block_each_other() {
        let scheduler = Scheduler::new(2).unwrap();
        let a_done = Arc::new(AtomicUsize::new(0));
        let b_done = Arc::new(AtomicUsize::new(0));

        let strand_a = ContentId::from_name("strand-a");
        let strand_b = ContentId::from_name("strand-b");

        for _ in 0..10 {
            let a_done = Arc::clone(&a_done);
            scheduler
                .post_work(strand_a, move || {
                    a_done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            let b_done = Arc::clone(&b_done);
            scheduler
                .post_work(strand_b, move || {
                    b_done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        drop(scheduler);
        assert_eq!(a_done.load(Ordering::SeqCst), 10);
        assert_eq!(b_done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn worker_count_is_clamped_to_at_least_one() {
        let scheduler = Scheduler::new(0).unwrap();
        assert_eq!(scheduler.worker_count(), 1);
    }
}
