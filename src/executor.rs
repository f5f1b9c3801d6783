//! Task submission. A [`Future`](crate::Future) only needs to run closures
//! independently of the caller, either now or at a deadline; an [`Executor`]
//! is whatever provides that.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use std::{io, thread};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Runs `task` independently of the caller. Fire and forget.
    fn submit(&self, task: Task);

    /// Runs `task` no earlier than `deadline`.
    fn submit_at(&self, deadline: Instant, task: Task);

    fn submit_after(&self, delay: Duration, task: Task) {
        self.submit_at(Instant::now() + delay, task)
    }
}

/// Returns the process-wide executor, a [`ThreadPool`] with default settings
/// built on first use.
///
/// The pool is shared by every [`Promise::new`](crate::Promise::new) and is
/// never torn down.
pub fn default_executor() -> Arc<dyn Executor> {
    static DEFAULT: OnceLock<Arc<ThreadPool>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| match ThreadPool::builder().build() {
            Ok(pool) => Arc::new(pool),
            Err(err) => panic!("failed to start the default executor: {err}"),
        })
        .clone()
}

/// Runs submitted tasks on the calling thread before returning.
///
/// One exception: a future handler registered while another thread is
/// already handing that future's handlers to this executor is queued behind
/// them and runs on that other thread, after `on_success` and friends return.
///
/// Delayed submissions put the caller to sleep until the deadline. Useful for
/// tests and for building synchronous twins of asynchronous helpers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn submit(&self, task: Task) {
        task()
    }

    fn submit_at(&self, deadline: Instant, task: Task) {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        task()
    }
}

/// A builder used to configure and start a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    name: String,
    workers: usize,
}

impl ThreadPoolBuilder {
    /// Sets the name prefix of the pool threads.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the number of worker threads. Defaults to the number of CPUs.
    #[inline]
    pub fn workers(self, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..self
        }
    }

    pub fn build(self) -> io::Result<ThreadPool> {
        let (queue, jobs) = crossbeam_channel::unbounded::<Task>();
        for index in 0..self.workers {
            let jobs = jobs.clone();
            let name = format!("{}-{index}", self.name);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || work(name, jobs))?;
        }

        let (timer, delayed) = crossbeam_channel::unbounded::<Scheduled>();
        let forward = queue.clone();
        let name = format!("{}-timer", self.name);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || schedule(name, delayed, forward))?;

        Ok(ThreadPool { queue, timer })
    }
}

/// Fixed set of worker threads plus one timer thread for delayed tasks.
///
/// Dropping the pool closes its queues. Workers finish whatever is already
/// queued and exit; delayed tasks that are not due yet are discarded. The
/// threads are never joined, so dropping the pool from one of its own tasks
/// is fine.
#[derive(Debug)]
pub struct ThreadPool {
    queue: Sender<Task>,
    timer: Sender<Scheduled>,
}

impl ThreadPool {
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder {
            name: "promise-worker".into(),
            workers: num_cpus::get().max(1),
        }
    }
}

impl Executor for ThreadPool {
    fn submit(&self, task: Task) {
        if self.queue.send(task).is_err() {
            log::debug!("thread pool is gone, task dropped");
        }
    }

    fn submit_at(&self, deadline: Instant, task: Task) {
        if self.timer.send(Scheduled { deadline, seq: 0, task }).is_err() {
            log::debug!("thread pool timer is gone, delayed task dropped");
        }
    }
}

fn work(name: String, jobs: Receiver<Task>) {
    log::trace!("worker '{name}' starting");
    for task in jobs {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("task panicked on worker '{name}'");
        }
    }
    log::trace!("worker '{name}' exiting");
}

fn schedule(name: String, delayed: Receiver<Scheduled>, forward: Sender<Task>) {
    log::trace!("timer '{name}' starting");
    let mut pending = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let received = match pending.peek() {
            None => delayed.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(Scheduled { deadline, .. }) => delayed.recv_deadline(*deadline),
        };
        match received {
            Ok(mut scheduled) => {
                scheduled.seq = seq;
                seq += 1;
                pending.push(scheduled);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while pending.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = pending.pop() {
                if forward.send(due.task).is_err() {
                    log::debug!("timer '{name}' lost its workers");
                    return;
                }
            }
        }
    }
    if !pending.is_empty() {
        log::debug!("timer '{name}' dropping {} delayed tasks", pending.len());
    }
    log::trace!("timer '{name}' exiting");
}

/// A delayed task. Ordered so the earliest deadline sits on top of the heap,
/// ties broken by submission order.
struct Scheduled {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl std::fmt::Debug for Scheduled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduled")
            .field("deadline", &self.deadline)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::Mutex;

    fn pool() -> ThreadPool {
        ThreadPool::builder().name("test-pool").workers(2).build().unwrap()
    }

    #[test]
    fn test_inline_runs_before_returning() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        Inline.submit(Box::new(move || *flag.lock().unwrap() = true));
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_inline_delay_sleeps_caller() {
        let started = Instant::now();
        Inline.submit_after(Duration::from_millis(20), Box::new(|| {}));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pool_runs_task() {
        let pool = pool();
        let (tx, rx) = channel();
        pool.submit(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_pool_runs_delayed_tasks_in_deadline_order() {
        let pool = pool();
        let (tx, rx) = channel();
        let now = Instant::now();
        for (delay, tag) in [(60, "late"), (20, "early"), (40, "middle")] {
            let tx = tx.clone();
            pool.submit_at(
                now + Duration::from_millis(delay),
                Box::new(move || tx.send(tag).unwrap()),
            );
        }
        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, ["early", "middle", "late"]);
        assert!(now.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_pool_survives_panicking_task() {
        let pool = ThreadPool::builder().workers(1).build().unwrap();
        pool.submit(Box::new(|| panic!("task panic")));
        let (tx, rx) = channel();
        pool.submit(Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_default_executor_is_shared() {
        let a = default_executor();
        let b = default_executor();
        assert!(std::ptr::eq(
            Arc::as_ptr(&a) as *const u8,
            Arc::as_ptr(&b) as *const u8
        ));
        let (tx, rx) = channel();
        a.submit(Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_scheduled_orders_earliest_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        let later = now + Duration::from_secs(2);
        for (deadline, seq) in [(later, 0), (now, 2), (now, 1)] {
            heap.push(Scheduled {
                deadline,
                seq,
                task: Box::new(|| {}),
            });
        }
        assert_eq!(heap.pop().map(|s| s.seq), Some(1));
        assert_eq!(heap.pop().map(|s| s.seq), Some(2));
        assert_eq!(heap.pop().map(|s| s.seq), Some(0));
    }
}
