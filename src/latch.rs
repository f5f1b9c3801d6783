//! One-shot gate. A `Latch` starts closed, is opened exactly once, and stays
//! open forever after. Waiting on an open latch returns immediately.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Ready,
    TimedOut,
}

impl WaitStatus {
    pub fn is_ready(self) -> bool {
        self == WaitStatus::Ready
    }
}

#[derive(Debug, Default)]
pub struct Latch {
    open: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Latch {
    /// Creates a closed latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch and wakes every waiter. Returns `false` if it was
    /// already open.
    ///
    /// Anything written before `open` is visible to a thread returning from
    /// [`Latch::wait`].
    pub fn open(&self) -> bool {
        let _guard = self.lock.lock();
        if self.open.swap(true, Ordering::Release) {
            return false;
        }
        self.cond.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Blocks until the latch is open.
    pub fn wait(&self) {
        if self.is_open() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.is_open() {
            self.cond.wait(&mut guard);
        }
    }

    /// Blocks until the latch is open or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant) -> WaitStatus {
        if self.is_open() {
            return WaitStatus::Ready;
        }
        let mut guard = self.lock.lock();
        while !self.is_open() {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                // the latch may have opened right at the deadline
                return if self.is_open() {
                    WaitStatus::Ready
                } else {
                    WaitStatus::TimedOut
                };
            }
        }
        WaitStatus::Ready
    }

    pub fn wait_for(&self, timeout: Duration) -> WaitStatus {
        self.wait_until(Instant::now() + timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch() {
        let l = Latch::new();
        assert!(!l.is_open());
        assert!(l.open());
        assert!(!l.open()); // already open
        assert!(l.is_open());
        l.wait();
        assert_eq!(l.wait_for(Duration::ZERO), WaitStatus::Ready);
    }

    #[test]
    fn test_latch_times_out_while_closed() {
        let l = Latch::new();
        let started = Instant::now();
        assert_eq!(l.wait_for(Duration::from_millis(20)), WaitStatus::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!l.is_open());
    }

    #[test]
    fn test_latch_releases_all_waiters() {
        let l = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let l = l.clone();
                thread::spawn(move || l.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        l.open();
        for waiter in waiters {
            waiter.join().expect("The waiter thread has panicked");
        }
    }

    #[test]
    fn test_latch_bounded_wait_sees_open() {
        let l = Arc::new(Latch::new());
        let l2 = l.clone();
        let opener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            l2.open();
        });
        assert_eq!(l.wait_for(Duration::from_secs(5)), WaitStatus::Ready);
        opener.join().expect("The opener thread has panicked");
    }
}
