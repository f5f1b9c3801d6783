//! The read side of a promise: a single-assignment slot that is either
//! unresolved or holds a value or an error, forever.
//!
//! Internally a `Future` guards three things separately:
//!
//! - the resolution slot, behind a short mutex that also arbitrates between
//!   the producer and a pending timeout (first writer wins),
//! - a one-shot [`Latch`] that readers block on; it opens right after the
//!   slot is written and never closes again,
//! - the handler lists, behind their own mutex, so registering a callback
//!   never waits on the gate.
//!
//! Handlers never run under a lock. They are moved to an outbox and handed to
//! the [`Executor`] in registration order, value or error handlers first,
//! then completion handlers. The executor may run them concurrently, so only
//! the submission order is guaranteed. There is no ordering between a thread
//! returning from [`Future::wait`] and a handler of the same future.

use crate::executor::{Executor, Task};
use crate::latch::{Latch, WaitStatus};
use crate::{Error, TimeoutError};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

const UNRESOLVED: u8 = 0;
const VALUE: u8 = 1;
const ERROR: u8 = 2;

type ValueHandler<T> = Box<dyn FnOnce(T) + Send>;
type CompletionHandler<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Read-only handle to a value or error produced elsewhere.
///
/// A `Future` is obtained from [`Promise::future`](crate::Promise::future)
/// and can be cloned freely; every clone observes the same resolution.
///
/// # Examples
///
/// ```
/// use promise_future::{Error, Promise};
/// use std::thread;
///
/// let promise = Promise::<u32, Error>::new();
/// let future = promise.future();
///
/// let producer = thread::spawn(move || promise.set_value(7));
/// assert_eq!(future.value(), Some(7));
/// assert!(future.error().is_none());
/// producer.join().expect("The producer thread has panicked");
/// ```
pub struct Future<T, E = Error> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    status: AtomicU8,
    resolution: Mutex<Option<Result<T, E>>>,
    gate: Latch,
    handlers: Mutex<Handlers<T, E>>,
    executor: Arc<dyn Executor>,
}

struct Handlers<T, E> {
    /// Set once the resolution has been fanned out. Later registrations go
    /// straight to the outbox.
    dispatched: bool,
    on_value: Vec<ValueHandler<T>>,
    on_error: Vec<ValueHandler<E>>,
    on_complete: Vec<CompletionHandler<T, E>>,
    wakers: Vec<Waker>,
    outbox: VecDeque<Task>,
    draining: bool,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.status.load(Ordering::Acquire) {
            VALUE => "Value",
            ERROR => "Error",
            _ => "Unresolved",
        };
        f.debug_struct("Future").field("state", &state).finish()
    }
}

impl<T, E> Future<T, E> {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: AtomicU8::new(UNRESOLVED),
                resolution: Mutex::new(None),
                gate: Latch::new(),
                handlers: Mutex::new(Handlers {
                    dispatched: false,
                    on_value: Vec::new(),
                    on_error: Vec::new(),
                    on_complete: Vec::new(),
                    wakers: Vec::new(),
                    outbox: VecDeque::new(),
                    draining: false,
                }),
                executor,
            }),
        }
    }

    /// `true` once a value or an error has been committed. Never blocks.
    pub fn is_ready(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) != UNRESOLVED
    }

    pub fn has_value(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == VALUE
    }

    pub fn has_error(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == ERROR
    }

    /// Blocks until the future is resolved.
    ///
    /// Blocks forever if the producer never resolves it; attach a
    /// [`timeout`](Future::timeout) when liveness matters.
    pub fn wait(&self) {
        self.inner.gate.wait()
    }

    /// Blocks until the future is resolved or `deadline` passes.
    ///
    /// Giving up never touches the future: a later [`value`](Future::value)
    /// still sees whatever the producer commits.
    pub fn wait_until(&self, deadline: Instant) -> WaitStatus {
        self.inner.gate.wait_until(deadline)
    }

    pub fn wait_for(&self, timeout: Duration) -> WaitStatus {
        self.inner.gate.wait_for(timeout)
    }
}

impl<T: Clone, E: Clone> Future<T, E> {
    /// Returns the resolution if there is one, without blocking.
    pub fn try_result(&self) -> Option<Result<T, E>> {
        self.inner.resolution.lock().clone()
    }

    /// Blocks until resolved, then returns the value or the error.
    pub fn result(&self) -> Result<T, E> {
        self.wait();
        self.try_result().expect("gate opened before the future was resolved")
    }

    /// Blocks until resolved, then returns the value, or the stored error as
    /// `Err` so it can be propagated with `?`.
    ///
    /// ```
    /// use promise_future::{Error, Promise};
    ///
    /// fn doubled(promise: &Promise<i32>) -> Result<i32, Error> {
    ///     Ok(promise.future().get_value()? * 2)
    /// }
    ///
    /// let promise = Promise::new();
    /// promise.set_error(Error::msg("no input"));
    /// assert_eq!(doubled(&promise).unwrap_err().to_string(), "no input");
    /// ```
    pub fn get_value(&self) -> Result<T, E> {
        self.result()
    }

    /// Blocks until resolved. `None` if the future holds an error.
    pub fn value(&self) -> Option<T> {
        self.result().ok()
    }

    /// Blocks until resolved. `None` if the future holds a value.
    pub fn error(&self) -> Option<E> {
        self.result().err()
    }
}

impl<T, E> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn commit_value(&self, value: T) -> bool {
        self.inner.commit(Ok(value))
    }

    pub(crate) fn commit_error(&self, err: E) -> bool {
        self.inner.commit(Err(err))
    }

    /// Runs `handler` with the value once the future holds one. If it already
    /// does, `handler` is submitted to the executor right away.
    ///
    /// ```
    /// use promise_future::{Inline, Promise};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let promise = Promise::<i32>::with_executor(Arc::new(Inline));
    /// let (first, second) = (seen.clone(), seen.clone());
    /// promise
    ///     .future()
    ///     .on_success(move |v| first.lock().unwrap().push(v))
    ///     .on_success(move |v| second.lock().unwrap().push(v * 10));
    /// promise.set_value(4);
    /// assert_eq!(*seen.lock().unwrap(), vec![4, 40]);
    /// ```
    pub fn on_success<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut handlers = self.inner.handlers.lock();
        if !handlers.dispatched {
            handlers.on_value.push(Box::new(handler));
            return self;
        }
        if let Some(Ok(value)) = self.try_result() {
            handlers.outbox.push_back(Box::new(move || handler(value)));
        }
        drop(handlers);
        self.inner.drain();
        self
    }

    /// Runs `handler` with the error once the future holds one.
    pub fn on_failure<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(E) + Send + 'static,
    {
        let mut handlers = self.inner.handlers.lock();
        if !handlers.dispatched {
            handlers.on_error.push(Box::new(handler));
            return self;
        }
        if let Some(Err(err)) = self.try_result() {
            handlers.outbox.push_back(Box::new(move || handler(err)));
        }
        drop(handlers);
        self.inner.drain();
        self
    }

    /// Runs `handler` with the resolution, whichever it is. Completion
    /// handlers are submitted after the value or error handlers registered
    /// before the resolution.
    pub fn on_completion<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut handlers = self.inner.handlers.lock();
        if !handlers.dispatched {
            handlers.on_complete.push(Box::new(handler));
            return self;
        }
        if let Some(outcome) = self.try_result() {
            handlers.outbox.push_back(Box::new(move || handler(outcome)));
        }
        drop(handlers);
        self.inner.drain();
        self
    }

    /// Resolves the future with a [`TimeoutError`] at `deadline` unless it
    /// has been resolved by then.
    ///
    /// The producer and the timeout race for the same slot; the loser's write
    /// is discarded. The producer itself keeps running. The pending timeout
    /// keeps the future alive, so handlers still fire after every handle is
    /// dropped.
    pub fn timeout_at(&self, deadline: Instant) -> &Self
    where
        E: From<TimeoutError>,
    {
        if self.is_ready() {
            return self;
        }
        let inner = self.inner.clone();
        self.inner.executor.submit_at(
            deadline,
            Box::new(move || {
                if inner.commit(Err(TimeoutError.into())) {
                    log::trace!("future timed out");
                }
            }),
        );
        self
    }

    /// Same as [`timeout_at`](Future::timeout_at), relative to now.
    ///
    /// ```
    /// use promise_future::{Error, Promise};
    /// use std::time::Duration;
    ///
    /// let promise = Promise::<i32, Error>::new();
    /// let future = promise.future();
    /// future.timeout(Duration::from_millis(10));
    /// assert!(future.error().unwrap().is_timeout());
    /// assert!(!promise.set_value(1));
    /// ```
    pub fn timeout(&self, after: Duration) -> &Self
    where
        E: From<TimeoutError>,
    {
        self.timeout_at(Instant::now() + after)
    }
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Stores `outcome` unless something already has. The gate opens only
    /// after the slot is written, and handlers fan out only after the gate
    /// is open.
    fn commit(&self, outcome: Result<T, E>) -> bool {
        let status = if outcome.is_ok() { VALUE } else { ERROR };
        {
            let mut slot = self.resolution.lock();
            if slot.is_some() {
                log::debug!("future already resolved, commit discarded");
                return false;
            }
            *slot = Some(outcome);
            self.status.store(status, Ordering::Release);
        }
        self.gate.open();
        log::trace!(
            "future resolved with {}",
            if status == VALUE { "a value" } else { "an error" }
        );
        self.fan_out();
        true
    }

    fn fan_out(&self) {
        let mut handlers = self.handlers.lock();
        let Some(outcome) = self.resolution.lock().clone() else {
            return;
        };
        handlers.dispatched = true;
        let on_value = std::mem::take(&mut handlers.on_value);
        let on_error = std::mem::take(&mut handlers.on_error);
        let on_complete = std::mem::take(&mut handlers.on_complete);
        let wakers = std::mem::take(&mut handlers.wakers);

        match &outcome {
            Ok(value) => {
                for handler in on_value {
                    let value = value.clone();
                    handlers.outbox.push_back(Box::new(move || handler(value)));
                }
            }
            Err(err) => {
                for handler in on_error {
                    let err = err.clone();
                    handlers.outbox.push_back(Box::new(move || handler(err)));
                }
            }
        }
        for handler in on_complete {
            let outcome = outcome.clone();
            handlers.outbox.push_back(Box::new(move || handler(outcome)));
        }
        drop(handlers);

        for waker in wakers {
            waker.wake();
        }
        self.drain();
    }
}

impl<T, E> Inner<T, E> {
    /// Hands queued handlers to the executor one at a time, in order, with
    /// the handler lock released. A handler that registers another handler
    /// on the same future (possible with [`Inline`](crate::Inline)) just
    /// queues it for the drain already in progress.
    fn drain(&self) {
        let mut handlers = self.handlers.lock();
        if handlers.draining {
            return;
        }
        handlers.draining = true;
        while let Some(task) = handlers.outbox.pop_front() {
            MutexGuard::unlocked(&mut handlers, || {
                if catch_unwind(AssertUnwindSafe(|| self.executor.submit(task))).is_err() {
                    log::error!("future handler panicked during submission");
                }
            });
        }
        handlers.draining = false;
    }
}

impl<T: Clone, E: Clone> std::future::Future for Future<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.try_result() {
            return Poll::Ready(outcome);
        }
        let mut handlers = self.inner.handlers.lock();
        if !handlers.dispatched {
            if !handlers.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                handlers.wakers.push(cx.waker().clone());
            }
            return Poll::Pending;
        }
        drop(handlers);
        match self.try_result() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}
