//! Single-assignment value channels for threads.
//!
//! A [`Promise`] is the write side, a [`Future`] the read side. The producer
//! commits exactly one value or error through the promise; any number of
//! consumers may block on the future, poll it, `.await` it, or register
//! callbacks that run on an [`Executor`] once it resolves.
//!
//! ```
//! use promise_future::{spawn, Error, Future};
//! use std::time::Duration;
//!
//! let future: Future<u64, Error> = spawn(|| Ok::<_, Error>((1..=10).product()));
//! future
//!     .on_success(|v| println!("done: {v}"))
//!     .timeout(Duration::from_secs(5));
//! assert_eq!(future.value(), Some(3628800));
//! ```

mod error;
mod executor;
mod future;
mod latch;
mod promise;

use std::sync::Arc;

pub use error::{Error, TimeoutError};
pub use executor::{default_executor, Executor, Inline, Task, ThreadPool, ThreadPoolBuilder};
pub use future::Future;
pub use latch::{Latch, WaitStatus};
pub use promise::Promise;

/// Runs `body` on the default executor and returns the future of its result.
pub fn spawn<T, E, X, F>(body: F) -> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    X: Into<E>,
    F: FnOnce() -> Result<T, X> + Send + 'static,
{
    spawn_on(default_executor(), body)
}

/// Runs `body` on `executor`. The returned future dispatches its handlers and
/// timeouts on the same executor.
pub fn spawn_on<T, E, X, F>(executor: Arc<dyn Executor>, body: F) -> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    X: Into<E>,
    F: FnOnce() -> Result<T, X> + Send + 'static,
{
    let promise = Promise::with_executor(executor.clone());
    let future = promise.future();
    executor.submit(Box::new(move || {
        promise.run_and_set(body);
    }));
    future
}

/// Runs `body` on the calling thread; the returned future is already
/// resolved.
///
/// ```
/// use promise_future::{run_sync, Error, Future};
///
/// let future: Future<i32, Error> = run_sync(|| Err(Error::msg("nope")));
/// assert!(future.is_ready());
/// assert_eq!(future.error().unwrap().to_string(), "nope");
/// ```
pub fn run_sync<T, E, X, F>(body: F) -> Future<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    X: Into<E>,
    F: FnOnce() -> Result<T, X> + Send + 'static,
{
    spawn_on(Arc::new(Inline), body)
}
