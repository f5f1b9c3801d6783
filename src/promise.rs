use crate::executor::{default_executor, Executor};
use crate::{Error, Future};
use std::fmt;
use std::sync::Arc;

/// The write side of a [`Future`]. Whoever holds a `Promise` may resolve its
/// future, once; every later attempt is ignored and returns `false`.
///
/// A `Promise` may be cloned to let several producers race for the result.
///
/// # Examples
///
/// ```
/// use promise_future::{Error, Promise};
/// use std::thread;
///
/// let promise = Promise::<String, Error>::new();
/// let future = promise.future();
/// let task1 = thread::spawn(move || {
///     println!("Received {:?}", future.value());
/// });
/// promise.set_value("Hi".into());
/// task1.join().expect("The task1 thread has panicked.");
/// ```
pub struct Promise<T, E = Error> {
    future: Future<T, E>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future", &self.future)
            .finish()
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates an unresolved promise whose future dispatches handlers and
    /// timeouts on the [default executor](crate::default_executor).
    pub fn new() -> Self {
        Self::with_executor(default_executor())
    }

    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            future: Future::new(executor),
        }
    }

    /// The future this promise resolves.
    pub fn future(&self) -> Future<T, E> {
        self.future.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.future.is_ready()
    }

    /// Resolves the future with `value`. Returns `false` if it was already
    /// resolved, in which case `value` is dropped.
    pub fn set_value(&self, value: T) -> bool {
        self.future.commit_value(value)
    }

    /// Resolves the future with `err`. Returns `false` if it was already
    /// resolved.
    pub fn set_error(&self, err: E) -> bool {
        self.future.commit_error(err)
    }

    /// Runs `body` and resolves the future with what it returns. The error
    /// side may be anything convertible into `E`, so bodies can use `?`
    /// freely.
    ///
    /// ```
    /// use promise_future::{Error, Promise};
    ///
    /// let promise = Promise::<u16, Error>::new();
    /// promise.run_and_set(|| "8080".parse::<u16>().map_err(Error::failed));
    /// assert_eq!(promise.future().value(), Some(8080));
    /// ```
    pub fn run_and_set<F, X>(&self, body: F) -> bool
    where
        F: FnOnce() -> Result<T, X>,
        X: Into<E>,
    {
        match body() {
            Ok(value) => self.set_value(value),
            Err(err) => self.set_error(err.into()),
        }
    }

    /// Runs `body` and resolves the future with its result as is.
    pub fn run_and_set_result<F>(&self, body: F) -> bool
    where
        F: FnOnce() -> Result<T, E>,
    {
        match body() {
            Ok(value) => self.set_value(value),
            Err(err) => self.set_error(err),
        }
    }
}
