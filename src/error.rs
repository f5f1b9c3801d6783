use std::sync::Arc;

/// The error a [`Future`](crate::Future) is resolved with when a deadline set
/// through [`Future::timeout`](crate::Future::timeout) passes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("future timed out before it was resolved")]
pub struct TimeoutError;

/// Default error type carried by a [`Future`](crate::Future).
///
/// It is cheap to clone so it can be handed to every reader and every
/// failure handler of the same future.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Wraps any producer error.
    ///
    /// ```
    /// use promise_future::Error;
    /// let err = Error::failed(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
    /// assert_eq!(err.to_string(), "disk on fire");
    /// ```
    pub fn failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Failed(Arc::new(err))
    }

    pub fn msg(text: impl Into<String>) -> Self {
        Error::Message(text.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_converts_into_error() {
        let err: Error = TimeoutError.into();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "future timed out before it was resolved");
    }

    #[test]
    fn message_is_not_a_timeout() {
        let err = Error::msg("boom");
        assert!(!err.is_timeout());
        assert_eq!(err.clone().to_string(), "boom");
    }

    #[test]
    fn io_errors_are_wrapped() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Failed(_)));
        assert_eq!(err.to_string(), "gone");
    }
}
