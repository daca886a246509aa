//! A built connection together with its teardown.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::BoxError;

type CloseFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Teardown callback that runs at most once.
///
/// Concurrent `close` calls are safe: exactly one of them executes the
/// callback, the rest return `Ok(())`.
pub struct Closer {
    callback: Mutex<Option<CloseFn>>,
}

impl Closer {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// A closer with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            callback: Mutex::new(None),
        }
    }

    pub fn close(&self) -> Result<(), BoxError> {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// What a builder returns: the shared handle and how to close it.
#[derive(Debug)]
pub struct Pair<T> {
    pub conn: T,
    pub closer: Closer,
}

impl<T> Pair<T> {
    pub fn new(conn: T, closer: Closer) -> Self {
        Self { conn, closer }
    }

    /// A pair whose handle needs no teardown.
    pub fn without_closer(conn: T) -> Self {
        Self {
            conn,
            closer: Closer::noop(),
        }
    }
}
