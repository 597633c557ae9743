//! Async mutex with a bounded acquisition wait.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::errors::CaptureError;

/// Guards display-layout state. Acquisition gives up after `timeout` with
/// [`CaptureError::Timeout`], which callers treat as retryable.
#[derive(Debug)]
pub struct TimedMutex<T> {
    inner: Mutex<T>,
    timeout: Duration,
    name: &'static str,
}

impl<T> TimedMutex<T> {
    pub fn new(value: T, timeout: Duration, name: &'static str) -> Self {
        Self {
            inner: Mutex::new(value),
            timeout,
            name,
        }
    }

    pub async fn lock(&self) -> Result<MutexGuard<'_, T>, CaptureError> {
        tokio::time::timeout(self.timeout, self.inner.lock())
            .await
            .map_err(|_| {
                CaptureError::Timeout(format!(
                    "{} not acquired within {} ms",
                    self.name,
                    self.timeout.as_millis()
                ))
            })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
