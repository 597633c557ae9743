//! Timing knobs shared by display managers, grabbers and watchers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimeoutsError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{poll} must not exceed {timeout}")]
    PollExceedsTimeout {
        poll: &'static str,
        timeout: &'static str,
    },
}

/// All values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureTimeouts {
    pub display_lock_ms: u64,
    pub stream_start_ms: u64,
    pub stream_start_poll_ms: u64,
    pub size_probe_ms: u64,
    pub size_probe_poll_ms: u64,
    pub cursor_poll_ms: u64,
    pub settings_poll_ms: u64,
}

impl Default for CaptureTimeouts {
    fn default() -> Self {
        Self {
            display_lock_ms: 5_000,
            stream_start_ms: 3_000,
            stream_start_poll_ms: 100,
            size_probe_ms: 1_000,
            size_probe_poll_ms: 50,
            cursor_poll_ms: 10,
            settings_poll_ms: 1_000,
        }
    }
}

impl CaptureTimeouts {
    pub fn display_lock(&self) -> Duration {
        Duration::from_millis(self.display_lock_ms)
    }

    pub fn stream_start(&self) -> Duration {
        Duration::from_millis(self.stream_start_ms)
    }

    pub fn stream_start_poll(&self) -> Duration {
        Duration::from_millis(self.stream_start_poll_ms)
    }

    pub fn size_probe(&self) -> Duration {
        Duration::from_millis(self.size_probe_ms)
    }

    pub fn size_probe_poll(&self) -> Duration {
        Duration::from_millis(self.size_probe_poll_ms)
    }

    pub fn cursor_poll(&self) -> Duration {
        Duration::from_millis(self.cursor_poll_ms)
    }

    pub fn settings_poll(&self) -> Duration {
        Duration::from_millis(self.settings_poll_ms)
    }

    pub fn validate(&self) -> Result<(), TimeoutsError> {
        let values = [
            ("display_lock_ms", self.display_lock_ms),
            ("stream_start_ms", self.stream_start_ms),
            ("stream_start_poll_ms", self.stream_start_poll_ms),
            ("size_probe_ms", self.size_probe_ms),
            ("size_probe_poll_ms", self.size_probe_poll_ms),
            ("cursor_poll_ms", self.cursor_poll_ms),
            ("settings_poll_ms", self.settings_poll_ms),
        ];
        if let Some(&(name, _)) = values.iter().find(|(_, v)| *v == 0) {
            return Err(TimeoutsError::Zero(name));
        }
        if self.stream_start_poll_ms > self.stream_start_ms {
            return Err(TimeoutsError::PollExceedsTimeout {
                poll: "stream_start_poll_ms",
                timeout: "stream_start_ms",
            });
        }
        if self.size_probe_poll_ms > self.size_probe_ms {
            return Err(TimeoutsError::PollExceedsTimeout {
                poll: "size_probe_poll_ms",
                timeout: "size_probe_ms",
            });
        }
        Ok(())
    }
}
