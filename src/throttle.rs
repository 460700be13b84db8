//! Rate limiting for recurring errors.
//!
//! An error is identified by its kind and message. The first occurrence is
//! reported and opens a 60 minute window; identical errors inside the window
//! are suppressed. A different error, or the same one after the window has
//! expired, is reported and restarts the window.

use std::time::{Duration, Instant};

use crate::error::CollectorError;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorKey {
    pub kind: String,
    pub message: String,
}

impl ErrorKey {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&CollectorError> for ErrorKey {
    fn from(err: &CollectorError) -> Self {
        ErrorKey::new(err.kind(), err.to_string())
    }
}

#[derive(Debug)]
struct SavedError {
    key: ErrorKey,
    expires_at: Instant,
}

/// One throttle slot.
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    saved: Option<SavedError>,
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            saved: None,
        }
    }

    /// Key of the most recently reported error, if any.
    pub fn last_reported(&self) -> Option<&ErrorKey> {
        self.saved.as_ref().map(|saved| &saved.key)
    }

    /// Returns true when `key` should be logged at `now`, and records it.
    pub fn should_report(&mut self, key: ErrorKey, now: Instant) -> bool {
        if let Some(saved) = &self.saved {
            if saved.key == key && now < saved.expires_at {
                return false;
            }
        }
        self.saved = Some(SavedError {
            key,
            expires_at: now + self.window,
        });
        true
    }
}
