//! Error types for the collector and the polling engine.
//!
//! `CollectorError::Unavailable` is the family-local, recoverable failure: the
//! scheduler drops that metric family for the current cycle and carries on.
//! `CollectorError::NotBaselined` is a precondition violation and is never
//! swallowed by the collector itself.

use std::io;

/// Message carried by [`CollectorError::NotBaselined`].
pub const BASELINE_NOT_CALLED: &str = "baseline has not been called";

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("baseline has not been called")]
    NotBaselined,

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0} does not start with /dev")]
    InvalidDevice(String),
}

impl CollectorError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        CollectorError::Unavailable(message.into())
    }

    /// True for errors that signal a programming error rather than a
    /// transient collection failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectorError::NotBaselined)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CollectorError::Unavailable(_))
    }

    /// Stable classification used together with the message to recognise a
    /// recurring error.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::NotBaselined => "not_baselined",
            CollectorError::Unavailable(_) => "unavailable",
            CollectorError::Io(_) => "io",
            CollectorError::InvalidDevice(_) => "invalid_device",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("already started")]
    AlreadyStarted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn polling thread: {0}")]
    Spawn(#[source] io::Error),
}
