//! error types for detection and item listing
//!
//! Cancellation has no variant here: a cancelled detection is reported as
//! [`crate::detect::Detection::Cancelled`], never as an error.

use crate::catalog::FormatId;
use std::io;
use thiserror::Error;

/// Result type alias for arcprobe operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No catalog entry accepted the stream
    #[error("unrecognized archive format")]
    IncorrectFormat,

    /// A format matched structurally but needs a password that was not supplied
    #[error("a password is needed to open this archive")]
    PasswordNeeded,

    /// The stream became unreadable or unseekable
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A format violated its own probe contract
    #[error("internal error: {0}")]
    Internal(String),

    #[error("item index {index} is out of range ({count} items)")]
    IndexOutOfRange { index: u32, count: u32 },

    #[error("format {0} appears more than once in the catalog")]
    DuplicateFormat(FormatId),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// True for outcomes a caller can fix by retrying with a password
    pub fn is_password_needed(&self) -> bool {
        matches!(self, Error::PasswordNeeded)
    }
}
