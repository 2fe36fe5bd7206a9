//! Error types for vfscopy.
//!
//! This module provides the [`Error`] enum for invocation-level failures and
//! the [`Result`] type alias. Recoverable I/O failures that happen while a
//! job runs are [`VfsError`](crate::vfs::VfsError)s instead; those never
//! surface here, they are routed through the
//! [`ConflictResolver`](crate::ConflictResolver).
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | Invocation | [`Error::EmptySourceList`], [`Error::RelativeDestination`], [`Error::InvalidSourceItem`] |
//! | Threading | [`Error::Spawn`], [`Error::JobPanicked`] |

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for vfscopy operations.
///
/// This is a type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised before a job starts touching any backend.
///
/// Everything that can go wrong once the job is running is reported through
/// the resolver and the final [`JobReport`](crate::JobReport) instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No source items were given
    #[error("No source items given")]
    EmptySourceList,

    /// Destination root is not an absolute path
    #[error("Destination path must be absolute: {0}")]
    RelativeDestination(PathBuf),

    /// A source item has no usable name or a relative base directory
    #[error("Invalid source item: {0}")]
    InvalidSourceItem(PathBuf),

    /// The dedicated job thread could not be started
    #[error("Failed to spawn job thread: {0}")]
    Spawn(#[source] io::Error),

    /// The job thread panicked before producing a report
    #[error("Job thread panicked")]
    JobPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let error = Error::RelativeDestination(PathBuf::from("dest/dir"));
        let msg = format!("{}", error);
        assert!(msg.contains("must be absolute"));
        assert!(msg.contains("dest/dir"));

        assert_eq!(Error::EmptySourceList.to_string(), "No source items given");
    }
}
