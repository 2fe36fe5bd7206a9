//! Backend error types.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Error returned by a [`Backend`](super::Backend) or [`VfsFile`](super::VfsFile).
///
/// These are recoverable from the engine's point of view: every one of them
/// is handed to the resolver together with the path it concerns.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The backend does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// A file handle was used before `open` or after `close`.
    #[error("file is not open: {0}")]
    NotOpen(String),

    /// Too many consecutive zero-length reads or writes.
    #[error("no progress after repeated {0} attempts")]
    ShortIo(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound(path.as_ref().display().to_string())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        Self::AlreadyExists(path.as_ref().display().to_string())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl AsRef<Path>) -> Self {
        Self::NotADirectory(path.as_ref().display().to_string())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl AsRef<Path>) -> Self {
        Self::IsADirectory(path.as_ref().display().to_string())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl AsRef<Path>) -> Self {
        Self::DirectoryNotEmpty(path.as_ref().display().to_string())
    }

    /// Create a NotOpen error.
    pub fn not_open(path: impl AsRef<Path>) -> Self {
        Self::NotOpen(path.as_ref().display().to_string())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify an [`io::Error`] raised while operating on `path`.
    ///
    /// Common kinds get their own variant so resolvers can match on them;
    /// everything else keeps the raw error (and its errno) in [`VfsError::Io`].
    pub fn from_io(error: io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match error.kind() {
            io::ErrorKind::NotFound => Self::not_found(path),
            io::ErrorKind::AlreadyExists => Self::already_exists(path),
            io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(path.display().to_string())
            }
            io::ErrorKind::NotADirectory => Self::not_a_directory(path),
            io::ErrorKind::IsADirectory => Self::is_a_directory(path),
            io::ErrorKind::DirectoryNotEmpty => Self::directory_not_empty(path),
            _ => Self::Io(error),
        }
    }

    /// True if this error means the destination ran out of space.
    pub fn is_no_space(&self) -> bool {
        let Self::Io(e) = self else {
            return false;
        };
        // The raw errno may be set even when kind() is something else
        #[cfg(unix)]
        if e.raw_os_error() == Some(libc::ENOSPC) {
            return true;
        }
        e.kind() == io::ErrorKind::StorageFull
    }

    /// True for [`VfsError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::Unsupported(what) => io::Error::new(io::ErrorKind::Unsupported, what),
            VfsError::NotOpen(msg) => io::Error::other(format!("file is not open: {msg}")),
            VfsError::ShortIo(what) => io::Error::new(io::ErrorKind::WriteZero, what),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// Backend result type.
pub type VfsResult<T> = Result<T, VfsError>;
