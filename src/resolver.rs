//! Recoverable failure handling.
//!
//! Every backend error a job runs into is handed to a [`ConflictResolver`]
//! together with the path it concerns. The resolver decides whether to
//! retry, skip the item, skip every later failure, or stop the job.
//! Existing destinations are resolved through the same trait.
//!
//! Resolver methods are only ever called on the job thread.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use vfscopy::vfs::VfsError;
//! use vfscopy::{ConflictResolver, Decision};
//!
//! /// Retry write errors once, stop on everything else.
//! struct RetryOnce {
//!     retried: bool,
//! }
//!
//! impl ConflictResolver for RetryOnce {
//!     fn destination_write_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
//!         if self.retried {
//!             Decision::Stop
//!         } else {
//!             self.retried = true;
//!             Decision::Retry
//!         }
//!     }
//! }
//! ```

use crate::vfs::{Stat, VfsError};
use std::fmt;
use std::path::Path;

/// Answer to a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Decision {
    /// Attempt the failed operation again.
    Retry,
    /// Give up on this item and continue.
    Skip,
    /// Skip this item and every later failing one without asking.
    SkipAll,
    /// End the job.
    Stop,
}

/// What to do with a destination that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExistsAction {
    Overwrite,
    /// Overwrite only if the source is strictly newer.
    OverwriteOlder,
    Append,
    Skip,
    Stop,
}

/// Answer to an existing-destination conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistsResolution {
    pub action: ExistsAction,
    /// Make the answer the run-wide behavior for every later conflict.
    pub apply_to_all: bool,
}

impl ExistsResolution {
    /// Answer for this conflict only.
    pub fn once(action: ExistsAction) -> Self {
        Self {
            action,
            apply_to_all: false,
        }
    }

    /// Answer for this and every later conflict.
    pub fn always(action: ExistsAction) -> Self {
        Self {
            action,
            apply_to_all: true,
        }
    }
}

/// Failure categories, one per resolver error method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    CantAccessSource,
    CantCreateDestinationRootDir,
    CantCreateDestinationDir,
    CantOpenDestinationFile,
    DestinationWriteError,
    SourceReadError,
    DestinationReadError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CantAccessSource => "cannot access source",
            Self::CantCreateDestinationRootDir => "cannot create destination root directory",
            Self::CantCreateDestinationDir => "cannot create destination directory",
            Self::CantOpenDestinationFile => "cannot open destination file",
            Self::DestinationWriteError => "destination write error",
            Self::SourceReadError => "source read error",
            Self::DestinationReadError => "destination read error",
        };
        f.write_str(name)
    }
}

/// Policy for recoverable failures and existing destinations.
///
/// Every method has a default that stops the job, so an implementation only
/// overrides what it cares about.
pub trait ConflictResolver: Send {
    /// A source entry could not be stat'ed, listed, opened or its symlink
    /// target read.
    fn cant_access_source(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    /// A missing directory on the way to the destination root could not be
    /// created. Only [`Decision::Retry`] keeps the job alive.
    fn cant_create_destination_root_dir(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    fn cant_create_destination_dir(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    fn cant_open_destination_file(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    /// Writing, renaming or creating a symlink at the destination failed.
    fn destination_write_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    fn source_read_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    /// Reading a destination back for verification failed.
    fn destination_read_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Stop
    }

    /// A streamed copy or symlink would replace an existing entry.
    fn destination_exists(
        &mut self,
        _source: &Stat,
        _destination: &Stat,
        _path: &Path,
    ) -> ExistsResolution {
        ExistsResolution::once(ExistsAction::Stop)
    }

    /// A rename would replace an existing entry. Append is treated as Stop.
    fn rename_destination_exists(
        &mut self,
        _source: &Stat,
        _destination: &Stat,
        _path: &Path,
    ) -> ExistsResolution {
        ExistsResolution::once(ExistsAction::Stop)
    }

    /// A directory is needed where a non-directory exists.
    fn already_exists(&mut self, _path: &Path, _existing: &Stat) -> Decision {
        Decision::Stop
    }
}

/// Stops the job at the first failure or conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnError;

impl ConflictResolver for StopOnError {}

/// Skips every failing item and every existing destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipOnError;

impl ConflictResolver for SkipOnError {
    fn cant_access_source(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn cant_create_destination_dir(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn cant_open_destination_file(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn destination_write_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn source_read_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn destination_read_error(&mut self, _error: &VfsError, _path: &Path) -> Decision {
        Decision::Skip
    }

    fn destination_exists(
        &mut self,
        _source: &Stat,
        _destination: &Stat,
        _path: &Path,
    ) -> ExistsResolution {
        ExistsResolution::once(ExistsAction::Skip)
    }

    fn rename_destination_exists(
        &mut self,
        _source: &Stat,
        _destination: &Stat,
        _path: &Path,
    ) -> ExistsResolution {
        ExistsResolution::once(ExistsAction::Skip)
    }

    fn already_exists(&mut self, _path: &Path, _existing: &Stat) -> Decision {
        Decision::Skip
    }
}

/// Route a failure to the matching resolver method.
pub(crate) fn ask(
    resolver: &mut dyn ConflictResolver,
    failure: Failure,
    error: &VfsError,
    path: &Path,
) -> Decision {
    match failure {
        Failure::CantAccessSource => resolver.cant_access_source(error, path),
        Failure::CantCreateDestinationRootDir => {
            resolver.cant_create_destination_root_dir(error, path)
        }
        Failure::CantCreateDestinationDir => resolver.cant_create_destination_dir(error, path),
        Failure::CantOpenDestinationFile => resolver.cant_open_destination_file(error, path),
        Failure::DestinationWriteError => resolver.destination_write_error(error, path),
        Failure::SourceReadError => resolver.source_read_error(error, path),
        Failure::DestinationReadError => resolver.destination_read_error(error, path),
    }
}
