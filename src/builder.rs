//! Builder API for assembling transfer jobs.
//!
//! The builder provides a fluent interface for describing a copy or move
//! and running it. It is often more convenient than building
//! [`SourceItem`]s and [`TransferOptions`] by hand and calling
//! [`CopyJob::new`].
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```
//! use vfscopy::TransferBuilder;
//! use vfscopy::vfs::MemoryBackend;
//!
//! let source = MemoryBackend::new();
//! source.write_file("/photos/a.jpg", b"jpeg").unwrap();
//! let destination = MemoryBackend::new();
//!
//! let report = TransferBuilder::new(destination.clone().into_handle(), "/backup/")
//!     .source(source.into_handle(), "/photos")
//!     .run()?;
//!
//! assert!(report.is_success());
//! assert_eq!(destination.read_file("/backup/photos/a.jpg").unwrap(), b"jpeg");
//! # Ok::<(), vfscopy::Error>(())
//! ```
//!
//! ## Move with Verification
//!
//! ```no_run
//! use vfscopy::vfs::NativeBackend;
//! use vfscopy::{ChecksumVerification, SkipOnError, TransferBuilder};
//!
//! let disk = NativeBackend::shared();
//! let report = TransferBuilder::new(disk.clone(), "/mnt/archive")
//!     .source(disk, "/home/me/old-projects")
//!     .move_items()
//!     .verify(ChecksumVerification::OnMove)
//!     .resolver(SkipOnError)
//!     .run()?;
//!
//! println!("moved {} items", report.items_copied);
//! # Ok::<(), vfscopy::Error>(())
//! ```

use crate::copy::{CopyJob, CopyJobHandle, JobReport, SourceItem};
use crate::error::Result;
use crate::events::CopyEvents;
use crate::options::{ChecksumVerification, ExistBehavior, TransferMode, TransferOptions};
use crate::resolver::ConflictResolver;
use crate::vfs::BackendHandle;
use std::fmt;
use std::path::PathBuf;

enum Source {
    Item(SourceItem),
    Path(BackendHandle, PathBuf),
}

/// A builder for configuring and executing transfers.
///
/// Sources may live on different backends; the destination is one path on
/// one backend.
///
/// # Example
///
/// ```
/// use vfscopy::TransferBuilder;
/// use vfscopy::vfs::MemoryBackend;
///
/// let share = MemoryBackend::new();
/// share.write_file("/a.txt", b"a").unwrap();
/// share.write_file("/b.txt", b"b").unwrap();
/// let share = share.into_handle();
///
/// let job = TransferBuilder::new(MemoryBackend::new().into_handle(), "/inbox")
///     .source(share.clone(), "/a.txt")
///     .source(share, "/b.txt")
///     .overwrite()
///     .build()?;
/// # Ok::<(), vfscopy::Error>(())
/// ```
pub struct TransferBuilder {
    destination_backend: BackendHandle,
    destination: PathBuf,
    sources: Vec<Source>,
    options: TransferOptions,
    resolver: Option<Box<dyn ConflictResolver>>,
    events: Option<Box<dyn CopyEvents>>,
}

impl fmt::Debug for TransferBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuilder")
            .field("destination", &self.destination)
            .field("sources", &self.sources.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TransferBuilder {
    /// Create a builder targeting `destination` on `destination_backend`.
    ///
    /// Uses default options: copy, ask on conflicts (which the default
    /// resolver answers with Stop), preserve every attribute, no
    /// verification.
    pub fn new(destination_backend: BackendHandle, destination: impl Into<PathBuf>) -> Self {
        Self {
            destination_backend,
            destination: destination.into(),
            sources: Vec::new(),
            options: TransferOptions::default(),
            resolver: None,
            events: None,
        }
    }

    /// Add the entry at absolute `path` on `backend`. Its parent becomes
    /// the base directory destination paths are built from.
    #[must_use]
    pub fn source(mut self, backend: BackendHandle, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::Path(backend, path.into()));
        self
    }

    /// Add a prepared item.
    #[must_use]
    pub fn item(mut self, item: SourceItem) -> Self {
        self.sources.push(Source::Item(item));
        self
    }

    /// Move instead of copy.
    ///
    /// Entries on the destination's volume are renamed; everything else is
    /// copied and deleted afterwards.
    #[must_use]
    pub fn move_items(mut self) -> Self {
        self.options = self.options.with_mode(TransferMode::Move);
        self
    }

    /// Overwrite every existing destination.
    #[must_use]
    pub fn overwrite(mut self) -> Self {
        self.options = self.options.with_exist_behavior(ExistBehavior::OverwriteAll);
        self
    }

    /// Overwrite existing destinations only if the source is newer.
    ///
    /// Useful for incremental backups or syncing.
    #[must_use]
    pub fn update_older(mut self) -> Self {
        self.options = self
            .options
            .with_exist_behavior(ExistBehavior::OverwriteOlder);
        self
    }

    /// Append source bytes to existing destination files.
    #[must_use]
    pub fn append(mut self) -> Self {
        self.options = self.options.with_exist_behavior(ExistBehavior::AppendAll);
        self
    }

    /// Leave every existing destination alone.
    #[must_use]
    pub fn skip_existing(mut self) -> Self {
        self.options = self.options.with_exist_behavior(ExistBehavior::SkipAll);
        self
    }

    /// Set the checksum verification policy.
    #[must_use]
    pub fn verify(mut self, verification: ChecksumVerification) -> Self {
        self.options = self.options.with_verification(verification);
        self
    }

    /// Set the pipeline buffer size (at least 4 KiB).
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.options = self.options.with_buffer_size(bytes);
        self
    }

    /// Copy symlink targets instead of the links.
    #[must_use]
    pub fn follow_symlinks(mut self) -> Self {
        self.options = self.options.with_follow_symlinks();
        self
    }

    /// Disable permission copying.
    #[must_use]
    pub fn no_permissions(mut self) -> Self {
        self.options = self.options.without_permissions();
        self
    }

    /// Disable ownership copying.
    #[must_use]
    pub fn no_owners(mut self) -> Self {
        self.options = self.options.without_owners();
        self
    }

    /// Disable BSD flag copying.
    #[must_use]
    pub fn no_flags(mut self) -> Self {
        self.options = self.options.without_flags();
        self
    }

    /// Disable timestamp preservation.
    #[must_use]
    pub fn no_timestamps(mut self) -> Self {
        self.options = self.options.without_timestamps();
        self
    }

    /// Disable extended attribute copying.
    #[must_use]
    pub fn no_xattrs(mut self) -> Self {
        self.options = self.options.without_xattrs();
        self
    }

    /// Replace all options at once.
    #[must_use]
    pub fn options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Answer failures and conflicts with `resolver` instead of
    /// [`StopOnError`](crate::StopOnError).
    #[must_use]
    pub fn resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Receive stage, item and progress notifications.
    #[must_use]
    pub fn events(mut self, events: impl CopyEvents + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    /// Get a reference to the current options.
    pub fn transfer_options(&self) -> &TransferOptions {
        &self.options
    }

    /// Assemble the job without running it.
    ///
    /// # Errors
    ///
    /// Returns an error if no source was added, a source path is not an
    /// absolute path with a final component, or the destination is
    /// relative.
    pub fn build(self) -> Result<CopyJob> {
        let items = self
            .sources
            .into_iter()
            .map(|source| match source {
                Source::Item(item) => Ok(item),
                Source::Path(backend, path) => SourceItem::from_path(backend, path),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut job = CopyJob::new(
            items,
            self.destination,
            self.destination_backend,
            self.options,
        )?;
        if let Some(resolver) = self.resolver {
            job.set_resolver(resolver);
        }
        if let Some(events) = self.events {
            job.set_events(events);
        }
        Ok(job)
    }

    /// Build and run on the calling thread.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build). Failures during the run are reported
    /// through the resolver and the returned [`JobReport`].
    pub fn run(self) -> Result<JobReport> {
        Ok(self.build()?.run())
    }

    /// Build and run on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), plus [`Error::Spawn`](crate::Error::Spawn).
    pub fn spawn(self) -> Result<CopyJobHandle> {
        self.build()?.spawn()
    }
}
