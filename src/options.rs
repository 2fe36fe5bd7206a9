//! Configuration options for transfer jobs.
//!
//! This module provides [`TransferOptions`] for configuring a job,
//! [`TransferMode`] to pick copy or move, [`ExistBehavior`] for handling
//! destination conflicts and [`ChecksumVerification`] for the post-copy
//! verification policy.
//!
//! # Example
//!
//! ```
//! use vfscopy::{ChecksumVerification, ExistBehavior, TransferOptions};
//!
//! let options = TransferOptions::default()
//!     .with_move()
//!     .with_exist_behavior(ExistBehavior::OverwriteOlder)
//!     .with_verification(ChecksumVerification::Always);
//! ```

/// Whether sources are kept after the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferMode {
    /// Copy items, leaving the sources untouched.
    #[default]
    Copy,
    /// Move items: rename on the same volume, copy then delete otherwise.
    Move,
}

/// Behavior when a destination entry already exists.
///
/// Mutable during a run: an "apply to all" answer from the resolver upgrades
/// [`ExistBehavior::Ask`] to one of the sticky variants, after which the
/// resolver is no longer consulted for conflicts.
///
/// # Default
///
/// The default is [`ExistBehavior::Ask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExistBehavior {
    /// Ask the resolver for every conflict.
    #[default]
    Ask,
    /// Leave every existing destination alone.
    SkipAll,
    /// Replace every existing destination.
    OverwriteAll,
    /// Replace only destinations whose mtime is older than the source's.
    ///
    /// If mtimes are equal, the item is skipped.
    OverwriteOlder,
    /// Append source content to every existing destination file.
    AppendAll,
}

/// When to verify copied files against an MD5 digest of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChecksumVerification {
    /// Never compute digests.
    #[default]
    Never,
    /// Only for [`TransferMode::Move`], where the source is deleted afterwards.
    OnMove,
    /// For every streamed file.
    Always,
}

impl ChecksumVerification {
    /// True if digests are computed for a job running in `mode`.
    pub fn applies_to(self, mode: TransferMode) -> bool {
        match self {
            Self::Never => false,
            Self::OnMove => mode == TransferMode::Move,
            Self::Always => true,
        }
    }
}

/// Default pipeline buffer size (512 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;

/// Smallest accepted pipeline buffer size (4 KiB).
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Options for a transfer job.
///
/// Use [`Default::default()`] to get sensible defaults, then customize
/// using the builder methods.
///
/// # Default Values
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `mode` | `Copy` | Keep sources |
/// | `preserve_symlinks` | `true` | Recreate symlinks (don't follow) |
/// | `copy_unix_permissions` | `true` | Copy permission bits |
/// | `copy_unix_owners` | `true` | Copy uid/gid (best-effort) |
/// | `copy_unix_flags` | `true` | Copy BSD file flags |
/// | `copy_file_times` | `true` | Copy atime/mtime/btime |
/// | `copy_xattrs` | `true` | Copy extended attributes |
/// | `verification` | `Never` | No checksums |
/// | `exist_behavior` | `Ask` | Ask the resolver |
/// | `buffer_size` | 512 KiB | Pipeline buffer size |
///
/// # Example
///
/// ```
/// use vfscopy::TransferOptions;
///
/// let options = TransferOptions::default()
///     .with_buffer_size(64 * 1024)
///     .without_owners();
/// assert_eq!(options.buffer_size, 64 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct TransferOptions {
    /// Copy or move
    pub mode: TransferMode,

    /// Whether to preserve symlinks (default: true)
    ///
    /// If false, symlinks are followed and the target content is copied.
    pub preserve_symlinks: bool,

    /// Whether to copy permission bits (default: true)
    ///
    /// When false, new files are created with mode `0o640`.
    pub copy_unix_permissions: bool,

    /// Whether to copy ownership (default: true)
    ///
    /// Failures (e.g. when not running as root) are logged and ignored.
    pub copy_unix_owners: bool,

    /// Whether to copy BSD file flags (default: true)
    pub copy_unix_flags: bool,

    /// Whether to copy timestamps (default: true)
    pub copy_file_times: bool,

    /// Whether to copy extended attributes (default: true)
    pub copy_xattrs: bool,

    /// Checksum verification policy
    pub verification: ChecksumVerification,

    /// Initial behavior for existing destinations
    pub exist_behavior: ExistBehavior,

    /// Size of each of the two pipeline buffers in bytes
    pub buffer_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            mode: TransferMode::Copy,
            preserve_symlinks: true,
            copy_unix_permissions: true,
            copy_unix_owners: true,
            copy_unix_flags: true,
            copy_file_times: true,
            copy_xattrs: true,
            verification: ChecksumVerification::Never,
            exist_behavior: ExistBehavior::Ask,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl TransferOptions {
    /// Move instead of copy
    #[must_use]
    pub fn with_move(mut self) -> Self {
        self.mode = TransferMode::Move;
        self
    }

    /// Set the transfer mode
    #[must_use]
    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the initial conflict behavior
    #[must_use]
    pub fn with_exist_behavior(mut self, behavior: ExistBehavior) -> Self {
        self.exist_behavior = behavior;
        self
    }

    /// Set the checksum verification policy
    #[must_use]
    pub fn with_verification(mut self, verification: ChecksumVerification) -> Self {
        self.verification = verification;
        self
    }

    /// Set the pipeline buffer size
    ///
    /// Value is clamped to at least 4 KiB.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(MIN_BUFFER_SIZE);
        self
    }

    /// Follow symlinks and copy their targets
    #[must_use]
    pub fn with_follow_symlinks(mut self) -> Self {
        self.preserve_symlinks = false;
        self
    }

    /// Disable permission copying
    ///
    /// New files get mode `0o640` and existing modes are left alone.
    #[must_use]
    pub fn without_permissions(mut self) -> Self {
        self.copy_unix_permissions = false;
        self
    }

    /// Disable ownership copying
    #[must_use]
    pub fn without_owners(mut self) -> Self {
        self.copy_unix_owners = false;
        self
    }

    /// Disable BSD flag copying
    #[must_use]
    pub fn without_flags(mut self) -> Self {
        self.copy_unix_flags = false;
        self
    }

    /// Disable timestamp preservation
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.copy_file_times = false;
        self
    }

    /// Disable extended attribute copying
    #[must_use]
    pub fn without_xattrs(mut self) -> Self {
        self.copy_xattrs = false;
        self
    }

    /// Buffer size after clamping, for options built by struct literal.
    pub(crate) fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(MIN_BUFFER_SIZE)
    }

    /// True if streamed files get an MD5 digest.
    pub(crate) fn computes_checksums(&self) -> bool {
        self.verification.applies_to(self.mode)
    }
}
