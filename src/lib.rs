//! # vfscopy
//!
//! Copy, move and rename engine for heterogeneous filesystem backends.
//!
//! ## Core Features
//!
//! - **Backend agnostic**: sources and destination are reached through the
//!   [`vfs::Backend`] trait; local disk and an in-memory host ship with the
//!   crate
//! - **Topology aware moves**: entries on the destination volume are renamed,
//!   everything else is copied and deleted afterwards
//! - **Overlapped streaming**: one buffer is written on an I/O thread while
//!   the next one is read
//! - **No partial files**: an aborted file is truncated back or removed
//! - **Checksum verification**: optional MD5 read-back after the copy
//! - **Resolver driven**: every recoverable failure and every existing
//!   destination goes through a [`ConflictResolver`]
//! - **Pausable**: jobs run on their own thread and can be paused, resumed
//!   and stopped
//!
//! ## Quick Start with Builder API
//!
//! ```
//! use vfscopy::TransferBuilder;
//! use vfscopy::vfs::MemoryBackend;
//!
//! let archive = MemoryBackend::new();
//! archive.write_file("/docs/report.pdf", b"%PDF").unwrap();
//! let share = MemoryBackend::new();
//!
//! let report = TransferBuilder::new(share.clone().into_handle(), "/incoming/")
//!     .source(archive.into_handle(), "/docs")
//!     .run()?;
//!
//! println!("{} items, {} bytes", report.items_copied, report.statistics.value);
//! # Ok::<(), vfscopy::Error>(())
//! ```
//!
//! ## Job API
//!
//! For control over a running transfer, build a [`CopyJob`] and spawn it:
//!
//! ```no_run
//! use vfscopy::vfs::NativeBackend;
//! use vfscopy::{CopyJob, SkipOnError, SourceItem, TransferOptions};
//!
//! let disk = NativeBackend::shared();
//! let job = CopyJob::new(
//!     vec![SourceItem::from_path(disk.clone(), "/var/log/app")?],
//!     "/mnt/backup/",
//!     disk,
//!     TransferOptions::default().with_move(),
//! )?
//! .with_resolver(SkipOnError);
//!
//! let handle = job.spawn()?;
//! handle.pause();
//! handle.resume();
//! let report = handle.join()?;
//! # Ok::<(), vfscopy::Error>(())
//! ```
//!
//! ## Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `progress` | Progress bar support with indicatif |
//! | `serde` | Serialize/Deserialize for [`TransferOptions`] and friends |
//! | `full` | Enable all optional features |
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.
//! Decisions, skipped entries and best-effort attribute failures are logged
//! at `debug`, partial cleanups and lost volume information at `warn`.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
mod copy;
mod error;
mod events;
pub mod job;
mod options;
pub mod resolver;
pub mod vfs;

#[cfg(feature = "progress")]
mod progress;

pub use builder::TransferBuilder;
pub use copy::{
    ChecksumExpectation, CopyJob, CopyJobHandle, JobReport, JobStage, PathCompositionMode,
    SourceItem, VerificationFailure, VerificationOutcome,
};
pub use error::{Error, Result};
pub use events::{CopyEvents, NoEvents};
pub use job::{JobControl, JobState, StatisticsSnapshot};
pub use options::{
    ChecksumVerification, DEFAULT_BUFFER_SIZE, ExistBehavior, MIN_BUFFER_SIZE, TransferMode,
    TransferOptions,
};
pub use resolver::{
    ConflictResolver, Decision, ExistsAction, ExistsResolution, SkipOnError, StopOnError,
};

#[cfg(feature = "progress")]
#[cfg_attr(docsrs, doc(cfg(feature = "progress")))]
pub use progress::{ProgressBarEvents, create_progress_bar};
