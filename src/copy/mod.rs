//! The copy/move engine.
//!
//! A [`CopyJob`] runs through a fixed sequence of stages:
//!
//! 1. **Preparing**: classify the destination ([`PathCompositionMode`]) and
//!    create the directories it needs.
//! 2. **Scanning**: walk every source item into a flat, pre-ordered catalog.
//! 3. **Processing**: create directories, stream files, recreate symlinks,
//!    or rename whole entries when a move stays on one volume.
//! 4. **Verifying**: read every streamed destination back and compare MD5
//!    digests (only when verification applies and something was hashed).
//! 5. **Cleaning**: delete the sources of a cross-volume move, children
//!    before parents.
//!
//! Every recoverable failure is routed through the job's
//! [`ConflictResolver`]; see [`crate::resolver`].

mod arbiter;
mod attrs;
mod catalog;
mod cleanup;
mod directory;
mod planner;
mod rename;
mod symlink;
#[cfg(test)]
pub(crate) mod test_support;
mod transfer;
mod verify;

pub use planner::PathCompositionMode;
pub use verify::{ChecksumExpectation, VerificationFailure, VerificationOutcome};

use crate::error::{Error, Result};
use crate::events::{CopyEvents, NoEvents};
use crate::job::{self, Job, JobControl, JobHandle, JobState, StatisticsSnapshot};
use crate::options::{TransferMode, TransferOptions};
use crate::resolver::{ConflictResolver, StopOnError};
use crate::vfs::{BackendHandle, FileKind, Stat, same_backend};
use arbiter::Arbiter;
use catalog::SourceItems;
use planner::Planner;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// How one catalog entry (or one stage) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Ok,
    Skipped,
    /// Skipped, and every later error is skipped without asking.
    SkipAll,
    Stop,
}

/// A top-level item to transfer: `name` inside `directory` on `backend`.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub backend: BackendHandle,
    /// Absolute base directory. Destination paths are built relative to it.
    pub directory: PathBuf,
    pub name: OsString,
}

impl SourceItem {
    pub fn new(
        backend: BackendHandle,
        directory: impl Into<PathBuf>,
        name: impl Into<OsString>,
    ) -> Self {
        Self {
            backend,
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Split an absolute path into base directory and name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSourceItem`] for relative paths and paths
    /// without a final component (`/`, `..`).
    pub fn from_path(backend: BackendHandle, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if path.is_absolute() => {
                Ok(Self::new(backend, parent, name))
            }
            _ => Err(Error::InvalidSourceItem(path.to_path_buf())),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    fn is_valid(&self) -> bool {
        let name = Path::new(&self.name);
        self.directory.is_absolute()
            && !self.name.is_empty()
            && name.file_name() == Some(self.name.as_os_str())
    }
}

/// Where a job is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobStage {
    #[default]
    Preparing,
    Scanning,
    Processing,
    Verifying,
    Cleaning,
    Completed,
    Stopped,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Scanning => "scanning",
            Self::Processing => "processing",
            Self::Verifying => "verifying",
            Self::Cleaning => "cleaning",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// `Completed` or `Stopped`
    pub stage: JobStage,
    pub statistics: StatisticsSnapshot,
    /// Entries created, streamed or renamed
    pub items_copied: u64,
    /// Entries not transferred, for whatever reason
    pub items_skipped: u64,
    /// Errors answered with Skip or SkipAll
    pub items_failed: u64,
    /// Destinations whose digest matched the source
    pub checksums_verified: usize,
    pub failed_verifications: Vec<VerificationFailure>,
}

impl JobReport {
    /// Completed, with no skipped errors and no verification failures.
    pub fn is_success(&self) -> bool {
        self.stage == JobStage::Completed
            && self.items_failed == 0
            && self.failed_verifications.is_empty()
    }
}

/// A copy or move of a list of source items to one destination.
///
/// # Example
///
/// ```
/// use vfscopy::vfs::MemoryBackend;
/// use vfscopy::{CopyJob, SourceItem, TransferOptions};
///
/// let source = MemoryBackend::new();
/// source.write_file("/docs/readme.txt", b"hello").unwrap();
/// let destination = MemoryBackend::new();
///
/// let report = CopyJob::new(
///     vec![SourceItem::new(source.into_handle(), "/", "docs")],
///     "/backup/",
///     destination.clone().into_handle(),
///     TransferOptions::default(),
/// )
/// .unwrap()
/// .run();
///
/// assert!(report.is_success());
/// assert_eq!(destination.read_file("/backup/docs/readme.txt").unwrap(), b"hello");
/// ```
pub struct CopyJob {
    items: Vec<SourceItem>,
    destination: PathBuf,
    destination_backend: BackendHandle,
    options: TransferOptions,
    arbiter: Arbiter,
    events: Box<dyn CopyEvents>,
    control: Arc<JobControl>,
    stage: Arc<Mutex<JobStage>>,
    /// Volume id of the destination, for native same-volume checks.
    destination_volume: Option<u64>,
    buffers: [Vec<u8>; 2],
    io_pool: Option<rayon::ThreadPool>,
    checksums: Vec<ChecksumExpectation>,
    checksums_verified: usize,
    failed_verifications: Vec<VerificationFailure>,
    /// Catalog indices to delete once a move finished, in catalog order.
    to_delete: Vec<usize>,
    /// Directories whose permissions and times are applied after processing.
    pending_dir_attrs: Vec<(usize, PathBuf)>,
    items_copied: u64,
    items_skipped: u64,
}

impl fmt::Debug for CopyJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyJob")
            .field("items", &self.items)
            .field("destination", &self.destination)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CopyJob {
    /// Create a job. Nothing is touched until [`run`](Self::run) or
    /// [`spawn`](Self::spawn).
    ///
    /// # Errors
    ///
    /// - [`Error::EmptySourceList`] if `items` is empty
    /// - [`Error::RelativeDestination`] if `destination` is not absolute
    /// - [`Error::InvalidSourceItem`] for an item with a relative directory or
    ///   a name that is not a single path component
    pub fn new(
        items: Vec<SourceItem>,
        destination: impl Into<PathBuf>,
        destination_backend: BackendHandle,
        options: TransferOptions,
    ) -> Result<Self> {
        let destination = destination.into();
        if items.is_empty() {
            return Err(Error::EmptySourceList);
        }
        if !destination.is_absolute() {
            return Err(Error::RelativeDestination(destination));
        }
        if let Some(item) = items.iter().find(|item| !item.is_valid()) {
            return Err(Error::InvalidSourceItem(item.path()));
        }

        let control = Arc::new(JobControl::new());
        let arbiter = Arbiter::new(
            Box::new(StopOnError),
            Arc::clone(&control),
            options.exist_behavior,
        );
        Ok(Self {
            items,
            destination,
            destination_backend,
            options,
            arbiter,
            events: Box::new(NoEvents),
            control,
            stage: Arc::default(),
            destination_volume: None,
            buffers: [Vec::new(), Vec::new()],
            io_pool: None,
            checksums: Vec::new(),
            checksums_verified: 0,
            failed_verifications: Vec::new(),
            to_delete: Vec::new(),
            pending_dir_attrs: Vec::new(),
            items_copied: 0,
            items_skipped: 0,
        })
    }

    /// Replace the default [`StopOnError`] resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.set_resolver(Box::new(resolver));
        self
    }

    /// Receive stage, item and progress notifications.
    #[must_use]
    pub fn with_events(mut self, events: impl CopyEvents + 'static) -> Self {
        self.set_events(Box::new(events));
        self
    }

    pub(crate) fn set_resolver(&mut self, resolver: Box<dyn ConflictResolver>) {
        self.arbiter.set_resolver(resolver);
    }

    pub(crate) fn set_events(&mut self, events: Box<dyn CopyEvents>) {
        self.events = events;
    }

    /// Pause/stop flags and statistics of this job.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    /// Run on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the thread cannot be created.
    pub fn spawn(self) -> Result<CopyJobHandle> {
        let stage = Arc::clone(&self.stage);
        let inner = job::spawn(self)?;
        Ok(CopyJobHandle { inner, stage })
    }

    /// Run to the end on the calling thread.
    pub fn run(mut self) -> JobReport {
        self.control.begin();
        info!(
            mode = ?self.options.mode,
            items = self.items.len(),
            destination = %self.destination.display(),
            "job started"
        );

        let outcome = self.run_stages();
        if outcome.is_err() {
            self.control.stop();
        }
        let stage = match self.control.finish() {
            JobState::Stopped => JobStage::Stopped,
            _ => JobStage::Completed,
        };
        self.set_stage(stage);

        let report = JobReport {
            stage,
            statistics: self.control.statistics(),
            items_copied: self.items_copied,
            items_skipped: self.items_skipped,
            items_failed: self.arbiter.failed(),
            checksums_verified: self.checksums_verified,
            failed_verifications: std::mem::take(&mut self.failed_verifications),
        };
        info!(
            %stage,
            copied = report.items_copied,
            skipped = report.items_skipped,
            failed = report.items_failed,
            bytes = report.statistics.value,
            "job finished"
        );
        self.events.job_finished(&report);
        report
    }

    fn run_stages(&mut self) -> std::result::Result<(), Step> {
        self.set_stage(JobStage::Preparing);
        let planner = self.prepare()?;
        self.destination_volume = match self.destination_backend.volume_id(&self.destination) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(destination = %self.destination.display(), error = %e, "destination volume unknown");
                None
            }
        };

        self.set_stage(JobStage::Scanning);
        let catalog = self.scan()?;
        let total = catalog.total_bytes();
        self.control.with_stats(|s| s.set_max_value(total));

        self.set_stage(JobStage::Processing);
        let processed = self.process(&catalog, &planner);
        self.apply_directory_attributes(&catalog);
        processed?;

        if !self.checksums.is_empty() {
            self.set_stage(JobStage::Verifying);
            self.verify()?;
        }

        if self.options.mode == TransferMode::Move
            && !self.to_delete.is_empty()
            && self.failed_verifications.is_empty()
        {
            self.set_stage(JobStage::Cleaning);
            self.clean_up(&catalog)?;
        }
        Ok(())
    }

    fn process(&mut self, catalog: &SourceItems, planner: &Planner) -> std::result::Result<(), Step> {
        self.ensure_io_pool();
        // Entries whose subtree may be processed.
        let mut transferred = vec![false; catalog.len()];

        for index in 0..catalog.len() {
            if self.control.check_pause_or_stop() {
                return Err(Step::Stop);
            }
            let entry = catalog.entry(index);
            if entry.parent.is_some_and(|parent| !transferred[parent]) {
                self.items_skipped += 1;
                continue;
            }

            let source = catalog.full_path(index);
            let destination = planner.compose(&catalog.relative_path(index));
            let name = entry.name.to_string_lossy().into_owned();
            self.control.with_stats(|s| s.set_current_item(name));
            self.events.item_started(&source);

            let rename = self.options.mode == TransferMode::Move
                && self.same_volume(catalog.host(index), &entry.stat);
            let step = if rename {
                self.rename_item(catalog, index, &destination)
            } else {
                match entry.stat.kind {
                    FileKind::Directory => self.copy_directory(catalog, index, &destination),
                    FileKind::Regular => self.copy_file(catalog, index, &destination),
                    FileKind::Symlink => self.copy_symlink(catalog, index, &destination),
                    FileKind::Other => Step::Skipped,
                }
            };
            debug!(source = %source.display(), destination = %destination.display(), ?step, "entry processed");

            match step {
                Step::Ok => {
                    self.items_copied += 1;
                    transferred[index] = true;
                    if self.options.mode == TransferMode::Move && !rename {
                        self.to_delete.push(index);
                    }
                }
                Step::Skipped | Step::SkipAll => self.items_skipped += 1,
                Step::Stop => return Err(Step::Stop),
            }
        }
        Ok(())
    }

    fn set_stage(&mut self, stage: JobStage) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = stage;
        debug!(%stage, "stage changed");
        self.events.stage_changed(stage);
    }

    fn ensure_io_pool(&mut self) {
        if self.io_pool.is_some() {
            return;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "vfscopy-io".to_string())
            .build()
        {
            Ok(pool) => self.io_pool = Some(pool),
            Err(e) => warn!(error = %e, "I/O thread unavailable, copying without overlap"),
        }
    }

    /// Size both pipeline buffers.
    pub(super) fn ensure_buffers(&mut self) {
        let size = self.options.effective_buffer_size();
        for buffer in &mut self.buffers {
            buffer.resize(size, 0);
        }
    }

    /// True if an entry of `backend` can reach the destination by rename.
    pub(super) fn same_volume(&self, backend: &BackendHandle, stat: &Stat) -> bool {
        match (backend.is_native(), self.destination_backend.is_native()) {
            (true, true) => self.destination_volume == Some(stat.dev),
            (false, false) => same_backend(backend, &self.destination_backend),
            _ => false,
        }
    }
}

impl Job for CopyJob {
    type Output = JobReport;

    fn name(&self) -> &str {
        match self.options.mode {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }

    fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    fn execute(self) -> JobReport {
        self.run()
    }
}

/// Controller side of a spawned [`CopyJob`].
#[derive(Debug)]
pub struct CopyJobHandle {
    inner: JobHandle<JobReport>,
    stage: Arc<Mutex<JobStage>>,
}

impl CopyJobHandle {
    pub fn pause(&self) {
        self.inner.pause();
    }

    pub fn resume(&self) {
        self.inner.resume();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn stage(&self) -> JobStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics()
    }

    /// Shared control block, e.g. for a Ctrl-C handler.
    pub fn control(&self) -> Arc<JobControl> {
        self.inner.control()
    }

    /// Wait for the job and return its report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobPanicked`] if the job thread panicked.
    pub fn join(self) -> Result<JobReport> {
        self.inner.join()
    }
}
