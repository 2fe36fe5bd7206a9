//! Streamed file copy.
//!
//! One file is copied with two buffers: while the I/O pool writes the
//! chunk read in the previous round, the job thread reads the next one.
//! Both sides are joined before the buffers swap, so at most one write and
//! one read are in flight.

use super::arbiter::ExistsOutcome;
use super::attrs;
use super::catalog::SourceItems;
use super::verify::{ChecksumExpectation, DigestAccumulator};
use super::{CopyJob, Step};
use crate::resolver::Failure;
use crate::vfs::{BackendHandle, LinkMode, OpenFlags, Stat, VfsError, VfsFile, VfsResult};
use std::io::SeekFrom;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Consecutive zero-length reads or writes tolerated before failing.
const MAX_IO_LOOPS: usize = 5;

/// Smallest growth worth a preallocation call.
const PREALLOCATION_THRESHOLD: u64 = 4096;

/// Mode for new files when permissions are not copied.
const DEFAULT_FILE_MODE: u32 = 0o640;

/// How the destination is opened, sized and rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Setup {
    flags: OpenFlags,
    erase_xattrs: bool,
    /// Copy xattrs, flags and times. Off when appending.
    copy_attributes: bool,
    unlink_on_stop: bool,
    truncate: bool,
    size_on_stop: u64,
    total_size: u64,
    preallocate_delta: u64,
    initial_offset: u64,
}

impl Setup {
    /// No destination yet.
    fn create(source: &Stat, mode: u32) -> Self {
        Self {
            flags: OpenFlags::write_only().with_create(mode),
            erase_xattrs: false,
            copy_attributes: true,
            unlink_on_stop: true,
            truncate: false,
            size_on_stop: 0,
            total_size: source.size,
            preallocate_delta: source.size,
            initial_offset: 0,
        }
    }

    /// Replace the destination's content, truncating at the end if it was
    /// larger.
    fn overwrite(source: &Stat, destination: &Stat, mode: u32) -> Self {
        Self {
            flags: OpenFlags::write_only().with_create(mode),
            erase_xattrs: true,
            copy_attributes: true,
            unlink_on_stop: true,
            truncate: source.size < destination.size,
            size_on_stop: 0,
            total_size: source.size,
            preallocate_delta: source.size.saturating_sub(destination.size),
            initial_offset: 0,
        }
    }

    /// Write after the destination's current content, leaving its
    /// attributes alone.
    fn append(source: &Stat, destination: &Stat) -> Self {
        Self {
            flags: OpenFlags::write_only(),
            erase_xattrs: false,
            copy_attributes: false,
            unlink_on_stop: false,
            truncate: false,
            size_on_stop: destination.size,
            total_size: source.size + destination.size,
            preallocate_delta: source.size,
            initial_offset: destination.size,
        }
    }
}

/// Owns the open destination and undoes a partial copy when dropped
/// armed: truncate back to the pre-copy size, close, unlink if requested.
struct DestinationGuard {
    file: Box<dyn VfsFile>,
    backend: BackendHandle,
    path: PathBuf,
    size_on_stop: u64,
    unlink_on_stop: bool,
    armed: bool,
}

impl DestinationGuard {
    fn new(file: Box<dyn VfsFile>, backend: &BackendHandle, path: &Path, setup: &Setup) -> Self {
        Self {
            file,
            backend: BackendHandle::clone(backend),
            path: path.to_path_buf(),
            size_on_stop: setup.size_on_stop,
            unlink_on_stop: setup.unlink_on_stop,
            armed: true,
        }
    }

    fn file(&mut self) -> &mut dyn VfsFile {
        self.file.as_mut()
    }

    /// Every byte is written; keep the file.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        if !self.armed {
            if self.file.is_open() {
                let _ = self.file.close();
            }
            return;
        }
        debug!(path = %self.path.display(), "rolling back partial destination");
        if self.file.is_open() {
            if let Err(e) = self.file.set_len(self.size_on_stop) {
                debug!(path = %self.path.display(), error = %e, "truncate on rollback failed");
            }
            let _ = self.file.close();
        }
        if self.unlink_on_stop {
            if let Err(e) = self.backend.unlink(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial destination");
            }
        }
    }
}

/// Fill `buf` completely. On failure, also returns how much was read.
fn read_fully(file: &mut dyn VfsFile, buf: &mut [u8]) -> Result<(), (usize, VfsError)> {
    let mut done = 0;
    let mut idle = 0;
    while done < buf.len() {
        match file.read(&mut buf[done..]) {
            Ok(0) => {
                idle += 1;
                if idle > MAX_IO_LOOPS {
                    return Err((done, VfsError::ShortIo("read")));
                }
            }
            Ok(n) => done += n,
            Err(e) => return Err((done, e)),
        }
    }
    Ok(())
}

/// Write all of `buf`. On failure, also returns how much was written.
fn write_fully(file: &mut dyn VfsFile, buf: &[u8]) -> Result<(), (usize, VfsError)> {
    let mut done = 0;
    let mut idle = 0;
    while done < buf.len() {
        match file.write(&buf[done..]) {
            Ok(0) => {
                idle += 1;
                if idle > MAX_IO_LOOPS {
                    return Err((done, VfsError::ShortIo("write")));
                }
            }
            Ok(n) => done += n,
            Err(e) => return Err((done, e)),
        }
    }
    Ok(())
}

/// Bytes moved per round: the larger of the two preferred I/O sizes,
/// capped by the buffer. A hint of 0 means no preference.
fn chunk_size(buffer: usize, source_hint: usize, destination_hint: usize) -> usize {
    let preferred = |hint: usize| if hint == 0 { buffer } else { hint.min(buffer) };
    preferred(source_hint).max(preferred(destination_hint))
}

/// Open for reading, non-blocking first so a stalled host cannot hang the
/// open itself.
fn open_source(backend: &BackendHandle, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
    let mut file = backend.create_file(path)?;
    if let Err(e) = file.open(OpenFlags::read_only().with_non_blocking()) {
        trace!(path = %path.display(), error = %e, "non-blocking open failed, retrying blocking");
        file.open(OpenFlags::read_only())?;
    }
    Ok(file)
}

impl CopyJob {
    /// Copy the regular file at catalog `index` to `destination`.
    pub(super) fn copy_file(
        &mut self,
        catalog: &SourceItems,
        index: usize,
        destination: &Path,
    ) -> Step {
        let source_backend = catalog.host(index);
        let source_path = catalog.full_path(index);

        let mut source = match self.arbiter.retry(Failure::CantAccessSource, &source_path, || {
            open_source(source_backend, &source_path)
        }) {
            Ok(file) => file,
            Err(step) => return step,
        };
        let source_stat = match self.arbiter.retry(Failure::CantAccessSource, &source_path, || {
            source_backend.stat(&source_path, LinkMode::Follow)
        }) {
            Ok(stat) => stat,
            Err(step) => return step,
        };

        let mode = if self.options.copy_unix_permissions {
            source_stat.permissions()
        } else {
            DEFAULT_FILE_MODE
        };
        let backend = &self.destination_backend;
        let existing = match self
            .arbiter
            .retry(Failure::CantOpenDestinationFile, destination, || {
                match backend.stat(destination, LinkMode::Follow) {
                    Ok(stat) => Ok(Some(stat)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            }) {
            Ok(existing) => existing,
            Err(step) => return step,
        };
        let setup = match existing {
            None => Setup::create(&source_stat, mode),
            Some(existing) => {
                match self
                    .arbiter
                    .resolve_existing(&source_stat, &existing, destination, false)
                {
                    ExistsOutcome::Overwrite => Setup::overwrite(&source_stat, &existing, mode),
                    ExistsOutcome::Append => Setup::append(&source_stat, &existing),
                    ExistsOutcome::Skip => return Step::Skipped,
                    ExistsOutcome::Stop => return Step::Stop,
                }
            }
        };
        trace!(path = %destination.display(), ?setup, "destination setup");

        let backend = &self.destination_backend;
        let file = match self
            .arbiter
            .retry(Failure::CantOpenDestinationFile, destination, || {
                let mut file = backend.create_file(destination)?;
                file.open(setup.flags)?;
                Ok(file)
            }) {
            Ok(file) => file,
            Err(step) => return step,
        };
        let mut guard = DestinationGuard::new(file, &self.destination_backend, destination, &setup);

        if let Err(step) = self.size_destination(&mut guard, &setup, &source_stat, destination) {
            return step;
        }

        let mut digest = DigestAccumulator::default();
        let step = self.pump(
            source.as_mut(),
            &mut guard,
            source_stat.size,
            &source_path,
            destination,
            &mut digest,
        );
        if step != Step::Ok {
            return step;
        }
        guard.disarm();

        if self.options.copy_xattrs {
            if setup.erase_xattrs {
                attrs::erase_xattrs(guard.file());
            }
            if setup.copy_attributes {
                attrs::copy_xattrs(source.as_ref(), guard.file());
            }
        }
        if let Err(e) = guard.file().close() {
            warn!(path = %destination.display(), error = %e, "closing destination failed");
        }
        if let Err(e) = source.close() {
            debug!(path = %source_path.display(), error = %e, "closing source failed");
        }
        drop(guard);

        attrs::apply_path_attributes(
            &self.destination_backend,
            destination,
            &source_stat,
            &attrs::AttributeSet {
                flags: setup.copy_attributes && self.options.copy_unix_flags,
                times: setup.copy_attributes && self.options.copy_file_times,
                owner: self.options.copy_unix_owners,
                permissions: setup.copy_attributes && self.options.copy_unix_permissions,
            },
        );

        if let Some(digest) = digest.finish() {
            self.checksums.push(ChecksumExpectation {
                source_index: index,
                destination: destination.to_path_buf(),
                digest,
            });
        }
        Step::Ok
    }

    /// Preallocate, truncate and position the destination before streaming.
    fn size_destination(
        &mut self,
        guard: &mut DestinationGuard,
        setup: &Setup,
        source_stat: &Stat,
        destination: &Path,
    ) -> Result<(), Step> {
        let mut truncate = setup.truncate;
        if self.destination_backend.is_native() {
            if setup.preallocate_delta > PREALLOCATION_THRESHOLD {
                match guard.file().preallocate(setup.preallocate_delta) {
                    Ok(()) => trace!(bytes = setup.preallocate_delta, "preallocated"),
                    Err(e) => debug!(path = %destination.display(), error = %e, "preallocation failed"),
                }
                truncate = true;
            }
        } else {
            self.arbiter
                .retry(Failure::DestinationWriteError, destination, || {
                    guard.file().set_upload_size(source_stat.size)
                })?;
        }

        if truncate {
            self.arbiter
                .retry(Failure::DestinationWriteError, destination, || {
                    guard.file().set_len(setup.total_size)
                })?;
        }

        if setup.initial_offset > 0 {
            self.arbiter
                .retry(Failure::DestinationWriteError, destination, || {
                    guard
                        .file()
                        .seek(SeekFrom::Start(setup.initial_offset))
                        .map(|_| ())
                })?;
        }
        Ok(())
    }

    /// Double-buffered copy of `size` bytes.
    #[allow(clippy::too_many_arguments)]
    fn pump(
        &mut self,
        source: &mut dyn VfsFile,
        guard: &mut DestinationGuard,
        size: u64,
        source_path: &Path,
        destination: &Path,
        digest: &mut DigestAccumulator,
    ) -> Step {
        self.ensure_buffers();
        let hashing = self.options.computes_checksums();
        let unit = chunk_size(
            self.buffers[0].len(),
            source.io_size_hint(),
            guard.file().io_size_hint(),
        );
        let [first, second] = &mut self.buffers;
        let (mut read_buf, mut write_buf) = (first, second);
        let mut remaining = size;
        let mut pending = 0usize;

        while remaining > 0 || pending > 0 {
            if self.control.check_pause_or_stop() {
                return Step::Stop;
            }

            let to_read = usize::try_from(remaining).map_or(unit, |r| r.min(unit));
            let mut write_outcome = Ok(());
            let mut read_outcome = Ok(());
            {
                let chunk = &write_buf[..pending];
                let target = &mut read_buf[..to_read];
                let dst = guard.file();
                let write_slot = &mut write_outcome;
                let read_slot = &mut read_outcome;
                match &self.io_pool {
                    Some(pool) => pool.in_place_scope(|scope| {
                        if !chunk.is_empty() {
                            scope.spawn(move |_| *write_slot = write_fully(dst, chunk));
                        }
                        if !target.is_empty() {
                            *read_slot = read_fully(source, target);
                        }
                    }),
                    None => {
                        if !chunk.is_empty() {
                            *write_slot = write_fully(dst, chunk);
                        }
                        if !target.is_empty() {
                            *read_slot = read_fully(source, target);
                        }
                    }
                }
            }

            if let Err((mut done, mut error)) = write_outcome {
                loop {
                    if let Some(step) =
                        self.arbiter
                            .fail(Failure::DestinationWriteError, &error, destination)
                    {
                        return step;
                    }
                    match write_fully(guard.file(), &write_buf[done..pending]) {
                        Ok(()) => break,
                        Err((more, e)) => {
                            done += more;
                            error = e;
                        }
                    }
                }
            }
            if pending > 0 {
                let total = self.control.with_stats(|s| {
                    s.add_value(pending as u64);
                    s.snapshot()
                });
                self.events.bytes_transferred(total.value, total.max_value);
            }

            if let Err((mut done, mut error)) = read_outcome {
                loop {
                    if let Some(step) = self
                        .arbiter
                        .fail(Failure::SourceReadError, &error, source_path)
                    {
                        return step;
                    }
                    match read_fully(source, &mut read_buf[done..to_read]) {
                        Ok(()) => break,
                        Err((more, e)) => {
                            done += more;
                            error = e;
                        }
                    }
                }
            }
            if hashing && to_read > 0 {
                digest.consume(&read_buf[..to_read]);
            }

            remaining -= to_read as u64;
            pending = to_read;
            mem::swap(&mut read_buf, &mut write_buf);
        }
        Step::Ok
    }
}
