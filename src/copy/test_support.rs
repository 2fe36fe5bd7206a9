//! Test doubles shared by the engine's unit tests.

use crate::resolver::{ConflictResolver, Decision, ExistsAction, ExistsResolution};
use crate::vfs::{
    Backend, BackendHandle, FileKind, FileTimes, LinkMode, MemoryBackend, OpenFlags, Stat,
    VfsError, VfsFile, VfsResult,
};
use std::ffi::{OsStr, OsString};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

pub(crate) type ResolverLog = Arc<Mutex<Vec<(String, PathBuf)>>>;

/// Answers every error with one decision and every conflict with one
/// resolution, recording each call.
pub(crate) struct RecordingResolver {
    decision: Decision,
    exists: ExistsResolution,
    log: ResolverLog,
}

impl RecordingResolver {
    pub(crate) fn new(decision: Decision) -> Self {
        Self {
            decision,
            exists: ExistsResolution::once(ExistsAction::Stop),
            log: Arc::default(),
        }
    }

    pub(crate) fn with_exists(mut self, exists: ExistsResolution) -> Self {
        self.exists = exists;
        self
    }

    pub(crate) fn log(&self) -> ResolverLog {
        Arc::clone(&self.log)
    }

    fn record(&self, what: &str, path: &Path) {
        self.log
            .lock()
            .unwrap()
            .push((what.to_string(), path.to_path_buf()));
    }
}

impl ConflictResolver for RecordingResolver {
    fn cant_access_source(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("cant_access_source", path);
        self.decision
    }

    fn cant_create_destination_root_dir(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("cant_create_destination_root_dir", path);
        self.decision
    }

    fn cant_create_destination_dir(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("cant_create_destination_dir", path);
        self.decision
    }

    fn cant_open_destination_file(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("cant_open_destination_file", path);
        self.decision
    }

    fn destination_write_error(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("destination_write_error", path);
        self.decision
    }

    fn source_read_error(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("source_read_error", path);
        self.decision
    }

    fn destination_read_error(&mut self, _error: &VfsError, path: &Path) -> Decision {
        self.record("destination_read_error", path);
        self.decision
    }

    fn destination_exists(&mut self, _s: &Stat, _d: &Stat, path: &Path) -> ExistsResolution {
        self.record("destination_exists", path);
        self.exists
    }

    fn rename_destination_exists(&mut self, _s: &Stat, _d: &Stat, path: &Path) -> ExistsResolution {
        self.record("rename_destination_exists", path);
        self.exists
    }

    fn already_exists(&mut self, path: &Path, _existing: &Stat) -> Decision {
        self.record("already_exists", path);
        self.decision
    }
}

pub(crate) fn stat_with_mtime(mtime: SystemTime) -> Stat {
    Stat {
        kind: FileKind::Regular,
        mode: 0o644,
        size: 0,
        dev: 1,
        inode: 1,
        uid: 0,
        gid: 0,
        flags: 0,
        atime: mtime,
        mtime,
        ctime: mtime,
        btime: None,
    }
}

/// Remaining write budget shared by every file of a [`FaultyBackend`].
/// `None` means unlimited.
type Budget = Arc<Mutex<Option<u64>>>;

/// A memory backend whose file writes start failing with `ENOSPC` once a
/// byte budget is used up.
#[derive(Debug)]
pub(crate) struct FaultyBackend {
    inner: MemoryBackend,
    budget: Budget,
    fail_reads: bool,
    denied: Arc<Mutex<Option<PathBuf>>>,
}

impl FaultyBackend {
    pub(crate) fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            budget: Arc::default(),
            fail_reads: false,
            denied: Arc::default(),
        }
    }

    pub(crate) fn fail_writes_after(self, bytes: u64) -> Self {
        *self.budget.lock().unwrap() = Some(bytes);
        self
    }

    pub(crate) fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Make `stat` of `path` fail with a permission error.
    pub(crate) fn deny_stat(self, path: impl Into<PathBuf>) -> Self {
        *self.denied.lock().unwrap() = Some(path.into());
        self
    }

    /// Lift the write budget and any stat denial.
    pub(crate) fn heal(&self) {
        *self.budget.lock().unwrap() = None;
        *self.denied.lock().unwrap() = None;
    }

    pub(crate) fn budget(&self) -> Budget {
        Arc::clone(&self.budget)
    }

    pub(crate) fn into_handle(self) -> BackendHandle {
        Arc::new(self)
    }
}

impl Backend for FaultyBackend {
    fn tag(&self) -> &str {
        "faulty"
    }

    fn volume_id(&self, path: &Path) -> VfsResult<u64> {
        self.inner.volume_id(path)
    }

    fn stat(&self, path: &Path, link: LinkMode) -> VfsResult<Stat> {
        if self.denied.lock().unwrap().as_deref() == Some(path) {
            return Err(VfsError::PermissionDenied(path.display().to_string()));
        }
        self.inner.stat(path, link)
    }

    fn iterate_directory(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&OsStr) -> bool,
    ) -> VfsResult<()> {
        self.inner.iterate_directory(path, visitor)
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(FaultyFile {
            inner: self.inner.create_file(path)?,
            budget: Arc::clone(&self.budget),
            fail_reads: self.fail_reads,
        }))
    }

    fn create_directory(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.inner.create_directory(path, mode)
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        self.inner.unlink(path)
    }

    fn remove_directory(&self, path: &Path) -> VfsResult<()> {
        self.inner.remove_directory(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.inner.rename(from, to)
    }

    fn read_symlink(&self, path: &Path) -> VfsResult<PathBuf> {
        self.inner.read_symlink(path)
    }

    fn create_symlink(&self, path: &Path, target: &Path) -> VfsResult<()> {
        self.inner.create_symlink(path, target)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.inner.set_permissions(path, mode)
    }

    fn set_times(&self, path: &Path, times: &FileTimes) -> VfsResult<()> {
        self.inner.set_times(path, times)
    }
}

struct FaultyFile {
    inner: Box<dyn VfsFile>,
    budget: Budget,
    fail_reads: bool,
}

impl VfsFile for FaultyFile {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn open(&mut self, flags: OpenFlags) -> VfsResult<()> {
        self.inner.open(flags)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if self.fail_reads {
            return Err(VfsError::Io(io::Error::from(io::ErrorKind::InvalidData)));
        }
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let mut budget = self.budget.lock().unwrap();
        let allowed = match *budget {
            None => buf.len(),
            Some(0) => return Err(VfsError::Io(io::Error::from_raw_os_error(28))),
            Some(left) => buf.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
        };
        let written = self.inner.write(&buf[..allowed])?;
        if let Some(left) = budget.as_mut() {
            *left -= written as u64;
        }
        Ok(written)
    }

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        self.inner.seek(pos)
    }

    fn position(&self) -> VfsResult<u64> {
        self.inner.position()
    }

    fn size(&self) -> VfsResult<u64> {
        self.inner.size()
    }

    fn set_len(&mut self, len: u64) -> VfsResult<()> {
        self.inner.set_len(len)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.inner.close()
    }

    fn xattr_names(&self) -> VfsResult<Vec<OsString>> {
        self.inner.xattr_names()
    }
}
