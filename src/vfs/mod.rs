//! Filesystem backend contract.
//!
//! The engine never talks to a filesystem directly. Every source item and the
//! destination are bound to a [`Backend`], which hands out [`VfsFile`]
//! objects for byte streaming. Two reference backends ship with the crate:
//!
//! - [`NativeBackend`] (unix only): the local disk. Reports
//!   [`Backend::is_native`] so the engine can use device ids for same-volume
//!   detection and OS-level preallocation.
//! - [`MemoryBackend`]: an in-memory tree standing in for archive and
//!   network-share hosts.

mod error;
mod memory;
#[cfg(unix)]
mod native;

pub use error::{VfsError, VfsResult};
pub use memory::MemoryBackend;
#[cfg(unix)]
pub use native::NativeBackend;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared handle to a backend instance.
///
/// Identity matters: two handles refer to the same host only if they point
/// at the same allocation (`Arc::ptr_eq`).
pub type BackendHandle = Arc<dyn Backend>;

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link (only reported by no-follow stats)
    Symlink,
    /// Socket, fifo, device node
    Other,
}

/// Snapshot of an entry's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    /// Permission bits, including setuid/setgid/sticky (`0o7777` mask).
    pub mode: u32,
    pub size: u64,
    /// Device id of the volume holding the entry.
    pub dev: u64,
    pub inode: u64,
    pub uid: u32,
    pub gid: u32,
    /// BSD file flags. Zero where the platform has none.
    pub flags: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Creation time, if the backend tracks one.
    pub btime: Option<SystemTime>,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// True if both snapshots describe the same underlying object.
    pub fn same_object(&self, other: &Stat) -> bool {
        self.dev == other.dev && self.inode == other.inode
    }
}

/// Whether [`Backend::stat`] resolves a trailing symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    #[default]
    Follow,
    NoFollow,
}

/// Timestamps to apply with [`Backend::set_times`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub btime: Option<SystemTime>,
}

impl From<&Stat> for FileTimes {
    fn from(stat: &Stat) -> Self {
        Self {
            atime: stat.atime,
            mtime: stat.mtime,
            btime: stat.btime,
        }
    }
}

/// Flags for [`VfsFile::open`].
///
/// # Example
///
/// ```
/// use vfscopy::vfs::OpenFlags;
///
/// let flags = OpenFlags::write_only().with_create(0o644);
/// assert!(flags.create && flags.write && !flags.read);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    /// Open without blocking; the backend switches the handle back to
    /// blocking mode once the open succeeded.
    pub non_blocking: bool,
    /// Open a directory (for attribute access only).
    pub directory: bool,
    /// Permission bits for newly created files.
    pub mode: u32,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_create(mut self, mode: u32) -> Self {
        self.create = true;
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    #[must_use]
    pub fn with_directory(mut self) -> Self {
        self.directory = true;
        self
    }
}

/// A storage provider the engine can copy from and to.
///
/// Implementations must be usable from the job thread and from the
/// auxiliary I/O thread at the same time, hence `Send + Sync`.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name for logs ("native", "memory", ...).
    fn tag(&self) -> &str;

    /// True for the local disk. Native hosts get device-id based
    /// same-volume detection and preallocation.
    fn is_native(&self) -> bool {
        false
    }

    /// Identity of the volume that holds (or would hold) `path`.
    fn volume_id(&self, path: &Path) -> VfsResult<u64>;

    fn stat(&self, path: &Path, link: LinkMode) -> VfsResult<Stat>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path, LinkMode::NoFollow).is_ok()
    }

    /// Call `visitor` with the name of every entry in `path`, stopping early
    /// when it returns `false`. `.` and `..` are never reported.
    fn iterate_directory(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&OsStr) -> bool,
    ) -> VfsResult<()>;

    /// Create an unopened file object for `path`.
    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>>;

    fn create_directory(&self, path: &Path, mode: u32) -> VfsResult<()>;

    fn unlink(&self, path: &Path) -> VfsResult<()>;

    fn remove_directory(&self, path: &Path) -> VfsResult<()>;

    /// Rename within this backend, replacing a non-directory `to`.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    fn read_symlink(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Create a symlink at `path` pointing to `target`.
    fn create_symlink(&self, path: &Path, target: &Path) -> VfsResult<()>;

    fn set_permissions(&self, _path: &Path, _mode: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported("set_permissions"))
    }

    fn set_owner(&self, _path: &Path, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported("set_owner"))
    }

    fn set_flags(&self, _path: &Path, _flags: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported("set_flags"))
    }

    fn set_times(&self, _path: &Path, _times: &FileTimes) -> VfsResult<()> {
        Err(VfsError::Unsupported("set_times"))
    }

    /// True if the volume holding `path` keeps extended attributes in
    /// `._name` sidecar files instead of a native attribute store.
    fn uses_shadow_attribute_files(&self, _path: &Path, _stat: &Stat) -> bool {
        false
    }
}

/// An open (or openable) file on some backend.
///
/// Reads and writes return the number of bytes transferred; `Ok(0)` is a
/// legal short result that callers retry a bounded number of times.
pub trait VfsFile: Send {
    fn path(&self) -> &Path;

    fn open(&mut self, flags: OpenFlags) -> VfsResult<()>;

    fn is_open(&self) -> bool;

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64>;

    fn position(&self) -> VfsResult<u64>;

    fn size(&self) -> VfsResult<u64>;

    fn set_len(&mut self, len: u64) -> VfsResult<()>;

    /// Reserve `bytes` of storage past the current end of file.
    fn preallocate(&mut self, _bytes: u64) -> VfsResult<()> {
        Err(VfsError::Unsupported("preallocate"))
    }

    /// Announce how many bytes are about to be written. Upload-style
    /// backends need this before the first write.
    fn set_upload_size(&mut self, _size: u64) -> VfsResult<()> {
        Ok(())
    }

    /// Preferred I/O chunk size, or 0 for no preference.
    fn io_size_hint(&self) -> usize {
        0
    }

    fn close(&mut self) -> VfsResult<()>;

    fn xattr_names(&self) -> VfsResult<Vec<OsString>> {
        Ok(Vec::new())
    }

    fn xattr_get(&self, _name: &OsStr) -> VfsResult<Vec<u8>> {
        Err(VfsError::Unsupported("xattr_get"))
    }

    fn xattr_set(&mut self, _name: &OsStr, _value: &[u8]) -> VfsResult<()> {
        Err(VfsError::Unsupported("xattr_set"))
    }

    fn xattr_remove(&mut self, _name: &OsStr) -> VfsResult<()> {
        Err(VfsError::Unsupported("xattr_remove"))
    }
}

/// True if both handles point at the same backend instance.
pub fn same_backend(a: &BackendHandle, b: &BackendHandle) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
