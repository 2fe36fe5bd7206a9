//! Local disk backend.

use super::{
    Backend, FileKind, FileTimes, LinkMode, OpenFlags, Stat, VfsError, VfsFile, VfsResult,
};
use filetime::FileTime;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use xattr::FileExt;

/// The local filesystem, accessed through `std::fs` and `libc`.
///
/// Keeps a per-instance cache of which devices store extended attributes in
/// `._name` sidecar files.
#[derive(Debug, Default)]
pub struct NativeBackend {
    shadow_attribute_devices: Mutex<HashMap<u64, bool>>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning a ready-to-use handle.
    pub fn shared() -> super::BackendHandle {
        std::sync::Arc::new(Self::new())
    }
}

fn system_time(secs: i64, nanos: i64) -> SystemTime {
    let nanos = u32::try_from(nanos).unwrap_or(0);
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs.unsigned_abs(), nanos)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::from_nanos(u64::from(nanos))
    }
}

fn stat_from_metadata(meta: &Metadata) -> Stat {
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_file() {
        FileKind::Regular
    } else {
        FileKind::Other
    };

    Stat {
        kind,
        mode: meta.mode() & 0o7777,
        size: meta.size(),
        dev: meta.dev(),
        inode: meta.ino(),
        uid: meta.uid(),
        gid: meta.gid(),
        flags: bsd_flags(meta),
        atime: system_time(meta.atime(), meta.atime_nsec()),
        mtime: system_time(meta.mtime(), meta.mtime_nsec()),
        ctime: system_time(meta.ctime(), meta.ctime_nsec()),
        btime: meta.created().ok(),
    }
}

#[cfg(target_os = "macos")]
fn bsd_flags(meta: &Metadata) -> u32 {
    use std::os::macos::fs::MetadataExt as _;
    meta.st_flags()
}

#[cfg(not(target_os = "macos"))]
fn bsd_flags(_meta: &Metadata) -> u32 {
    0
}

fn c_path(path: &Path) -> VfsResult<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| VfsError::other(format!("path contains NUL byte: {}", path.display())))
}

/// Filesystems that cannot hold native extended attributes, so macOS-style
/// tools write `._name` sidecars onto them.
#[cfg(target_os = "linux")]
fn lacks_native_xattrs(path: &Path) -> bool {
    const MSDOS_SUPER_MAGIC: i64 = 0x4d44;
    const EXFAT_SUPER_MAGIC: i64 = 0x2011_bab0;
    const SMB_SUPER_MAGIC: i64 = 0x517b;

    let Ok(c_path) = c_path(path) else {
        return false;
    };
    // SAFETY: statfs is plain data; zeroed is a valid initial value.
    let mut buf: libc::statfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and buf is a valid out-pointer.
    let rc = unsafe { libc::statfs(c_path.as_ptr(), &mut buf) };
    if rc != 0 {
        return false;
    }
    #[allow(clippy::useless_conversion)]
    let fs_type = i64::from(buf.f_type);
    matches!(
        fs_type,
        MSDOS_SUPER_MAGIC | EXFAT_SUPER_MAGIC | SMB_SUPER_MAGIC
    )
}

#[cfg(not(target_os = "linux"))]
fn lacks_native_xattrs(_path: &Path) -> bool {
    false
}

impl Backend for NativeBackend {
    fn tag(&self) -> &str {
        "native"
    }

    fn is_native(&self) -> bool {
        true
    }

    fn volume_id(&self, path: &Path) -> VfsResult<u64> {
        // The path itself may not exist yet; the nearest existing ancestor
        // lives on the same volume.
        path.ancestors()
            .find_map(|p| fs::metadata(p).ok())
            .map(|m| m.dev())
            .ok_or_else(|| VfsError::not_found(path))
    }

    fn stat(&self, path: &Path, link: LinkMode) -> VfsResult<Stat> {
        let meta = match link {
            LinkMode::Follow => fs::metadata(path),
            LinkMode::NoFollow => fs::symlink_metadata(path),
        }
        .map_err(|e| VfsError::from_io(e, path))?;
        Ok(stat_from_metadata(&meta))
    }

    fn iterate_directory(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&OsStr) -> bool,
    ) -> VfsResult<()> {
        for entry in fs::read_dir(path).map_err(|e| VfsError::from_io(e, path))? {
            let entry = entry.map_err(|e| VfsError::from_io(e, path))?;
            if !visitor(&entry.file_name()) {
                break;
            }
        }
        Ok(())
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(NativeFile {
            path: path.to_path_buf(),
            file: None,
        }))
    }

    fn create_directory(&self, path: &Path, mode: u32) -> VfsResult<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(|e| VfsError::from_io(e, path))
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        fs::remove_file(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn remove_directory(&self, path: &Path) -> VfsResult<()> {
        fs::remove_dir(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        fs::rename(from, to).map_err(|e| VfsError::from_io(e, to))
    }

    fn read_symlink(&self, path: &Path) -> VfsResult<PathBuf> {
        fs::read_link(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn create_symlink(&self, path: &Path, target: &Path) -> VfsResult<()> {
        std::os::unix::fs::symlink(target, path).map_err(|e| VfsError::from_io(e, path))
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> VfsResult<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| VfsError::from_io(e, path))
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
            .map_err(|e| VfsError::from_io(e, path))
    }

    #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    fn set_flags(&self, path: &Path, flags: u32) -> VfsResult<()> {
        let c_path = c_path(path)?;
        // SAFETY: c_path is a valid NUL-terminated string.
        let rc = unsafe { libc::chflags(c_path.as_ptr(), flags.into()) };
        if rc != 0 {
            return Err(VfsError::from_io(std::io::Error::last_os_error(), path));
        }
        Ok(())
    }

    fn set_times(&self, path: &Path, times: &FileTimes) -> VfsResult<()> {
        filetime::set_symlink_file_times(
            path,
            FileTime::from_system_time(times.atime),
            FileTime::from_system_time(times.mtime),
        )
        .map_err(|e| VfsError::from_io(e, path))
    }

    fn uses_shadow_attribute_files(&self, path: &Path, stat: &Stat) -> bool {
        let mut cache = self
            .shadow_attribute_devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cache
            .entry(stat.dev)
            .or_insert_with(|| lacks_native_xattrs(path))
    }
}

/// A file on the local disk.
#[derive(Debug)]
struct NativeFile {
    path: PathBuf,
    file: Option<File>,
}

impl NativeFile {
    fn handle(&self) -> VfsResult<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| VfsError::not_open(&self.path))
    }

    fn io_error(&self, e: std::io::Error) -> VfsError {
        VfsError::from_io(e, &self.path)
    }
}

fn clear_non_blocking(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file` and stays open for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl VfsFile for NativeFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self, flags: OpenFlags) -> VfsResult<()> {
        let mut options = OpenOptions::new();
        options
            .read(flags.read || flags.directory)
            .write(flags.write && !flags.directory)
            .create(flags.create)
            .truncate(false);
        if flags.create {
            options.mode(flags.mode);
        }
        if flags.non_blocking {
            options.custom_flags(libc::O_NONBLOCK);
        }

        let file = options.open(&self.path).map_err(|e| self.io_error(e))?;
        if flags.non_blocking {
            clear_non_blocking(&file).map_err(|e| self.io_error(e))?;
        }
        self.file = Some(file);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut file = self.handle()?;
        file.read(buf).map_err(|e| self.io_error(e))
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let mut file = self.handle()?;
        file.write(buf).map_err(|e| self.io_error(e))
    }

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let mut file = self.handle()?;
        file.seek(pos).map_err(|e| self.io_error(e))
    }

    fn position(&self) -> VfsResult<u64> {
        let mut file = self.handle()?;
        file.stream_position().map_err(|e| self.io_error(e))
    }

    fn size(&self) -> VfsResult<u64> {
        let file = self.handle()?;
        file.metadata()
            .map(|m| m.len())
            .map_err(|e| self.io_error(e))
    }

    fn set_len(&mut self, len: u64) -> VfsResult<()> {
        self.handle()?.set_len(len).map_err(|e| self.io_error(e))
    }

    #[cfg(target_os = "linux")]
    fn preallocate(&mut self, bytes: u64) -> VfsResult<()> {
        let file = self.handle()?;
        let offset = file.metadata().map_err(|e| self.io_error(e))?.len();
        let (Ok(offset), Ok(len)) = (libc::off_t::try_from(offset), libc::off_t::try_from(bytes))
        else {
            return Err(VfsError::other("preallocation size out of range"));
        };
        // SAFETY: fd belongs to an open file; offset/len are validated above.
        let rc = unsafe { libc::fallocate(file.as_raw_fd(), 0, offset, len) };
        if rc != 0 {
            return Err(self.io_error(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn io_size_hint(&self) -> usize {
        self.file
            .as_ref()
            .and_then(|f| f.metadata().ok())
            .map_or(0, |m| usize::try_from(m.blksize()).unwrap_or(0))
    }

    fn close(&mut self) -> VfsResult<()> {
        self.file = None;
        Ok(())
    }

    fn xattr_names(&self) -> VfsResult<Vec<OsString>> {
        let file = self.handle()?;
        file.list_xattr()
            .map(Iterator::collect)
            .map_err(|e| self.io_error(e))
    }

    fn xattr_get(&self, name: &OsStr) -> VfsResult<Vec<u8>> {
        let file = self.handle()?;
        file.get_xattr(name)
            .map_err(|e| self.io_error(e))?
            .ok_or_else(|| VfsError::not_found(Path::new(name)))
    }

    fn xattr_set(&mut self, name: &OsStr, value: &[u8]) -> VfsResult<()> {
        let file = self.handle()?;
        file.set_xattr(name, value).map_err(|e| self.io_error(e))
    }

    fn xattr_remove(&mut self, name: &OsStr) -> VfsResult<()> {
        let file = self.handle()?;
        file.remove_xattr(name).map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stat_kinds() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();

        let file = dir.path().join("file.txt");
        fs::write(&file, "content").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&file, &link).unwrap();

        let st = backend.stat(&file, LinkMode::Follow).unwrap();
        assert!(st.is_regular());
        assert_eq!(st.size, 7);

        assert!(backend.stat(&link, LinkMode::NoFollow).unwrap().is_symlink());
        assert!(backend.stat(&link, LinkMode::Follow).unwrap().is_regular());
        assert!(backend.stat(dir.path(), LinkMode::Follow).unwrap().is_dir());

        let err = backend
            .stat(&dir.path().join("missing"), LinkMode::Follow)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_volume_id_of_missing_path_uses_ancestor() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();
        let existing = backend.volume_id(dir.path()).unwrap();
        let missing = backend.volume_id(&dir.path().join("a/b/c")).unwrap();
        assert_eq!(existing, missing);
    }

    #[test]
    fn test_file_roundtrip_and_non_blocking_open() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();
        let path = dir.path().join("data.bin");

        let mut file = backend.create_file(&path).unwrap();
        file.open(OpenFlags::write_only().with_create(0o600)).unwrap();
        assert_eq!(file.write(b"hello world").unwrap(), 11);
        file.close().unwrap();
        assert!(!file.is_open());

        let mut file = backend.create_file(&path).unwrap();
        file.open(OpenFlags::read_only().with_non_blocking()).unwrap();
        assert_eq!(file.size().unwrap(), 11);
        file.seek(SeekFrom::Start(6)).unwrap();
        let mut buf = [0u8; 16];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(file.position().unwrap(), 11);
    }

    #[test]
    fn test_unopened_file_reports_not_open() {
        let backend = NativeBackend::new();
        let mut file = backend.create_file(Path::new("/nonexistent/file")).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(file.read(&mut buf), Err(VfsError::NotOpen(_))));
    }

    #[test]
    fn test_iterate_directory_and_remove() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();
        backend
            .create_directory(&dir.path().join("sub"), 0o755)
            .unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let mut names = Vec::new();
        backend
            .iterate_directory(dir.path(), &mut |name| {
                names.push(name.to_owned());
                true
            })
            .unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("a.txt"), OsString::from("sub")]);

        backend.unlink(&dir.path().join("a.txt")).unwrap();
        backend.remove_directory(&dir.path().join("sub")).unwrap();
        assert!(!backend.exists(&dir.path().join("sub")));
    }

    #[test]
    fn test_set_times_and_permissions() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();
        let path = dir.path().join("file.txt");
        fs::write(&path, "x").unwrap();

        let mtime = UNIX_EPOCH + Duration::from_secs(1_000_000);
        backend
            .set_times(
                &path,
                &FileTimes {
                    atime: mtime,
                    mtime,
                    btime: None,
                },
            )
            .unwrap();
        backend.set_permissions(&path, 0o600).unwrap();

        let st = backend.stat(&path, LinkMode::Follow).unwrap();
        assert_eq!(st.mtime, mtime);
        assert_eq!(st.permissions(), 0o600);
    }
}
