//! In-memory filesystem backend.
//!
//! Stands in for non-native hosts (archives, network shares) in tests and
//! embedding applications. All data is ephemeral.

use super::{
    Backend, BackendHandle, FileKind, FileTimes, LinkMode, OpenFlags, Stat, VfsError, VfsFile,
    VfsResult,
};
use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Device ids handed out to memory backends, far away from real ones.
static NEXT_DEVICE: AtomicU64 = AtomicU64::new(0xfeed_0000);

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    inode: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    flags: u32,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
    btime: SystemTime,
    xattrs: BTreeMap<OsString, Vec<u8>>,
}

impl Entry {
    fn new(node: Node, inode: u64, mode: u32) -> Self {
        let now = SystemTime::now();
        Self {
            node,
            inode,
            mode,
            uid: 0,
            gid: 0,
            flags: 0,
            atime: now,
            mtime: now,
            ctime: now,
            btime: now,
            xattrs: BTreeMap::new(),
        }
    }

    fn kind(&self) -> FileKind {
        match self.node {
            Node::File(_) => FileKind::Regular,
            Node::Directory => FileKind::Directory,
            Node::Symlink(_) => FileKind::Symlink,
        }
    }

    fn size(&self) -> u64 {
        match &self.node {
            Node::File(data) => data.len() as u64,
            Node::Symlink(target) => target.as_os_str().len() as u64,
            Node::Directory => 0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    device: u64,
    entries: RwLock<HashMap<PathBuf, Entry>>,
    next_inode: AtomicU64,
    shadow_attribute_files: bool,
    require_upload_size: bool,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn inode(&self) -> u64 {
        self.next_inode.fetch_add(1, Ordering::Relaxed)
    }

    fn stat_entry(&self, entry: &Entry) -> Stat {
        Stat {
            kind: entry.kind(),
            mode: entry.mode,
            size: entry.size(),
            dev: self.device,
            inode: entry.inode,
            uid: entry.uid,
            gid: entry.gid,
            flags: entry.flags,
            atime: entry.atime,
            mtime: entry.mtime,
            ctime: entry.ctime,
            btime: Some(entry.btime),
        }
    }
}

/// Normalize to an absolute path without `.`/`..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(s) => result.push(s),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    result
}

/// Follow a trailing symlink chain.
fn resolve(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<PathBuf> {
    let mut current = normalize(path);
    for _ in 0..MAX_SYMLINK_HOPS {
        match entries.get(&current) {
            Some(Entry {
                node: Node::Symlink(target),
                ..
            }) => {
                current = match current.parent() {
                    Some(parent) if target.is_relative() => normalize(&parent.join(target)),
                    _ => normalize(target),
                };
            }
            Some(_) => return Ok(current),
            None => return Err(VfsError::not_found(path)),
        }
    }
    Err(VfsError::other(format!(
        "too many levels of symbolic links: {}",
        path.display()
    )))
}

fn require_parent_dir(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
    let parent = path.parent().unwrap_or(Path::new("/"));
    match entries.get(parent) {
        Some(Entry {
            node: Node::Directory,
            ..
        }) => Ok(()),
        Some(_) => Err(VfsError::not_a_directory(parent)),
        None => Err(VfsError::not_found(parent)),
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via an internal `RwLock`. Every instance gets its own device
/// id, so two instances never count as the same volume. Cloning yields a
/// second handle onto the same tree.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use vfscopy::vfs::{Backend, LinkMode, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.write_file("/docs/readme.txt", b"hello").unwrap();
/// let st = backend.stat(Path::new("/docs/readme.txt"), LinkMode::Follow).unwrap();
/// assert_eq!(st.size, 5);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new filesystem containing only `/`.
    pub fn new() -> Self {
        Self::build(false, false)
    }

    /// A backend that requires [`VfsFile::set_upload_size`] before the first
    /// write, the way upload-only network hosts do.
    pub fn upload_only() -> Self {
        Self::build(false, true)
    }

    /// A backend whose volume keeps extended attributes in `._name` files.
    pub fn with_shadow_attribute_files() -> Self {
        Self::build(true, false)
    }

    fn build(shadow_attribute_files: bool, require_upload_size: bool) -> Self {
        let inner = Inner {
            device: NEXT_DEVICE.fetch_add(1, Ordering::Relaxed),
            entries: RwLock::new(HashMap::new()),
            next_inode: AtomicU64::new(2),
            shadow_attribute_files,
            require_upload_size,
        };
        inner
            .write()
            .insert(PathBuf::from("/"), Entry::new(Node::Directory, 1, 0o755));
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Wrap into a [`BackendHandle`].
    pub fn into_handle(self) -> BackendHandle {
        Arc::new(self)
    }

    /// Create or replace a regular file, creating missing parents.
    pub fn write_file(&self, path: impl AsRef<Path>, data: &[u8]) -> VfsResult<()> {
        let path = normalize(path.as_ref());
        self.create_dir_all(path.parent().unwrap_or(Path::new("/")))?;
        let mut entries = self.inner.write();
        match entries.get_mut(&path) {
            Some(Entry {
                node: Node::Directory,
                ..
            }) => Err(VfsError::is_a_directory(&path)),
            Some(entry) => {
                entry.node = Node::File(data.to_vec());
                entry.mtime = SystemTime::now();
                Ok(())
            }
            None => {
                let inode = self.inner.inode();
                entries.insert(path, Entry::new(Node::File(data.to_vec()), inode, 0o644));
                Ok(())
            }
        }
    }

    /// Read a whole regular file.
    pub fn read_file(&self, path: impl AsRef<Path>) -> VfsResult<Vec<u8>> {
        let entries = self.inner.read();
        let resolved = resolve(&entries, path.as_ref())?;
        match entries.get(&resolved).map(|e| &e.node) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(_) => Err(VfsError::is_a_directory(path.as_ref())),
            None => Err(VfsError::not_found(path.as_ref())),
        }
    }

    /// `mkdir -p`.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let path = normalize(path.as_ref());
        let mut entries = self.inner.write();
        let mut current = PathBuf::from("/");
        for component in path.components() {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry {
                        node: Node::Directory,
                        ..
                    }) => {}
                    Some(_) => return Err(VfsError::not_a_directory(&current)),
                    None => {
                        let inode = self.inner.inode();
                        entries.insert(current.clone(), Entry::new(Node::Directory, inode, 0o755));
                    }
                }
            }
        }
        Ok(())
    }

    /// Set an extended attribute directly on an entry.
    pub fn set_xattr(&self, path: impl AsRef<Path>, name: &str, value: &[u8]) -> VfsResult<()> {
        let path = normalize(path.as_ref());
        let mut entries = self.inner.write();
        let entry = entries
            .get_mut(&path)
            .ok_or_else(|| VfsError::not_found(&path))?;
        entry.xattrs.insert(OsString::from(name), value.to_vec());
        Ok(())
    }

    /// Read an extended attribute directly from an entry.
    pub fn xattr(&self, path: impl AsRef<Path>, name: &str) -> Option<Vec<u8>> {
        let entries = self.inner.read();
        entries
            .get(&normalize(path.as_ref()))
            .and_then(|e| e.xattrs.get(OsStr::new(name)).cloned())
    }

    /// Number of entries, `/` included.
    pub fn entry_count(&self) -> usize {
        self.inner.read().len()
    }
}

impl Backend for MemoryBackend {
    fn tag(&self) -> &str {
        "memory"
    }

    fn volume_id(&self, _path: &Path) -> VfsResult<u64> {
        Ok(self.inner.device)
    }

    fn stat(&self, path: &Path, link: LinkMode) -> VfsResult<Stat> {
        let entries = self.inner.read();
        let target = match link {
            LinkMode::Follow => resolve(&entries, path)?,
            LinkMode::NoFollow => normalize(path),
        };
        entries
            .get(&target)
            .map(|e| self.inner.stat_entry(e))
            .ok_or_else(|| VfsError::not_found(path))
    }

    fn iterate_directory(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&OsStr) -> bool,
    ) -> VfsResult<()> {
        // Collect first so the visitor runs without the lock held.
        let names: Vec<OsString> = {
            let entries = self.inner.read();
            let dir = resolve(&entries, path)?;
            match entries.get(&dir).map(|e| &e.node) {
                Some(Node::Directory) => {}
                Some(_) => return Err(VfsError::not_a_directory(path)),
                None => return Err(VfsError::not_found(path)),
            }
            let mut names: Vec<OsString> = entries
                .keys()
                .filter(|p| p.parent() == Some(dir.as_path()))
                .filter_map(|p| p.file_name().map(OsStr::to_os_string))
                .collect();
            names.sort();
            names
        };
        for name in &names {
            if !visitor(name) {
                break;
            }
        }
        Ok(())
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(MemoryFile {
            fs: Arc::clone(&self.inner),
            path: path.to_path_buf(),
            state: None,
            upload_size: None,
        }))
    }

    fn create_directory(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let path = normalize(path);
        let mut entries = self.inner.write();
        if entries.contains_key(&path) {
            return Err(VfsError::already_exists(&path));
        }
        require_parent_dir(&entries, &path)?;
        let inode = self.inner.inode();
        entries.insert(path, Entry::new(Node::Directory, inode, mode & 0o7777));
        Ok(())
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        let path = normalize(path);
        let mut entries = self.inner.write();
        match entries.get(&path).map(|e| &e.node) {
            Some(Node::Directory) => Err(VfsError::is_a_directory(&path)),
            Some(_) => {
                entries.remove(&path);
                Ok(())
            }
            None => Err(VfsError::not_found(&path)),
        }
    }

    fn remove_directory(&self, path: &Path) -> VfsResult<()> {
        let path = normalize(path);
        let mut entries = self.inner.write();
        match entries.get(&path).map(|e| &e.node) {
            Some(Node::Directory) => {}
            Some(_) => return Err(VfsError::not_a_directory(&path)),
            None => return Err(VfsError::not_found(&path)),
        }
        if entries.keys().any(|p| p.parent() == Some(path.as_path())) {
            return Err(VfsError::directory_not_empty(&path));
        }
        entries.remove(&path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        if from == to {
            return Ok(());
        }
        let mut entries = self.inner.write();
        let moving_dir = match entries.get(&from).map(|e| &e.node) {
            Some(Node::Directory) => true,
            Some(_) => false,
            None => return Err(VfsError::not_found(&from)),
        };
        if moving_dir && to.starts_with(&from) {
            return Err(VfsError::other(format!(
                "cannot move {} into itself",
                from.display()
            )));
        }
        require_parent_dir(&entries, &to)?;
        match entries.get(&to).map(|e| &e.node) {
            Some(Node::Directory) if !moving_dir => return Err(VfsError::is_a_directory(&to)),
            Some(Node::Directory) => {
                if entries.keys().any(|p| p.parent() == Some(to.as_path())) {
                    return Err(VfsError::directory_not_empty(&to));
                }
            }
            Some(_) if moving_dir => return Err(VfsError::not_a_directory(&to)),
            _ => {}
        }

        // Move the entry and, for directories, the whole subtree.
        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|p| p.starts_with(&from))
            .cloned()
            .collect();
        entries.remove(&to);
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let suffix = old.strip_prefix(&from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(suffix)
                };
                entries.insert(new, entry);
            }
        }
        Ok(())
    }

    fn read_symlink(&self, path: &Path) -> VfsResult<PathBuf> {
        let entries = self.inner.read();
        match entries.get(&normalize(path)).map(|e| &e.node) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(VfsError::other(format!(
                "not a symbolic link: {}",
                path.display()
            ))),
            None => Err(VfsError::not_found(path)),
        }
    }

    fn create_symlink(&self, path: &Path, target: &Path) -> VfsResult<()> {
        let path = normalize(path);
        let mut entries = self.inner.write();
        if entries.contains_key(&path) {
            return Err(VfsError::already_exists(&path));
        }
        require_parent_dir(&entries, &path)?;
        let inode = self.inner.inode();
        entries.insert(
            path,
            Entry::new(Node::Symlink(target.to_path_buf()), inode, 0o777),
        );
        Ok(())
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.update(path, |e| e.mode = mode & 0o7777)
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        self.update(path, |e| {
            e.uid = uid;
            e.gid = gid;
        })
    }

    fn set_flags(&self, path: &Path, flags: u32) -> VfsResult<()> {
        self.update(path, |e| e.flags = flags)
    }

    fn set_times(&self, path: &Path, times: &FileTimes) -> VfsResult<()> {
        self.update(path, |e| {
            e.atime = times.atime;
            e.mtime = times.mtime;
            if let Some(btime) = times.btime {
                e.btime = btime;
            }
        })
    }

    fn uses_shadow_attribute_files(&self, _path: &Path, _stat: &Stat) -> bool {
        self.inner.shadow_attribute_files
    }
}

impl MemoryBackend {
    fn update(&self, path: &Path, f: impl FnOnce(&mut Entry)) -> VfsResult<()> {
        let path = normalize(path);
        let mut entries = self.inner.write();
        let entry = entries
            .get_mut(&path)
            .ok_or_else(|| VfsError::not_found(&path))?;
        f(entry);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenState {
    readable: bool,
    writable: bool,
    pos: u64,
}

/// A file handle into a [`MemoryBackend`]. Writes land in the shared tree
/// immediately.
#[derive(Debug)]
struct MemoryFile {
    fs: Arc<Inner>,
    path: PathBuf,
    state: Option<OpenState>,
    upload_size: Option<u64>,
}

impl MemoryFile {
    fn state(&self) -> VfsResult<OpenState> {
        self.state.ok_or_else(|| VfsError::not_open(&self.path))
    }

    fn key(&self) -> PathBuf {
        normalize(&self.path)
    }

    fn with_entry<T>(&self, f: impl FnOnce(&Entry) -> VfsResult<T>) -> VfsResult<T> {
        let entries = self.fs.read();
        let resolved = resolve(&entries, &self.path)?;
        let entry = entries
            .get(&resolved)
            .ok_or_else(|| VfsError::not_found(&self.path))?;
        f(entry)
    }

    fn with_entry_mut<T>(&self, f: impl FnOnce(&mut Entry) -> VfsResult<T>) -> VfsResult<T> {
        let mut entries = self.fs.write();
        let resolved = resolve(&entries, &self.path)?;
        let entry = entries
            .get_mut(&resolved)
            .ok_or_else(|| VfsError::not_found(&self.path))?;
        f(entry)
    }
}

impl VfsFile for MemoryFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self, flags: OpenFlags) -> VfsResult<()> {
        let key = self.key();
        let mut entries = self.fs.write();
        let resolved = match resolve(&entries, &key) {
            Ok(resolved) => resolved,
            Err(e) if e.is_not_found() && flags.create => {
                require_parent_dir(&entries, &key)?;
                let inode = self.fs.inode();
                entries.insert(
                    key.clone(),
                    Entry::new(Node::File(Vec::new()), inode, flags.mode & 0o7777),
                );
                key
            }
            Err(e) => return Err(e),
        };
        let entry = entries
            .get(&resolved)
            .ok_or_else(|| VfsError::not_found(&self.path))?;

        match &entry.node {
            Node::Directory if flags.directory && !flags.write => {}
            Node::Directory => return Err(VfsError::is_a_directory(&self.path)),
            Node::File(_) if flags.directory => {
                return Err(VfsError::not_a_directory(&self.path));
            }
            Node::File(_) => {}
            Node::Symlink(_) => return Err(VfsError::other("dangling symlink")),
        }
        self.state = Some(OpenState {
            readable: flags.read || flags.directory,
            writable: flags.write,
            pos: 0,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let state = self.state()?;
        if !state.readable {
            return Err(VfsError::other("file not opened for reading"));
        }
        let n = self.with_entry(|entry| match &entry.node {
            Node::File(data) => {
                let start = usize::try_from(state.pos)
                    .unwrap_or(usize::MAX)
                    .min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            _ => Err(VfsError::is_a_directory(&self.path)),
        })?;
        if let Some(state) = self.state.as_mut() {
            state.pos += n as u64;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let state = self.state()?;
        if !state.writable {
            return Err(VfsError::other("file not opened for writing"));
        }
        if self.fs.require_upload_size && self.upload_size.is_none() {
            return Err(VfsError::other("upload size must be declared before writing"));
        }
        let start = usize::try_from(state.pos)
            .map_err(|_| VfsError::other("write offset out of range"))?;
        self.with_entry_mut(|entry| match &mut entry.node {
            Node::File(data) => {
                if data.len() < start {
                    data.resize(start, 0);
                }
                let overlap = (data.len() - start).min(buf.len());
                data[start..start + overlap].copy_from_slice(&buf[..overlap]);
                data.extend_from_slice(&buf[overlap..]);
                entry.mtime = SystemTime::now();
                Ok(())
            }
            _ => Err(VfsError::is_a_directory(&self.path)),
        })?;
        if let Some(state) = self.state.as_mut() {
            state.pos += buf.len() as u64;
        }
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let state = self.state()?;
        let size = self.size()?;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => size.checked_add_signed(delta),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| VfsError::other("seek out of range"))?;
        if let Some(state) = self.state.as_mut() {
            state.pos = target;
        }
        Ok(target)
    }

    fn position(&self) -> VfsResult<u64> {
        Ok(self.state()?.pos)
    }

    fn size(&self) -> VfsResult<u64> {
        self.state()?;
        self.with_entry(|entry| Ok(entry.size()))
    }

    fn set_len(&mut self, len: u64) -> VfsResult<()> {
        let state = self.state()?;
        if !state.writable {
            return Err(VfsError::other("file not opened for writing"));
        }
        let len = usize::try_from(len).map_err(|_| VfsError::other("length out of range"))?;
        self.with_entry_mut(|entry| match &mut entry.node {
            Node::File(data) => {
                data.resize(len, 0);
                Ok(())
            }
            _ => Err(VfsError::is_a_directory(&self.path)),
        })
    }

    fn set_upload_size(&mut self, size: u64) -> VfsResult<()> {
        self.upload_size = Some(size);
        Ok(())
    }

    fn close(&mut self) -> VfsResult<()> {
        self.state = None;
        self.upload_size = None;
        Ok(())
    }

    fn xattr_names(&self) -> VfsResult<Vec<OsString>> {
        self.state()?;
        self.with_entry(|entry| Ok(entry.xattrs.keys().cloned().collect()))
    }

    fn xattr_get(&self, name: &OsStr) -> VfsResult<Vec<u8>> {
        self.state()?;
        self.with_entry(|entry| {
            entry
                .xattrs
                .get(name)
                .cloned()
                .ok_or_else(|| VfsError::not_found(Path::new(name)))
        })
    }

    fn xattr_set(&mut self, name: &OsStr, value: &[u8]) -> VfsResult<()> {
        self.state()?;
        self.with_entry_mut(|entry| {
            entry.xattrs.insert(name.to_os_string(), value.to_vec());
            Ok(())
        })
    }

    fn xattr_remove(&mut self, name: &OsStr) -> VfsResult<()> {
        self.state()?;
        self.with_entry_mut(|entry| {
            entry
                .xattrs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| VfsError::not_found(Path::new(name)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_and_stat() {
        let fs = MemoryBackend::new();
        fs.write_file("/a/b/c.txt", b"hello").unwrap();

        assert!(fs.stat(Path::new("/a/b"), LinkMode::Follow).unwrap().is_dir());
        let st = fs.stat(Path::new("/a/b/c.txt"), LinkMode::Follow).unwrap();
        assert!(st.is_regular());
        assert_eq!(st.size, 5);
        assert_eq!(fs.read_file("/a/b/c.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_instances_have_distinct_devices() {
        let a = MemoryBackend::new();
        let b = MemoryBackend::new();
        let root = Path::new("/");
        assert_ne!(a.volume_id(root).unwrap(), b.volume_id(root).unwrap());

        let a2 = a.clone();
        assert_eq!(a.volume_id(root).unwrap(), a2.volume_id(root).unwrap());
    }

    #[test]
    fn test_file_handle_seek_and_truncate() {
        let fs = MemoryBackend::new();
        fs.write_file("/f", b"abc").unwrap();

        let mut file = fs.create_file(Path::new("/f")).unwrap();
        file.open(OpenFlags::write_only()).unwrap();
        assert_eq!(file.position().unwrap(), 0);
        file.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(file.position().unwrap(), 3);
        file.write(b"def").unwrap();
        file.close().unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"abcdef");

        let mut file = fs.create_file(Path::new("/f")).unwrap();
        file.open(OpenFlags::write_only()).unwrap();
        file.set_len(2).unwrap();
        assert_eq!(file.size().unwrap(), 2);
    }

    #[test]
    fn test_create_requires_parent() {
        let fs = MemoryBackend::new();
        let mut file = fs.create_file(Path::new("/missing/file")).unwrap();
        let err = file
            .open(OpenFlags::write_only().with_create(0o644))
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(fs.create_directory(Path::new("/x/y"), 0o755).is_err());
        fs.create_directory(Path::new("/x"), 0o755).unwrap();
        fs.create_directory(Path::new("/x/y"), 0o755).unwrap();
    }

    #[test]
    fn test_remove_directory_refuses_non_empty() {
        let fs = MemoryBackend::new();
        fs.write_file("/d/f", b"x").unwrap();
        let err = fs.remove_directory(Path::new("/d")).unwrap_err();
        assert!(matches!(err, VfsError::DirectoryNotEmpty(_)));

        fs.unlink(Path::new("/d/f")).unwrap();
        fs.remove_directory(Path::new("/d")).unwrap();
        assert!(!fs.exists(Path::new("/d")));
    }

    #[test]
    fn test_rename_moves_subtree_and_keeps_inode() {
        let fs = MemoryBackend::new();
        fs.write_file("/src/dir/file", b"data").unwrap();
        let before = fs.stat(Path::new("/src/dir/file"), LinkMode::Follow).unwrap();

        fs.rename(Path::new("/src"), Path::new("/dst")).unwrap();

        assert!(!fs.exists(Path::new("/src")));
        let after = fs.stat(Path::new("/dst/dir/file"), LinkMode::Follow).unwrap();
        assert_eq!(before.inode, after.inode);
        assert_eq!(fs.read_file("/dst/dir/file").unwrap(), b"data");
    }

    #[test]
    fn test_symlinks() {
        let fs = MemoryBackend::new();
        fs.write_file("/target", b"12345").unwrap();
        fs.create_symlink(Path::new("/link"), Path::new("target"))
            .unwrap();

        assert!(fs.stat(Path::new("/link"), LinkMode::NoFollow).unwrap().is_symlink());
        assert_eq!(fs.stat(Path::new("/link"), LinkMode::Follow).unwrap().size, 5);
        assert_eq!(
            fs.read_symlink(Path::new("/link")).unwrap(),
            PathBuf::from("target")
        );
    }

    #[test]
    fn test_upload_only_requires_size() {
        let fs = MemoryBackend::upload_only();
        let mut file = fs.create_file(Path::new("/up")).unwrap();
        file.open(OpenFlags::write_only().with_create(0o644)).unwrap();
        assert!(file.write(b"x").is_err());
        file.set_upload_size(1).unwrap();
        assert_eq!(file.write(b"x").unwrap(), 1);
    }

    #[test]
    fn test_xattrs_through_handle() {
        let fs = MemoryBackend::new();
        fs.write_file("/f", b"").unwrap();
        fs.set_xattr("/f", "user.tag", b"v1").unwrap();

        let mut file = fs.create_file(Path::new("/f")).unwrap();
        file.open(OpenFlags::read_only()).unwrap();
        assert_eq!(file.xattr_names().unwrap(), vec![OsString::from("user.tag")]);
        assert_eq!(file.xattr_get(OsStr::new("user.tag")).unwrap(), b"v1");
        file.xattr_remove(OsStr::new("user.tag")).unwrap();
        assert_eq!(fs.xattr("/f", "user.tag"), None);
    }
}
