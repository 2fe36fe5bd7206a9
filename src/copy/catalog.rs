//! Source item catalog: a flat, pre-ordered snapshot of every entry a job
//! will touch.

use super::{CopyJob, Step};
use crate::options::TransferMode;
use crate::resolver::Failure;
use crate::vfs::{BackendHandle, FileKind, LinkMode, Stat, same_backend};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// One discovered entry.
#[derive(Debug, Clone)]
pub(crate) struct CatalogEntry {
    pub(crate) host: usize,
    pub(crate) base_dir: usize,
    /// Index of the parent directory entry, `None` for top-level items.
    pub(crate) parent: Option<usize>,
    pub(crate) name: OsString,
    pub(crate) stat: Stat,
}

/// Append-only arena of hosts, base directories and entries.
///
/// Entries are stored in pre-order: a parent always precedes its children.
#[derive(Debug, Default)]
pub(crate) struct SourceItems {
    hosts: Vec<BackendHandle>,
    base_dirs: Vec<PathBuf>,
    entries: Vec<CatalogEntry>,
}

impl SourceItems {
    pub(crate) fn insert_host(&mut self, host: &BackendHandle) -> usize {
        if let Some(index) = self.hosts.iter().position(|h| same_backend(h, host)) {
            return index;
        }
        self.hosts.push(BackendHandle::clone(host));
        self.hosts.len() - 1
    }

    pub(crate) fn insert_base_dir(&mut self, dir: &Path) -> usize {
        if let Some(index) = self.base_dirs.iter().position(|d| d == dir) {
            return index;
        }
        self.base_dirs.push(dir.to_path_buf());
        self.base_dirs.len() - 1
    }

    pub(crate) fn push(&mut self, entry: CatalogEntry) -> usize {
        debug_assert!(
            entry
                .parent
                .is_none_or(|p| p < self.entries.len() && self.entries[p].stat.is_dir())
        );
        self.entries.push(entry);
        self.entries.len() - 1
    }

    fn pop(&mut self) {
        self.entries.pop();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entry(&self, index: usize) -> &CatalogEntry {
        &self.entries[index]
    }

    pub(crate) fn host(&self, index: usize) -> &BackendHandle {
        &self.hosts[self.entries[index].host]
    }

    /// Sum of regular file sizes.
    pub(crate) fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.stat.is_regular())
            .map(|e| e.stat.size)
            .sum()
    }

    /// Path relative to the entry's base directory.
    pub(crate) fn relative_path(&self, index: usize) -> PathBuf {
        let mut names: Vec<&OsStr> = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            names.push(&self.entries[i].name);
            current = self.entries[i].parent;
        }
        names.iter().rev().collect()
    }

    pub(crate) fn full_path(&self, index: usize) -> PathBuf {
        let base = &self.base_dirs[self.entries[index].base_dir];
        base.join(self.relative_path(index))
    }
}

/// A not-yet-visited entry.
struct Pending {
    parent: Option<usize>,
    host: usize,
    base_dir: usize,
    relative: PathBuf,
    name: OsString,
}

/// `._name` sidecar holding the attributes of `name` on volumes without a
/// native attribute store.
fn is_shadow_attribute_file(backend: &BackendHandle, path: &Path, name: &OsStr, stat: &Stat) -> bool {
    let Some(original) = name
        .to_str()
        .and_then(|n| n.strip_prefix("._"))
        .filter(|n| !n.is_empty())
    else {
        return false;
    };
    backend.uses_shadow_attribute_files(path, stat) && backend.exists(&path.with_file_name(original))
}

impl CopyJob {
    /// Build the catalog for every top-level item.
    ///
    /// Stat and listing failures go to the resolver; skipped entries drop
    /// out together with their subtree.
    pub(super) fn scan(&mut self) -> Result<SourceItems, Step> {
        let mut catalog = SourceItems::default();
        let link_mode = if self.options.preserve_symlinks {
            LinkMode::NoFollow
        } else {
            LinkMode::Follow
        };

        let items = std::mem::take(&mut self.items);
        let result = self.scan_items(&items, link_mode, &mut catalog);
        self.items = items;
        result.map(|()| catalog)
    }

    fn scan_items(
        &mut self,
        items: &[super::SourceItem],
        link_mode: LinkMode,
        catalog: &mut SourceItems,
    ) -> Result<(), Step> {
        let mut worklist: Vec<Pending> = Vec::new();

        for item in items {
            if self.control.check_pause_or_stop() {
                return Err(Step::Stop);
            }
            worklist.push(Pending {
                parent: None,
                host: catalog.insert_host(&item.backend),
                base_dir: catalog.insert_base_dir(&item.directory),
                relative: PathBuf::from(&item.name),
                name: item.name.clone(),
            });

            while let Some(pending) = worklist.pop() {
                if self.control.check_pause_or_stop() {
                    return Err(Step::Stop);
                }
                self.scan_entry(pending, link_mode, catalog, &mut worklist)?;
            }
        }
        debug!(entries = catalog.len(), bytes = catalog.total_bytes(), "scan finished");
        Ok(())
    }

    fn scan_entry(
        &mut self,
        pending: Pending,
        link_mode: LinkMode,
        catalog: &mut SourceItems,
        worklist: &mut Vec<Pending>,
    ) -> Result<(), Step> {
        let backend = BackendHandle::clone(&catalog.hosts[pending.host]);
        let path = catalog.base_dirs[pending.base_dir].join(&pending.relative);

        let stat = match self
            .arbiter
            .retry(Failure::CantAccessSource, &path, || backend.stat(&path, link_mode))
        {
            Ok(stat) => stat,
            Err(Step::Stop) => return Err(Step::Stop),
            Err(_) => return Ok(()),
        };

        let entry = CatalogEntry {
            host: pending.host,
            base_dir: pending.base_dir,
            parent: pending.parent,
            name: pending.name,
            stat,
        };

        match entry.stat.kind {
            FileKind::Directory => {
                let recurse = self.options.mode == TransferMode::Copy
                    || !self.same_volume(&backend, &entry.stat);
                let index = catalog.push(entry);
                if !recurse {
                    trace!(path = %path.display(), "not descending, moved by rename");
                    return Ok(());
                }

                let listed = self.arbiter.retry(Failure::CantAccessSource, &path, || {
                    let mut names = Vec::new();
                    backend.iterate_directory(&path, &mut |name| {
                        names.push(name.to_os_string());
                        true
                    })?;
                    Ok(names)
                });
                let mut names = match listed {
                    Ok(names) => names,
                    Err(Step::Stop) => return Err(Step::Stop),
                    Err(_) => {
                        catalog.pop();
                        return Ok(());
                    }
                };
                names.sort();

                for name in names.into_iter().rev() {
                    if self.control.check_pause_or_stop() {
                        return Err(Step::Stop);
                    }
                    worklist.push(Pending {
                        parent: Some(index),
                        host: pending.host,
                        base_dir: pending.base_dir,
                        relative: pending.relative.join(&name),
                        name,
                    });
                }
            }
            FileKind::Regular => {
                if is_shadow_attribute_file(&backend, &path, &entry.name, &entry.stat) {
                    debug!(path = %path.display(), "skipping attribute shadow file");
                    return Ok(());
                }
                catalog.push(entry);
            }
            FileKind::Symlink => {
                catalog.push(entry);
            }
            FileKind::Other => {
                warn!(path = %path.display(), "skipping special file");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::SourceItem;
    use crate::copy::test_support::RecordingResolver;
    use crate::options::TransferOptions;
    use crate::resolver::Decision;
    use crate::vfs::{Backend, MemoryBackend};

    fn job_for(items: Vec<SourceItem>, dest: &MemoryBackend, options: TransferOptions) -> CopyJob {
        CopyJob::new(items, "/dest", dest.clone().into_handle(), options).unwrap()
    }

    #[test]
    fn test_relative_and_full_paths() {
        let src = MemoryBackend::new();
        src.write_file("/base/dir/sub/file.txt", b"abc").unwrap();
        let handle = src.into_handle();

        let dest = MemoryBackend::new();
        let mut job = job_for(
            vec![SourceItem::new(handle, "/base", "dir")],
            &dest,
            TransferOptions::default(),
        );
        let catalog = job.scan().unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.relative_path(2), PathBuf::from("dir/sub/file.txt"));
        assert_eq!(catalog.full_path(2), PathBuf::from("/base/dir/sub/file.txt"));
        assert_eq!(catalog.total_bytes(), 3);
    }

    #[test]
    fn test_pre_order_parents_first() {
        let src = MemoryBackend::new();
        src.write_file("/d/a/1", b"1").unwrap();
        src.write_file("/d/a/2", b"22").unwrap();
        src.write_file("/d/b", b"333").unwrap();
        let handle = src.into_handle();
        let dest = MemoryBackend::new();
        let mut job = job_for(
            vec![SourceItem::new(handle, "/", "d")],
            &dest,
            TransferOptions::default(),
        );
        let catalog = job.scan().unwrap();

        let order: Vec<PathBuf> = (0..catalog.len()).map(|i| catalog.relative_path(i)).collect();
        assert_eq!(
            order,
            ["d", "d/a", "d/a/1", "d/a/2", "d/b"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
        for i in 0..catalog.len() {
            if let Some(parent) = catalog.entry(i).parent {
                assert!(parent < i);
                assert!(catalog.entry(parent).stat.is_dir());
            }
        }
    }

    #[test]
    fn test_hosts_and_base_dirs_deduplicated() {
        let src = MemoryBackend::new();
        src.write_file("/x/a", b"a").unwrap();
        src.write_file("/x/b", b"b").unwrap();
        let handle = src.into_handle();
        let dest = MemoryBackend::new();
        let mut job = job_for(
            vec![
                SourceItem::new(BackendHandle::clone(&handle), "/x", "a"),
                SourceItem::new(handle, "/x", "b"),
            ],
            &dest,
            TransferOptions::default(),
        );
        let catalog = job.scan().unwrap();
        assert_eq!(catalog.hosts.len(), 1);
        assert_eq!(catalog.base_dirs.len(), 1);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_missing_item_skipped_through_resolver() {
        let src = MemoryBackend::new();
        src.write_file("/x/present", b"p").unwrap();
        let handle = src.into_handle();
        let dest = MemoryBackend::new();
        let resolver = RecordingResolver::new(Decision::Skip);
        let log = resolver.log();
        let mut job = job_for(
            vec![
                SourceItem::new(BackendHandle::clone(&handle), "/x", "missing"),
                SourceItem::new(handle, "/x", "present"),
            ],
            &dest,
            TransferOptions::default(),
        )
        .with_resolver(resolver);

        let catalog = job.scan().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(log.lock().unwrap()[0].0, "cant_access_source");
    }

    #[test]
    fn test_missing_item_stop_aborts_scan() {
        let src = MemoryBackend::new();
        let dest = MemoryBackend::new();
        let mut job = job_for(
            vec![SourceItem::new(src.into_handle(), "/x", "missing")],
            &dest,
            TransferOptions::default(),
        );
        assert_eq!(job.scan().unwrap_err(), Step::Stop);
    }

    #[test]
    fn test_shadow_attribute_files_skipped() {
        let src = MemoryBackend::with_shadow_attribute_files();
        src.write_file("/d/photo.jpg", b"jpg").unwrap();
        src.write_file("/d/._photo.jpg", b"attrs").unwrap();
        src.write_file("/d/._orphan", b"attrs").unwrap();
        let dest = MemoryBackend::new();
        let mut job = job_for(
            vec![SourceItem::new(src.into_handle(), "/", "d")],
            &dest,
            TransferOptions::default(),
        );
        let catalog = job.scan().unwrap();
        let names: Vec<&OsStr> = (0..catalog.len())
            .map(|i| catalog.entry(i).name.as_os_str())
            .collect();
        assert!(names.contains(&OsStr::new("photo.jpg")));
        assert!(names.contains(&OsStr::new("._orphan")));
        assert!(!names.contains(&OsStr::new("._photo.jpg")));
    }

    #[test]
    fn test_move_within_same_backend_does_not_descend() {
        let fs = MemoryBackend::new();
        fs.write_file("/src/dir/a", b"a").unwrap();
        fs.write_file("/src/dir/b", b"b").unwrap();
        fs.create_dir_all("/dest").unwrap();
        let handle = fs.clone().into_handle();
        let mut job = CopyJob::new(
            vec![SourceItem::new(BackendHandle::clone(&handle), "/src", "dir")],
            "/dest",
            handle,
            TransferOptions::default().with_move(),
        )
        .unwrap();
        let catalog = job.scan().unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(fs.exists(Path::new("/src/dir/a")));
    }

    #[test]
    fn test_symlinks_kept_or_followed() {
        let src = MemoryBackend::new();
        src.write_file("/d/target", b"12345").unwrap();
        src.create_symlink(Path::new("/d/link"), Path::new("target"))
            .unwrap();
        let handle = src.into_handle();
        let dest = MemoryBackend::new();

        let mut job = job_for(
            vec![SourceItem::new(BackendHandle::clone(&handle), "/d", "link")],
            &dest,
            TransferOptions::default(),
        );
        assert!(job.scan().unwrap().entry(0).stat.is_symlink());

        let mut job = job_for(
            vec![SourceItem::new(handle, "/d", "link")],
            &dest,
            TransferOptions::default().with_follow_symlinks(),
        );
        let catalog = job.scan().unwrap();
        assert!(catalog.entry(0).stat.is_regular());
        assert_eq!(catalog.total_bytes(), 5);
    }
}
