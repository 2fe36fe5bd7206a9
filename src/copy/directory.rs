//! Directory entries: create, then carry attributes over.

use super::attrs::{self, AttributeSet};
use super::catalog::SourceItems;
use super::{CopyJob, Step};
use crate::resolver::{Decision, Failure};
use crate::vfs::{BackendHandle, FileTimes, LinkMode, OpenFlags, VfsError};
use std::path::{Path, PathBuf};
use tracing::debug;

const DIRECTORY_MODE: u32 = 0o755;

/// Replacement for a source directory with no permission bits at all.
const FALLBACK_DIRECTORY_MODE: u32 = 0o750;

/// Copy xattrs between two directories opened for attribute access.
fn copy_directory_xattrs(
    source_backend: &BackendHandle,
    source: &Path,
    destination_backend: &BackendHandle,
    destination: &Path,
) -> Result<(), VfsError> {
    let flags = OpenFlags::read_only().with_directory();
    let mut from = source_backend.create_file(source)?;
    from.open(flags)?;
    let mut to = destination_backend.create_file(destination)?;
    to.open(flags)?;
    attrs::copy_xattrs(from.as_ref(), to.as_mut());
    to.close()?;
    from.close()
}

impl CopyJob {
    /// Create the directory at catalog `index` on the destination. Never
    /// recurses; children are separate catalog entries.
    pub(super) fn copy_directory(
        &mut self,
        catalog: &SourceItems,
        index: usize,
        destination: &Path,
    ) -> Step {
        let backend = &self.destination_backend;
        loop {
            match backend.stat(destination, LinkMode::NoFollow) {
                Ok(existing) if existing.is_dir() => break,
                Ok(existing) => match self.arbiter.already_exists(destination, &existing) {
                    Decision::Retry => {}
                    Decision::Skip => return Step::Skipped,
                    Decision::SkipAll => return Step::SkipAll,
                    Decision::Stop => return Step::Stop,
                },
                Err(_) => {
                    let created = self.arbiter.retry(
                        Failure::CantCreateDestinationDir,
                        destination,
                        || backend.create_directory(destination, DIRECTORY_MODE),
                    );
                    match created {
                        Ok(()) => break,
                        Err(step) => return step,
                    }
                }
            }
        }

        let entry = catalog.entry(index);
        if self.options.copy_xattrs {
            let source = catalog.full_path(index);
            if let Err(e) =
                copy_directory_xattrs(catalog.host(index), &source, backend, destination)
            {
                debug!(path = %destination.display(), error = %e, "directory xattrs not copied");
            }
        }
        attrs::apply_path_attributes(
            backend,
            destination,
            &entry.stat,
            &AttributeSet {
                flags: self.options.copy_unix_flags,
                owner: self.options.copy_unix_owners,
                ..AttributeSet::default()
            },
        );

        // Permissions could block writing children; times would be bumped
        // by them.
        if self.options.copy_unix_permissions || self.options.copy_file_times {
            self.pending_dir_attrs
                .push((index, destination.to_path_buf()));
        }
        Step::Ok
    }

    /// Apply the deferred permissions and times, deepest directories first.
    pub(super) fn apply_directory_attributes(&mut self, catalog: &SourceItems) {
        let pending: Vec<(usize, PathBuf)> = std::mem::take(&mut self.pending_dir_attrs);
        for (index, path) in pending.iter().rev() {
            let stat = &catalog.entry(*index).stat;
            let backend = &self.destination_backend;
            if self.options.copy_unix_permissions {
                let mode = match stat.permissions() {
                    0 => FALLBACK_DIRECTORY_MODE,
                    mode => mode,
                };
                if let Err(e) = backend.set_permissions(path, mode) {
                    debug!(path = %path.display(), error = %e, "failed to set directory permissions");
                }
            }
            if self.options.copy_file_times {
                if let Err(e) = backend.set_times(path, &FileTimes::from(stat)) {
                    debug!(path = %path.display(), error = %e, "failed to set directory times");
                }
            }
        }
    }
}
