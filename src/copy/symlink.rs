use super::arbiter::ExistsOutcome;
use super::attrs::{self, AttributeSet};
use super::catalog::SourceItems;
use super::{CopyJob, Step};
use crate::resolver::Failure;
use crate::vfs::{LinkMode, VfsError};
use std::path::Path;
use tracing::debug;

impl CopyJob {
    /// Recreate the symlink at catalog `index` on the destination backend.
    ///
    /// The link target is copied verbatim, whatever the two backends are.
    pub(super) fn copy_symlink(
        &mut self,
        catalog: &SourceItems,
        index: usize,
        destination: &Path,
    ) -> Step {
        let source_backend = catalog.host(index);
        let source_path = catalog.full_path(index);
        let source_stat = &catalog.entry(index).stat;

        let target = match self.arbiter.retry(Failure::CantAccessSource, &source_path, || {
            source_backend.read_symlink(&source_path)
        }) {
            Ok(target) => target,
            Err(step) => return step,
        };

        let backend = &self.destination_backend;
        if let Ok(existing) = backend.stat(destination, LinkMode::NoFollow) {
            match self
                .arbiter
                .resolve_existing(source_stat, &existing, destination, false)
            {
                ExistsOutcome::Overwrite => {}
                ExistsOutcome::Append => {
                    debug!(path = %destination.display(), "cannot append to a symlink, skipped");
                    return Step::Skipped;
                }
                ExistsOutcome::Skip => return Step::Skipped,
                ExistsOutcome::Stop => return Step::Stop,
            }
            let removed = self
                .arbiter
                .retry(Failure::DestinationWriteError, destination, || {
                    match backend.stat(destination, LinkMode::NoFollow) {
                        Ok(st) if st.is_dir() => Err(VfsError::is_a_directory(destination)),
                        Ok(_) => backend.unlink(destination),
                        Err(_) => Ok(()),
                    }
                });
            if let Err(step) = removed {
                return step;
            }
        }

        if let Err(step) = self
            .arbiter
            .retry(Failure::DestinationWriteError, destination, || {
                backend.create_symlink(destination, &target)
            })
        {
            return step;
        }
        debug!(path = %destination.display(), target = %target.display(), "symlink created");

        attrs::apply_path_attributes(
            backend,
            destination,
            source_stat,
            &AttributeSet {
                times: self.options.copy_file_times,
                owner: self.options.copy_unix_owners,
                ..AttributeSet::default()
            },
        );
        Step::Ok
    }
}
