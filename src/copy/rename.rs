use super::arbiter::ExistsOutcome;
use super::catalog::SourceItems;
use super::{CopyJob, Step};
use crate::resolver::Failure;
use crate::vfs::LinkMode;
use std::path::Path;
use tracing::debug;

impl CopyJob {
    /// Move the entry at catalog `index` with a single rename on its own
    /// backend. Directories move with their whole subtree.
    pub(super) fn rename_item(
        &mut self,
        catalog: &SourceItems,
        index: usize,
        destination: &Path,
    ) -> Step {
        let backend = catalog.host(index);
        let source = catalog.full_path(index);

        if let Ok(existing) = self.destination_backend.stat(destination, LinkMode::NoFollow) {
            let source_stat = match self.arbiter.retry(Failure::CantAccessSource, &source, || {
                backend.stat(&source, LinkMode::NoFollow)
            }) {
                Ok(stat) => stat,
                Err(step) => return step,
            };
            if source_stat.same_object(&existing) {
                debug!(path = %destination.display(), "case-only rename");
            } else {
                match self
                    .arbiter
                    .resolve_existing(&source_stat, &existing, destination, true)
                {
                    ExistsOutcome::Overwrite => {}
                    ExistsOutcome::Skip => return Step::Skipped,
                    ExistsOutcome::Append | ExistsOutcome::Stop => return Step::Stop,
                }
            }
        }

        if let Err(step) = self
            .arbiter
            .retry(Failure::DestinationWriteError, destination, || {
                backend.rename(&source, destination)
            })
        {
            return step;
        }
        debug!(from = %source.display(), to = %destination.display(), "renamed");

        let stat = &catalog.entry(index).stat;
        if stat.is_regular() {
            let total = self.control.with_stats(|s| {
                s.add_value(stat.size);
                s.snapshot()
            });
            self.events.bytes_transferred(total.value, total.max_value);
        }
        Step::Ok
    }
}
