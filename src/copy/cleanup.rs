use super::catalog::SourceItems;
use super::{CopyJob, Step};
use crate::vfs::{BackendHandle, Stat};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The `._name` sidecar of `path`, if its volume keeps one and it exists.
///
/// Must be asked before `path` is removed; the answer may depend on it.
fn shadow_attribute_file(backend: &BackendHandle, path: &Path, stat: &Stat) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with("._") || !backend.uses_shadow_attribute_files(path, stat) {
        return None;
    }
    let sidecar = path.with_file_name(format!("._{name}"));
    backend.exists(&sidecar).then_some(sidecar)
}

impl CopyJob {
    /// Delete the sources of a cross-volume move.
    ///
    /// Entries are removed in reverse catalog order, so children go before
    /// their parent directory. A removed entry takes its `._name` sidecar
    /// with it. Failures are logged and leave the source in place.
    pub(super) fn clean_up(&mut self, catalog: &SourceItems) -> Result<(), Step> {
        let queued = std::mem::take(&mut self.to_delete);
        for &index in queued.iter().rev() {
            if self.control.check_pause_or_stop() {
                return Err(Step::Stop);
            }
            let backend = catalog.host(index);
            let path = catalog.full_path(index);
            let stat = &catalog.entry(index).stat;
            let sidecar = shadow_attribute_file(backend, &path, stat);
            let removed = if stat.is_dir() {
                backend.remove_directory(&path)
            } else {
                backend.unlink(&path)
            };
            match removed {
                Ok(()) => debug!(path = %path.display(), "source removed"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove source");
                    continue;
                }
            }
            if let Some(sidecar) = sidecar {
                if let Err(e) = backend.unlink(&sidecar) {
                    warn!(path = %sidecar.display(), error = %e, "failed to remove attribute shadow file");
                }
            }
        }
        Ok(())
    }
}
