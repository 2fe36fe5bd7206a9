//! Destination path planning.

use super::{CopyJob, Step};
use crate::options::TransferMode;
use crate::resolver::Failure;
use crate::vfs::{LinkMode, Stat, VfsError, same_backend};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How per-item destination paths are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathCompositionMode {
    /// Destination is a directory; items land inside it under their
    /// relative paths.
    PathPrefix,
    /// Destination names the target itself.
    FixedPath,
}

/// Pick the composition mode. Pure, so repeated calls agree.
pub(crate) fn classify(
    existing: Option<&Stat>,
    item_count: usize,
    trailing_separator: bool,
    case_rename: bool,
) -> PathCompositionMode {
    match existing {
        Some(stat) if stat.is_dir() && !case_rename => PathCompositionMode::PathPrefix,
        Some(_) => PathCompositionMode::FixedPath,
        None if trailing_separator || item_count > 1 => PathCompositionMode::PathPrefix,
        None => PathCompositionMode::FixedPath,
    }
}

fn has_trailing_separator(path: &Path) -> bool {
    path.as_os_str()
        .as_encoded_bytes()
        .last()
        .is_some_and(|&b| std::path::is_separator(char::from(b)))
}

/// Resolved destination layout for a job.
#[derive(Debug, Clone)]
pub(crate) struct Planner {
    mode: PathCompositionMode,
    destination: PathBuf,
    single_item: bool,
}

impl Planner {
    pub(crate) fn new(mode: PathCompositionMode, destination: &Path, single_item: bool) -> Self {
        Self {
            mode,
            destination: destination.to_path_buf(),
            single_item,
        }
    }

    pub(crate) fn mode(&self) -> PathCompositionMode {
        self.mode
    }

    /// Destination for an entry with the given path relative to its base
    /// directory.
    pub(crate) fn compose(&self, relative: &Path) -> PathBuf {
        match self.mode {
            PathCompositionMode::PathPrefix => self.destination.join(relative),
            PathCompositionMode::FixedPath if self.single_item => {
                let mut components = relative.components();
                components.next();
                let rest = components.as_path();
                if rest.as_os_str().is_empty() {
                    self.destination.clone()
                } else {
                    self.destination.join(rest)
                }
            }
            PathCompositionMode::FixedPath => self.destination.clone(),
        }
    }
}

impl CopyJob {
    /// Classify the destination and create the directories it needs.
    pub(super) fn prepare(&mut self) -> Result<Planner, Step> {
        let existing = self
            .destination_backend
            .stat(&self.destination, LinkMode::Follow)
            .ok();
        let case_rename = existing.as_ref().is_some_and(|st| self.is_case_rename(st));
        let mode = classify(
            existing.as_ref(),
            self.items.len(),
            has_trailing_separator(&self.destination),
            case_rename,
        );
        debug!(destination = %self.destination.display(), ?mode, case_rename, "destination planned");

        if existing.is_none() {
            let target = match mode {
                PathCompositionMode::PathPrefix => Some(self.destination.clone()),
                PathCompositionMode::FixedPath => self.destination.parent().map(Path::to_path_buf),
            };
            if let Some(target) = target {
                self.build_directories(&target)?;
            }
        }

        Ok(Planner::new(mode, &self.destination, self.items.len() == 1))
    }

    /// A lone directory moved onto itself under a different letter case.
    fn is_case_rename(&self, existing: &Stat) -> bool {
        let [item] = self.items.as_slice() else {
            return false;
        };
        if !existing.is_dir() || self.options.mode != TransferMode::Move || !item.backend.is_native()
        {
            return false;
        }
        if !same_backend(&item.backend, &self.destination_backend)
            && !self.destination_backend.is_native()
        {
            return false;
        }
        item.backend
            .stat(&item.path(), LinkMode::Follow)
            .is_ok_and(|st| st.is_dir() && st.same_object(existing))
    }

    /// Create every missing directory up to and including `target`,
    /// outermost first. Anything but Retry from the resolver stops the job.
    fn build_directories(&mut self, target: &Path) -> Result<(), Step> {
        let backend = &self.destination_backend;
        let mut missing: Vec<&Path> = target
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !backend.exists(dir))
            .collect();
        missing.reverse();

        for dir in missing {
            let created = self
                .arbiter
                .retry(Failure::CantCreateDestinationRootDir, dir, || {
                    match backend.create_directory(dir, 0o755) {
                        Err(VfsError::AlreadyExists(_)) => Ok(()),
                        other => other,
                    }
                });
            if created.is_err() {
                self.control.stop();
                return Err(Step::Stop);
            }
            debug!(path = %dir.display(), "created destination directory");
        }
        Ok(())
    }
}
