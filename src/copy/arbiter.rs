//! Resolver front: retries, sticky answers, stop propagation.

use super::Step;
use crate::job::JobControl;
use crate::options::ExistBehavior;
use crate::resolver::{self, ConflictResolver, Decision, ExistsAction, ExistsResolution, Failure};
use crate::vfs::{Stat, VfsError, VfsResult};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// How to treat an existing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExistsOutcome {
    Overwrite,
    Append,
    Skip,
    Stop,
}

/// Wraps the caller's resolver with the run-wide state it must not see:
/// the skip-all flag, the current [`ExistBehavior`] and the failure count.
pub(super) struct Arbiter {
    resolver: Box<dyn ConflictResolver>,
    control: Arc<JobControl>,
    skip_all: bool,
    exist_behavior: ExistBehavior,
    failed: u64,
}

impl Arbiter {
    pub(super) fn new(
        resolver: Box<dyn ConflictResolver>,
        control: Arc<JobControl>,
        exist_behavior: ExistBehavior,
    ) -> Self {
        Self {
            resolver,
            control,
            skip_all: false,
            exist_behavior,
            failed: 0,
        }
    }

    pub(super) fn set_resolver(&mut self, resolver: Box<dyn ConflictResolver>) {
        self.resolver = resolver;
    }

    /// Errors answered with Skip or SkipAll so far.
    pub(super) fn failed(&self) -> u64 {
        self.failed
    }

    fn decide(&mut self, failure: Failure, error: &VfsError, path: &Path) -> Decision {
        if self.skip_all {
            debug!(%failure, path = %path.display(), %error, "skipped (skip all)");
            return Decision::Skip;
        }
        let decision = resolver::ask(self.resolver.as_mut(), failure, error, path);
        debug!(%failure, path = %path.display(), %error, ?decision, "resolver decision");
        match decision {
            Decision::SkipAll => self.skip_all = true,
            Decision::Stop => self.control.stop(),
            Decision::Retry | Decision::Skip => {}
        }
        decision
    }

    /// Ask about a failure. `None` means retry, otherwise the step that ends
    /// the current item.
    pub(super) fn fail(&mut self, failure: Failure, error: &VfsError, path: &Path) -> Option<Step> {
        match self.decide(failure, error, path) {
            Decision::Retry => None,
            Decision::Skip => {
                self.failed += 1;
                Some(Step::Skipped)
            }
            Decision::SkipAll => {
                self.failed += 1;
                Some(Step::SkipAll)
            }
            Decision::Stop => Some(Step::Stop),
        }
    }

    /// Run `op` until it succeeds or the resolver gives up on it.
    pub(super) fn retry<T>(
        &mut self,
        failure: Failure,
        path: &Path,
        mut op: impl FnMut() -> VfsResult<T>,
    ) -> Result<T, Step> {
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if let Some(step) = self.fail(failure, &error, path) {
                        return Err(step);
                    }
                }
            }
        }
    }

    /// A directory is needed at `path` but something else is there.
    pub(super) fn already_exists(&mut self, path: &Path, existing: &Stat) -> Decision {
        if self.skip_all {
            return Decision::Skip;
        }
        let decision = self.resolver.already_exists(path, existing);
        debug!(path = %path.display(), ?decision, "already exists");
        match decision {
            Decision::SkipAll => self.skip_all = true,
            Decision::Stop => self.control.stop(),
            Decision::Retry | Decision::Skip => {}
        }
        decision
    }

    /// Apply the run-wide [`ExistBehavior`] to an existing destination,
    /// asking the resolver when it is [`ExistBehavior::Ask`].
    ///
    /// For renames, append is meaningless and stops the job.
    pub(super) fn resolve_existing(
        &mut self,
        source: &Stat,
        destination: &Stat,
        path: &Path,
        rename: bool,
    ) -> ExistsOutcome {
        let action = match self.exist_behavior {
            ExistBehavior::SkipAll => ExistsAction::Skip,
            ExistBehavior::OverwriteAll => ExistsAction::Overwrite,
            ExistBehavior::OverwriteOlder => ExistsAction::OverwriteOlder,
            ExistBehavior::AppendAll => ExistsAction::Append,
            ExistBehavior::Ask => {
                let resolution = if rename {
                    self.resolver.rename_destination_exists(source, destination, path)
                } else {
                    self.resolver.destination_exists(source, destination, path)
                };
                self.remember(resolution, rename);
                resolution.action
            }
        };

        let outcome = match action {
            ExistsAction::Overwrite => ExistsOutcome::Overwrite,
            ExistsAction::OverwriteOlder if source.mtime > destination.mtime => {
                ExistsOutcome::Overwrite
            }
            ExistsAction::OverwriteOlder | ExistsAction::Skip => ExistsOutcome::Skip,
            ExistsAction::Append if !rename => ExistsOutcome::Append,
            ExistsAction::Append | ExistsAction::Stop => ExistsOutcome::Stop,
        };
        debug!(path = %path.display(), ?action, ?outcome, "existing destination");
        if outcome == ExistsOutcome::Stop {
            self.control.stop();
        }
        outcome
    }

    fn remember(&mut self, resolution: ExistsResolution, rename: bool) {
        if !resolution.apply_to_all {
            return;
        }
        let sticky = match resolution.action {
            ExistsAction::Overwrite => ExistBehavior::OverwriteAll,
            ExistsAction::OverwriteOlder => ExistBehavior::OverwriteOlder,
            ExistsAction::Append if !rename => ExistBehavior::AppendAll,
            ExistsAction::Skip => ExistBehavior::SkipAll,
            ExistsAction::Append | ExistsAction::Stop => return,
        };
        debug!(?sticky, "exist behavior upgraded");
        self.exist_behavior = sticky;
    }
}
