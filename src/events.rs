//! Job event sink.
//!
//! The engine never renders progress itself; it reports to a [`CopyEvents`]
//! implementation. All methods default to no-ops and are called on the job
//! thread.

use crate::copy::{JobReport, JobStage, VerificationOutcome};
use std::path::Path;

/// Receiver for job progress and outcome events.
pub trait CopyEvents: Send {
    /// The job entered `stage`.
    fn stage_changed(&mut self, _stage: JobStage) {}

    /// Processing of the source entry at `path` begins.
    fn item_started(&mut self, _path: &Path) {}

    /// Cumulative byte count after a pipeline round.
    fn bytes_transferred(&mut self, _done: u64, _total: u64) {}

    /// A copied file did not verify.
    fn verification_failed(&mut self, _path: &Path, _outcome: VerificationOutcome) {}

    /// The job ended; called exactly once.
    fn job_finished(&mut self, _report: &JobReport) {}
}

/// Event sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl CopyEvents for NoEvents {}
