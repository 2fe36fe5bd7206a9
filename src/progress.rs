//! Progress reporting support (requires `progress` feature)

use crate::copy::{JobReport, JobStage};
use crate::events::CopyEvents;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Create a default progress bar for byte transfers
#[must_use]
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// [`CopyEvents`] sink that drives an indicatif progress bar.
///
/// The bar length is set from the first progress notification, once the
/// scan has determined the total byte count.
#[derive(Debug, Clone)]
pub struct ProgressBarEvents {
    bar: ProgressBar,
}

impl ProgressBarEvents {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// The underlying bar, e.g. to hide it.
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for ProgressBarEvents {
    fn default() -> Self {
        Self::new(create_progress_bar(0))
    }
}

impl CopyEvents for ProgressBarEvents {
    fn stage_changed(&mut self, stage: JobStage) {
        self.bar.set_prefix(stage.to_string());
    }

    fn item_started(&mut self, path: &Path) {
        self.bar.set_message(path.display().to_string());
    }

    fn bytes_transferred(&mut self, done: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(done);
    }

    fn job_finished(&mut self, report: &JobReport) {
        match report.stage {
            JobStage::Completed => self.bar.finish_with_message("done"),
            _ => self.bar.abandon_with_message(report.stage.to_string()),
        }
    }
}
