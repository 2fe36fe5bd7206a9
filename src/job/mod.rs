//! Generic job lifecycle.
//!
//! A job runs on a dedicated thread and cooperates with its controller
//! through a shared [`JobControl`]: the worker calls
//! [`JobControl::check_pause_or_stop`] at convenient points, the controller
//! flips the pause and stop flags through a [`JobHandle`].
//!
//! ```text
//! Pending ──▶ Running ◀──▶ Paused
//!                │
//!                ├──▶ Completed
//!                └──▶ Stopped
//! ```

mod stats;

pub use stats::StatisticsSnapshot;
pub(crate) use stats::Statistics;

use crate::error::{Error, Result};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobState {
    /// Created, not yet running
    Pending,
    /// Executing
    Running,
    /// Blocked in a cooperative check until resumed
    Paused,
    /// Ended early on request
    Stopped,
    /// Ran to the end
    Completed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug)]
struct ControlState {
    state: JobState,
    pause_requested: bool,
    stop_requested: bool,
    stats: Statistics,
}

/// Pause/stop flags and statistics shared between a job and its controller.
#[derive(Debug)]
pub struct JobControl {
    inner: Mutex<ControlState>,
    wakeup: Condvar,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: JobState::Pending,
                pause_requested: false,
                stop_requested: false,
                stats: Statistics::default(),
            }),
            wakeup: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the job to block at its next check point.
    pub fn pause(&self) {
        self.lock().pause_requested = true;
    }

    /// Release a paused job.
    pub fn resume(&self) {
        self.lock().pause_requested = false;
        self.wakeup.notify_all();
    }

    /// Ask the job to end at its next check point. Also releases a paused job.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.stop_requested = true;
        inner.pause_requested = false;
        drop(inner);
        self.wakeup.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().pause_requested
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.lock().stats.snapshot()
    }

    /// Block while paused, then report whether a stop was requested.
    ///
    /// Time spent blocked here does not count towards elapsed time.
    pub fn check_pause_or_stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.pause_requested && !inner.stop_requested {
            inner.state = JobState::Paused;
            inner.stats.pause_timing();
            while inner.pause_requested && !inner.stop_requested {
                inner = self
                    .wakeup
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            inner.stats.resume_timing();
            inner.state = JobState::Running;
        }
        inner.stop_requested
    }

    pub(crate) fn with_stats<R>(&self, f: impl FnOnce(&mut Statistics) -> R) -> R {
        f(&mut self.lock().stats)
    }

    pub(crate) fn begin(&self) {
        let mut inner = self.lock();
        inner.state = JobState::Running;
        inner.stats.start();
    }

    /// Record the terminal state. A pending stop request wins over `Completed`.
    pub(crate) fn finish(&self) -> JobState {
        let mut inner = self.lock();
        inner.state = if inner.stop_requested {
            JobState::Stopped
        } else {
            JobState::Completed
        };
        inner.stats.finish();
        inner.state
    }
}

/// A unit of work that can run on its own thread.
pub trait Job: Send + Sized + 'static {
    type Output: Send + 'static;

    /// Short name, used for the thread name.
    fn name(&self) -> &str;

    /// The control block the job polls.
    fn control(&self) -> Arc<JobControl>;

    /// Run to the end on the current thread.
    fn execute(self) -> Self::Output;
}

/// Run `job` on a dedicated thread.
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the thread cannot be created.
pub fn spawn<J: Job>(job: J) -> Result<JobHandle<J::Output>> {
    let control = job.control();
    let thread = thread::Builder::new()
        .name(format!("vfscopy-{}", job.name()))
        .spawn(move || job.execute())
        .map_err(Error::Spawn)?;
    Ok(JobHandle { control, thread })
}

/// Controller side of a spawned job.
#[derive(Debug)]
pub struct JobHandle<T> {
    control: Arc<JobControl>,
    thread: JoinHandle<T>,
}

impl<T> JobHandle<T> {
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn state(&self) -> JobState {
        self.control.state()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.control.statistics()
    }

    /// Shared control block, e.g. for a Ctrl-C handler.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    /// Wait for the job to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobPanicked`] if the job thread panicked.
    pub fn join(self) -> Result<T> {
        self.thread.join().map_err(|_| Error::JobPanicked)
    }
}
