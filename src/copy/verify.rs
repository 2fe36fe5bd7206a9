//! Post-copy checksum verification.

use super::{CopyJob, Step};
use crate::job::JobControl;
use crate::resolver::Failure;
use crate::vfs::{BackendHandle, OpenFlags, VfsResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of checking one copied file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VerificationOutcome {
    Matched,
    /// Destination content differs from what was read from the source.
    Mismatch,
    /// Destination could not be read back.
    Unreadable,
}

/// A destination that did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub path: PathBuf,
    pub outcome: VerificationOutcome,
}

/// Expected digest of a streamed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumExpectation {
    /// Catalog index of the source entry
    pub source_index: usize,
    pub destination: PathBuf,
    /// MD5 of the bytes read from the source
    pub digest: [u8; 16],
}

/// Lazily started MD5 accumulator.
#[derive(Default)]
pub(crate) struct DigestAccumulator(Option<md5::Context>);

impl DigestAccumulator {
    pub(crate) fn consume(&mut self, data: &[u8]) {
        self.0.get_or_insert_with(md5::Context::new).consume(data);
    }

    /// Digest of everything consumed, `None` if nothing was.
    pub(crate) fn finish(self) -> Option<[u8; 16]> {
        self.0.map(|ctx| ctx.compute().0)
    }
}

/// MD5 of a whole file, or `None` if the job was stopped while reading.
fn digest_file(
    backend: &BackendHandle,
    path: &Path,
    buffer: &mut [u8],
    control: &JobControl,
) -> VfsResult<Option<[u8; 16]>> {
    let mut file = backend.create_file(path)?;
    file.open(OpenFlags::read_only())?;
    let mut digest = DigestAccumulator::default();
    loop {
        if control.check_pause_or_stop() {
            return Ok(None);
        }
        let n = file.read(buffer)?;
        if n == 0 {
            break;
        }
        digest.consume(&buffer[..n]);
    }
    file.close()?;
    Ok(Some(digest.finish().unwrap_or_else(|| md5::compute(b"").0)))
}

impl CopyJob {
    /// Read every recorded destination back and compare digests.
    pub(super) fn verify(&mut self) -> Result<(), Step> {
        self.ensure_buffers();

        for index in 0..self.checksums.len() {
            let expected = self.checksums[index].clone();
            let backend = &self.destination_backend;
            let buffer = &mut self.buffers[0];
            let control = &self.control;
            let read = self.arbiter.retry(
                Failure::DestinationReadError,
                &expected.destination,
                || digest_file(backend, &expected.destination, &mut buffer[..], control),
            );
            let outcome = match read {
                Ok(Some(digest)) if digest == expected.digest => VerificationOutcome::Matched,
                Ok(Some(_)) => VerificationOutcome::Mismatch,
                Ok(None) | Err(Step::Stop) => return Err(Step::Stop),
                Err(_) => VerificationOutcome::Unreadable,
            };
            debug!(path = %expected.destination.display(), ?outcome, "verified");
            if outcome == VerificationOutcome::Matched {
                self.checksums_verified += 1;
            } else {
                warn!(path = %expected.destination.display(), ?outcome, "verification failed");
                self.events.verification_failed(&expected.destination, outcome);
                self.failed_verifications.push(VerificationFailure {
                    path: expected.destination,
                    outcome,
                });
            }
        }
        Ok(())
    }
}
