#![forbid(unsafe_code)]

//! Packaging seam for signed output.

use sigtuna_core::Error;

/// Receives the artifacts of a signing run. Implementations decide the
/// container (directory, archive, upload); `finalize` commits the set
/// and `abort` discards everything added so far.
pub trait PackagingSink {
    /// Add one named artifact.
    fn add(&mut self, name: &str, data: &[u8]) -> Result<(), Error>;

    /// Commit all added artifacts.
    fn finalize(&mut self) -> Result<(), Error>;

    /// Discard the pending artifacts. Must not fail.
    fn abort(&mut self);
}
