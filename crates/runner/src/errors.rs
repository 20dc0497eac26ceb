//! Errors raised by the update runner.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a run before any outcome exists.
///
/// Non-zero exits and timeouts are not errors at this level; they are
/// reported through [`trigger::RunOutcome`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The update command could not be started. The lock is released and
    /// the run is not retried.
    #[error("failed to spawn '{}' in '{}': {source}", shell.display(), working_dir.display())]
    Spawn {
        /// Shell that was asked to run the command.
        shell: PathBuf,
        /// Directory the command was to run in.
        working_dir: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
