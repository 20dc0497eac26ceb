//! Value types describing one update run.
//!
//! A run's result is never persisted; [`RunReport`] exists so the runner can
//! hand a structured record to its caller (and to tests) after the run's log
//! lines have been written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RunId;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// How one update run ended.
///
/// The two cases are disjoint: either the process was waited on to its
/// natural end, or the timeout fired first and a kill was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The process exited before the timeout.
    Completed {
        /// Exit code, or `None` when the process was ended by a signal or
        /// could not be waited on.
        exit_code: Option<i32>,
        /// Non-zero exit status or wait failure, rendered for logging.
        error: Option<String>,
    },
    /// The timeout elapsed first and the process was sent a kill.
    TimedOut {
        /// Failure to issue the kill, if any. Logged, never escalated.
        kill_error: Option<String>,
    },
}

impl RunOutcome {
    /// Returns `true` if the process exited on its own with status zero.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::Completed {
                exit_code: Some(0),
                error: None
            }
        )
    }

    /// Returns `true` if the run hit the timeout.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, RunOutcome::TimedOut { .. })
    }
}

// ---------------------------------------------------------------------------

/// Structured record of one finished update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier recorded on the run's span.
    pub run_id: RunId,

    /// Taken after the update lock was acquired, immediately before spawning.
    pub started_at: Timestamp,

    /// Taken after the captured stderr was drained, still under the lock.
    pub finished_at: Timestamp,

    /// How the run ended.
    #[serde(flatten)]
    pub outcome: RunOutcome,

    /// Number of stderr lines reported by the drain step.
    pub stderr_lines: usize,
}

impl RunReport {
    /// Returns `true` if this run's interval intersects `other`'s.
    pub fn overlaps(&self, other: &RunReport) -> bool {
        self.started_at < other.finished_at && other.started_at < self.finished_at
    }
}
