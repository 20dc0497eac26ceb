//! pullhook update runner.
//!
//! Runs the configured update command at most once at a time. Every accepted
//! webhook becomes one call to [`UpdateRunner::spawn_run`] (through the
//! [`trigger::UpdateTrigger`] port); the runs queue on a fair mutex, so N
//! notifications received during a run lead to N sequential runs, never to
//! two processes touching the working directory at once.
//!
//! ## Run lifecycle
//!
//! 1. Acquire the update lock.
//! 2. Spawn `<shell> -c <command>` in the working directory with stderr piped
//!    into a fresh [`OutputCollector`].
//! 3. Race process exit against the configured timeout.
//! 4. On timeout, issue a kill and reap the process.
//! 5. Wait for the stderr copy to finish, drain the collector into the log,
//!    release the lock.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, timers, and pipe handling live here.
//! The `listener` crate sees only [`trigger::UpdateTrigger`].

pub mod collector;
pub mod errors;
pub mod update;

pub use collector::OutputCollector;
pub use errors::RunnerError;
pub use update::UpdateRunner;
