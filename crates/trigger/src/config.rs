//! The daemon's immutable configuration.
//!
//! One [`HookConfig`] is built by the binary at start-up, validated, wrapped
//! in an `Arc`, and handed to both the dispatcher and the runner. Nothing
//! mutates it afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::{RoutePrefix, TriggerError, UpdateCommand};

/// Route prefix used when none is configured.
pub const DEFAULT_ROUTE_PREFIX: &str = "/push";

/// Wall-clock budget for one update run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shell the update command is handed to (with `-c`).
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// The source-tree sync run on every accepted notification.
pub const DEFAULT_UPDATE_COMMAND: &str = "/usr/bin/git pull -q";

/// Largest request body read for signature verification (GitHub caps
/// webhook payloads at 25 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

// ---------------------------------------------------------------------------

/// The shared webhook secret used as the HMAC key.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Creates a secret from raw bytes. An empty secret is allowed (the HMAC
    /// is then keyed with the empty key), matching GitHub's behaviour when no
    /// secret is configured.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if no key material was configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([redacted; {} bytes])", self.0.len())
    }
}

// ---------------------------------------------------------------------------

/// Everything the dispatcher and the runner read at run time.
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// HMAC key for `x-hub-signature` verification.
    pub secret: Secret,

    /// Repository checkout the update command runs in.
    pub working_dir: PathBuf,

    /// Request-target prefix the webhook is served under.
    pub route_prefix: RoutePrefix,

    /// Wall-clock limit for one run. Not extended by partial progress.
    pub timeout: Duration,

    /// Shell binary the command is handed to.
    pub shell: PathBuf,

    /// Command line passed to the shell with `-c`.
    pub command: UpdateCommand,

    /// Largest request body accepted for verification.
    pub max_body_bytes: usize,
}

impl HookConfig {
    /// Creates a configuration with every optional setting at its default.
    pub fn new(secret: Secret, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            secret,
            working_dir: working_dir.into(),
            route_prefix: RoutePrefix(DEFAULT_ROUTE_PREFIX.to_string()),
            timeout: DEFAULT_TIMEOUT,
            shell: PathBuf::from(DEFAULT_SHELL),
            command: UpdateCommand(DEFAULT_UPDATE_COMMAND.to_string()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Checks the invariants that cannot be expressed by the field types.
    ///
    /// Whether `working_dir` exists is an I/O question and is checked by the
    /// binary, not here.
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(TriggerError::configuration("working directory is empty"));
        }
        if !self.route_prefix.as_str().starts_with('/') {
            return Err(TriggerError::configuration(format!(
                "route prefix '{}' must start with '/'",
                self.route_prefix
            )));
        }
        if self.timeout.is_zero() {
            return Err(TriggerError::configuration("timeout must be greater than zero"));
        }
        if self.shell.as_os_str().is_empty() {
            return Err(TriggerError::configuration("shell path is empty"));
        }
        if self.max_body_bytes == 0 {
            return Err(TriggerError::configuration(
                "maximum body size must be greater than zero",
            ));
        }
        Ok(())
    }
}
