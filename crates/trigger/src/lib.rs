//! Core domain for pullhook.
//!
//! pullhook listens for an authenticated push notification and, in response,
//! runs one update command (a source-tree sync) in a configured working
//! directory. This crate holds everything about that flow that does not
//! touch the network or the process table: the immutable configuration, the
//! webhook signature check, the run outcome types, and the
//! [`UpdateTrigger`] port the HTTP dispatcher fires.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! The `runner` crate implements [`UpdateTrigger`]; the `listener` crate
//! consumes it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`config`] | [`HookConfig`] and its defaults |
//! | [`identifiers`] | Newtype identifiers (`RunId`, `RoutePrefix`, `UpdateCommand`) |
//! | [`signature`] | `x-hub-signature` parsing and HMAC-SHA1 verification |
//! | [`types`] | Value types (`Timestamp`, `RunOutcome`, `RunReport`) |
//! | [`errors`] | Configuration and signature error types |
//! | [`port`] | The [`UpdateTrigger`] trait |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod port;
pub mod signature;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    HookConfig, Secret, DEFAULT_MAX_BODY_BYTES, DEFAULT_ROUTE_PREFIX, DEFAULT_SHELL,
    DEFAULT_TIMEOUT, DEFAULT_UPDATE_COMMAND,
};
pub use errors::{SignatureError, TriggerError};
pub use identifiers::{RoutePrefix, RunId, UpdateCommand};
pub use port::UpdateTrigger;
pub use signature::{ClaimedDigest, SignatureVerifier, SIGNATURE_HEADER, SIGNATURE_PREFIX};
pub use types::{RunOutcome, RunReport, Timestamp};
