//! pullhook webhook event source.
//!
//! Receives push notifications over HTTP and turns every authenticated one
//! into a call to [`trigger::UpdateTrigger::fire`]:
//!
//! - [`dispatch`] — the request handler. Checks method and route prefix,
//!   parses `x-hub-signature`, reads the body, verifies the HMAC-SHA1 digest,
//!   and fires the trigger without waiting for the run.
//! - [`server`] — binds a TCP address or a Unix socket and serves the
//!   dispatcher until the shutdown future resolves.
//!
//! ## Responses
//!
//! | Condition | Status |
//! |-----------|--------|
//! | not POST, or target outside the route prefix | 400 |
//! | signature header missing or malformed | 400 |
//! | body could not be read | 200 (logged only) |
//! | digest mismatch | 400 |
//! | accepted | 200, run fired |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and socket handling live here. The
//! [`trigger`] crate sees none of it.

pub mod dispatch;
pub mod server;

pub use dispatch::{router, DispatchState};
pub use server::{serve, Endpoint, ListenerError};
