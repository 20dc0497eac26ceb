//! Port definitions consumed by the HTTP dispatcher.

/// Launches an update run without waiting for it.
///
/// Implementations must return promptly: the dispatcher calls this on the
/// request path and responds only after it returns. Serialising runs is the
/// implementation's job; every call must eventually lead to one run.
pub trait UpdateTrigger: Send + Sync {
    /// Starts one update run in the background.
    fn fire(&self);
}
