//! Newtype domain identifiers.
//!
//! Strings that mean different things (a route prefix, a shell command line)
//! get distinct newtypes so they cannot be swapped by accident when the
//! configuration is assembled.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub(crate) String);

        impl $name {
            /// Creates a new value, returning `None` if it is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single update run (one spawn-wait-or-kill cycle).
///
/// Generated fresh for every run after the update lock is acquired; recorded
/// on the run's tracing span so every log line of one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (configuration)
// ---------------------------------------------------------------------------

string_id! {
    /// The request-target prefix the webhook is served under (e.g. `"/push"`).
    ///
    /// Any POST whose target starts with this prefix is treated as a
    /// notification, so `"/push"` also accepts `"/push/main"` and
    /// `"/push?delivery=1"`.
    RoutePrefix
}

string_id! {
    /// The update command line handed to the shell with `-c`
    /// (e.g. `"/usr/bin/git pull -q"`).
    UpdateCommand
}

impl RoutePrefix {
    /// Returns `true` if `target` (path plus query, as received) falls under
    /// this prefix.
    pub fn matches(&self, target: &str) -> bool {
        target.starts_with(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_are_rejected() {
        assert!(RoutePrefix::new("").is_none());
        assert!(UpdateCommand::new(String::new()).is_none());
    }

    #[test]
    fn route_prefix_matches_by_prefix() {
        let prefix = RoutePrefix::new("/push").unwrap();

        assert!(prefix.matches("/push"));
        assert!(prefix.matches("/push/main"));
        assert!(prefix.matches("/push?delivery=1"));
        assert!(prefix.matches("/pushed"));
        assert!(!prefix.matches("/pull"));
        assert!(!prefix.matches("/"));
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new_random(), RunId::new_random());
    }
}
