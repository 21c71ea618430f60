//! Crate-level fault taxonomy. The split that matters operationally is
//! `Remote` (the engine rejected one request; the session is fine) versus
//! `Fatal` (the wire position is suspect; the session must be discarded and
//! never pooled again).

use thiserror::Error;

use crate::wire::WireError;

// -----------------------------------------------------------------------------
// ----- Error -----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum Error {
    /// The engine returned a structured error for a specific request. The
    /// connection remains usable.
    #[error("remote query failure for `{query}`: {message}")]
    Remote { query: String, message: String },

    /// Raw I/O or decode failure mid-exchange. Framing may be
    /// desynchronized; the connection is demoted to non-reusable.
    #[error("connection fault, session is no longer usable")]
    Fatal(#[source] WireError),

    /// Both the versioned and the legacy handshake were rejected.
    #[error("authentication rejected for user `{user}`")]
    AccessDenied { user: String },

    /// Invalid pool bounds or a malformed descriptor, raised before any
    /// connection is opened.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Acquire or checkout against a pool that has been disposed.
    #[error("connection pool has been disposed")]
    PoolDisposed,

    /// A decoded value did not match the requested scalar type.
    #[error("cannot read a {expected} out of a {found} result")]
    Conversion {
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// True when the connection that raised this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_) | Error::AccessDenied { .. })
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
