//! Error types shared by every emberkv crate.
//!
//! We use `thiserror` for automatic `Display`/`Error` impls, the same as
//! the rest of the workspace. `Error` is the unified error type; most of
//! its variants map directly onto a RESP error reply (see
//! `emberkv-proto::reply::error`), but a handful (`Io`, `Corruption`,
//! `Fatal`) can only be produced while the process is starting up or
//! while persistence is involved, and are expected to abort the process
//! rather than become a reply.

use std::io;
use thiserror::Error;

/// Result type alias used throughout emberkv.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for emberkv.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a file or socket operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client sent a frame that did not parse as RESP.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Command name is not in the dispatch table.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Wrong number of arguments for a known command.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// A key exists but holds a value of a different kind than the
    /// command expects (e.g. `LPUSH` against a string key).
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Argument could not be parsed as the expected type (e.g. a
    /// non-numeric TTL).
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// Argument could not be parsed as a floating point score.
    #[error("value is not a valid float")]
    NotAFloat,

    /// `KEYS` pattern failed to compile as a regular expression.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A password is configured and the client has not authenticated.
    #[error("NOAUTH Authentication required")]
    NoAuth,

    /// `AUTH` was sent with the wrong password, or no password is set.
    #[error("invalid password")]
    InvalidPassword,

    /// Persisted data failed a checksum or structural check on replay.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// An invariant that must always hold was violated; this can only
    /// come from a bug and the caller should treat it as fatal.
    #[error("internal invariant violated: {0}")]
    Fatal(String),
}

impl Error {
    /// True for errors that should be reported as a RESP error reply to
    /// the offending client without tearing down the connection.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownCommand(_)
                | Error::WrongArity(_)
                | Error::WrongType
                | Error::NotAnInteger
                | Error::NotAFloat
                | Error::InvalidPattern(_)
                | Error::NoAuth
                | Error::InvalidPassword
        )
    }
}
