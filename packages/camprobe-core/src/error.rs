//! Error taxonomy shared by every camprobe component.
//!
//! Per-attempt failures (a refused connection, a 404 path, a rejected
//! credential) are absorbed by the component that hit them and recorded in
//! its attempt log. Only session-level outcomes and PTZ command results are
//! surfaced to callers as `Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Socket create/connect/send/receive failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded network wait ran out.
    #[error("Connection timed out")]
    Timeout,

    /// Unexpected or unparseable response, malformed challenge header.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered 401 after credentials were supplied.
    #[error("Credentials rejected")]
    Authentication,

    /// No usable local subnet, invalid host string, bad config value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// PTZ endpoint answered with a status outside 200-299.
    #[error("PTZ command failed with status {status}")]
    CommandFailed { status: u16 },

    /// Camera store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport and timeout failures are worth retrying by the caller;
    /// everything else needs different input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout | Error::Io(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
