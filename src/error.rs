// Error type shared by the session store and the API client.
// Each variant maps to one way an invocation can fail so the command layer
// can tell "the server said no" apart from "the network is down" or "you
// never logged in".

use std::path::PathBuf;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DNS, connect, timeout or body read failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a status outside the accepted range. The body
    /// is kept verbatim; it is usually JSON but is not interpreted here.
    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    /// A successful response whose body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("login succeeded but no session cookie received")]
    NoSessionCookie,

    #[error("not logged in. Run 'mathemcli login' first")]
    NotLoggedIn,

    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("session file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session file {}: {source}", .path.display())]
    SessionFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// HTTP status code carried by a [`Error::Status`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
