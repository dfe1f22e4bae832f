use std::{io, time::Duration};

use thiserror::Error;

/// Everything that can end a session iteration.
///
/// The orchestrator only looks at [`ChatError::is_fatal`]: fatal errors stop
/// the reconnect loop, everything else tears the connections down and starts
/// over from connection acquisition.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The peer closed the stream while we were waiting for a line.
    #[error("connection closed by peer")]
    TransportClosed,

    /// DNS failure, refused, reset or any other socket-level error.
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    /// The final handshake line was not the expected JSON record.
    #[error("malformed handshake response: {0}")]
    MalformedResponse(String),

    /// The server answered the token with an empty record.
    #[error("server rejected the account token")]
    InvalidCredential,

    #[error("no keep-alive response within {0:?}")]
    KeepAliveTimeout(Duration),

    #[error("no liveness event within {0:?}")]
    WatchdogTimeout(Duration),

    /// A collaborator dropped its end of one of the session queues.
    #[error("{0} queue closed")]
    QueueClosed(&'static str),

    #[error("failed to persist account token: {0}")]
    TokenStorage(#[source] io::Error),
}

impl ChatError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::InvalidCredential | ChatError::TokenStorage(_) | ChatError::QueueClosed(_)
        )
    }
}
