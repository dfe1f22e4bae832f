//! Connection status reported to the presentation layer.
//!
//! Status updates are informational only. Nothing inside the session keys
//! its control flow off them; that is what [`crate::error::ChatError`] is for.

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSide {
    Read,
    Write,
}

impl fmt::Display for ConnectionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSide::Read => f.write_str("read"),
            ConnectionSide::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Established => f.write_str("established"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Connection {
        side: ConnectionSide,
        state: ConnectionState,
    },
    /// The server confirmed who we are after the handshake.
    Nickname(String),
}

impl StatusUpdate {
    pub fn connection(side: ConnectionSide, state: ConnectionState) -> Self {
        StatusUpdate::Connection { side, state }
    }
}

pub type StatusSink = UnboundedSender<StatusUpdate>;

/// Posts an update; a presentation layer that has gone away is not an error.
pub fn publish(sink: &StatusSink, update: StatusUpdate) {
    if let Err(error) = sink.send(update) {
        debug!(update = ?error.0, "status sink closed, dropping update");
    }
}
