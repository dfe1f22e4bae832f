//! Network core of a line-oriented chat client.
//!
//! The client keeps two TCP connections to the chat server: a read-only
//! stream of chat lines and a read/write stream used for login, sending and
//! keep-alive pings. A [`session::Session`] ties them together and
//! reconnects whenever either side fails or the pair goes quiet.
//!
//! - [`transport`] frames text as newline-terminated lines and connects with
//!   burst-then-backoff retries.
//! - [`handshake`] registers new accounts and authorises existing tokens.
//! - [`reader`] and [`writer`] are the streaming pipelines; [`watchdog`]
//!   watches their [`liveness`] events.
//! - [`session`] is the reconnect loop that supervises all of the above.
//! - [`token`], [`history`] and [`console`] are the collaborators the binary
//!   wires in: token file, transcript file and terminal frontend.
//! - [`cli`] parses flags and environment variables.

pub mod cli;
pub mod console;
pub mod error;
pub mod handshake;
pub mod history;
pub mod liveness;
pub mod reader;
pub mod session;
pub mod status;
pub mod token;
pub mod transport;
pub mod watchdog;
pub mod writer;
