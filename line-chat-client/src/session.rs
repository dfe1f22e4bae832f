//! Session orchestrator.
//!
//! One iteration acquires both connections, runs the handshake on the write
//! connection, then streams until the first failure:
//!
//! ```text
//! ACQUIRING -> HANDSHAKING -> STREAMING -> TEARDOWN -> ACQUIRING ...
//!                   |
//!                   +-> ABORTED (fatal errors only)
//! ```
//!
//! Read pipeline, write pipeline and watchdog run as one group inside
//! `try_join!`: the first error drops the other two before teardown closes
//! the handles, so nothing keeps using a connection that is about to close.

use std::{fmt, future::Future, time::Duration};

use tokio::{
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{error, info, warn};

use crate::{
    error::ChatError,
    handshake::{self, SessionIdentity},
    liveness::{LivenessSource, beat},
    reader::read_stream,
    status::{ConnectionSide, StatusSink, StatusUpdate, publish},
    token::TokenStore,
    transport::{self, Connection, Connector, Endpoint},
    watchdog::{self, WATCHDOG_TIMEOUT},
    writer::{KeepAlive, write_stream},
};

pub const CONNECT_BACKOFF: Duration = Duration::from_secs(3);
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect_backoff: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub watchdog_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_backoff: CONNECT_BACKOFF,
            keepalive_interval: KEEP_ALIVE_INTERVAL,
            keepalive_timeout: KEEP_ALIVE_TIMEOUT,
            watchdog_timeout: WATCHDOG_TIMEOUT,
        }
    }
}

/// What the handshake presents to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Redeem an existing account.
    Token(String),
    /// Create a new account under this nickname.
    Nickname(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub read_port: u16,
    pub send_port: u16,
    /// Immediate connect retries before falling back to `connect_backoff`.
    pub max_attempts: u32,
    pub credential: Credential,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    pub fn read_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.read_port)
    }

    pub fn send_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.send_port)
    }
}

/// The session's ends of the queues shared with the presentation layer.
pub struct SessionQueues {
    pub incoming: UnboundedSender<String>,
    pub history: UnboundedSender<String>,
    pub outgoing: UnboundedReceiver<String>,
    pub status: StatusSink,
}

/// The collaborators' ends of the same queues.
pub struct FrontendQueues {
    pub incoming: UnboundedReceiver<String>,
    pub history: UnboundedReceiver<String>,
    pub outgoing: UnboundedSender<String>,
    pub status: UnboundedReceiver<StatusUpdate>,
}

pub fn queues() -> (SessionQueues, FrontendQueues) {
    let (incoming_tx, incoming_rx) = unbounded_channel();
    let (history_tx, history_rx) = unbounded_channel();
    let (outgoing_tx, outgoing_rx) = unbounded_channel();
    let (status_tx, status_rx) = unbounded_channel();
    (
        SessionQueues {
            incoming: incoming_tx,
            history: history_tx,
            outgoing: outgoing_rx,
            status: status_tx,
        },
        FrontendQueues {
            incoming: incoming_rx,
            history: history_rx,
            outgoing: outgoing_tx,
            status: status_rx,
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Acquiring,
    Handshaking,
    Streaming,
    Teardown,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Acquiring => "ACQUIRING",
            SessionState::Handshaking => "HANDSHAKING",
            SessionState::Streaming => "STREAMING",
            SessionState::Teardown => "TEARDOWN",
            SessionState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

fn enter(state: SessionState) {
    info!(%state, "session state");
}

pub struct Session<C, T> {
    config: SessionConfig,
    connector: C,
    tokens: T,
    queues: SessionQueues,
}

impl<C, T> Session<C, T>
where
    C: Connector,
    T: TokenStore,
{
    pub fn new(config: SessionConfig, connector: C, tokens: T, queues: SessionQueues) -> Self {
        Self {
            config,
            connector,
            tokens,
            queues,
        }
    }

    /// The credential the next iteration will present. Switches from
    /// nickname to token once registration has issued one.
    pub fn credential(&self) -> &Credential {
        &self.config.credential
    }

    /// Reconnects forever; returns only with a fatal error.
    pub async fn run(&mut self) -> Result<(), ChatError> {
        loop {
            match self.run_iteration().await {
                Ok(()) => {}
                Err(error) if error.is_fatal() => {
                    enter(SessionState::Aborted);
                    error!(error = %error, "session aborted");
                    return Err(error);
                }
                Err(error) => {
                    warn!(at = %chrono::Local::now(), error = %error, "session failed, reconnecting");
                }
            }
        }
    }

    /// Like [`Session::run`] but returns `Ok` once `shutdown` resolves. Any
    /// open connection is dropped, and with it closed, on the way out.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ChatError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        select! {
            _ = &mut shutdown => {
                info!("session shutting down");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    async fn run_iteration(&mut self) -> Result<(), ChatError> {
        enter(SessionState::Acquiring);
        let (mut read, mut write) = self.acquire().await;

        let outcome = self.handshake_and_stream(&mut read, &mut write).await;

        enter(SessionState::Teardown);
        read.close(&self.queues.status).await;
        write.close(&self.queues.status).await;
        outcome
    }

    async fn acquire(&self) -> (Connection<C::Stream>, Connection<C::Stream>) {
        let read_endpoint = self.config.read_endpoint();
        let send_endpoint = self.config.send_endpoint();
        let attempts = self.config.max_attempts;
        let backoff = self.config.timeouts.connect_backoff;
        let status = &self.queues.status;

        tokio::join!(
            transport::connect(&self.connector, &read_endpoint, ConnectionSide::Read, attempts, backoff, status),
            transport::connect(&self.connector, &send_endpoint, ConnectionSide::Write, attempts, backoff, status),
        )
    }

    async fn handshake_and_stream(
        &mut self,
        read: &mut Connection<C::Stream>,
        write: &mut Connection<C::Stream>,
    ) -> Result<(), ChatError> {
        enter(SessionState::Handshaking);
        let identity = self.handshake(write).await?;
        publish(&self.queues.status, StatusUpdate::Nickname(identity.nickname));

        let (liveness_tx, mut liveness_rx) = unbounded_channel();
        beat(&liveness_tx, LivenessSource::Authorised);

        enter(SessionState::Streaming);
        let timeouts = self.config.timeouts;
        let keep_alive = KeepAlive {
            interval: timeouts.keepalive_interval,
            timeout: timeouts.keepalive_timeout,
        };
        let SessionQueues {
            incoming,
            history,
            outgoing,
            ..
        } = &mut self.queues;

        tokio::try_join!(
            read_stream(read, incoming, history, &liveness_tx),
            write_stream(write, outgoing, &liveness_tx, keep_alive),
            watchdog::watch(&mut liveness_rx, timeouts.watchdog_timeout),
        )?;
        Ok(())
    }

    async fn handshake(
        &mut self,
        write: &mut Connection<C::Stream>,
    ) -> Result<SessionIdentity, ChatError> {
        let credential = self.config.credential.clone();
        match credential {
            Credential::Token(token) => handshake::authorise(write, &token).await,
            Credential::Nickname(nickname) => {
                let identity = handshake::register(write, &nickname).await?;
                if let Some(token) = &identity.issued_token {
                    self.tokens.save(token).await?;
                    self.config.credential = Credential::Token(token.clone());
                }
                Ok(identity)
            }
        }
    }
}

/// Creates an account and persists its token without starting a chat session.
///
/// Network failures start over with a fresh connection. A malformed reply is
/// returned as-is.
pub async fn register_account<C, T>(
    connector: &C,
    endpoint: &Endpoint,
    nickname: &str,
    max_attempts: u32,
    backoff: Duration,
    tokens: &T,
    status: &StatusSink,
) -> Result<SessionIdentity, ChatError>
where
    C: Connector,
    T: TokenStore,
{
    loop {
        let mut connection =
            transport::connect(connector, endpoint, ConnectionSide::Write, max_attempts, backoff, status).await;
        let outcome = handshake::register(&mut connection, nickname).await;
        connection.close(status).await;

        match outcome {
            Ok(identity) => {
                if let Some(token) = &identity.issued_token {
                    tokens.save(token).await?;
                }
                return Ok(identity);
            }
            Err(error @ (ChatError::TransportClosed | ChatError::Io(_))) => {
                warn!(error = %error, "registration interrupted, retrying");
            }
            Err(error) => return Err(error),
        }
    }
}
