//! Newline-framed text transport over TCP.
//!
//! Every frame on the wire is one UTF-8 line terminated by `\n`. Outgoing
//! text never carries embedded line breaks, otherwise the server would read
//! one message as several protocol lines.

use std::{fmt, future::poll_fn, io, pin::Pin, task::Poll, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
        WriteHalf,
    },
    net::TcpStream,
    time,
};
use tracing::{debug, info, warn};

use crate::{
    error::ChatError,
    status::{ConnectionSide, ConnectionState, StatusSink, StatusUpdate, publish},
};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens byte streams to the server. Tests swap in simulated connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await
    }
}

/// Connects, retrying until it succeeds.
///
/// The first `max_attempts` failures are retried immediately. After that
/// every failure waits `backoff` before the next attempt. There is no upper
/// bound: callers that want to give up drop the future.
pub async fn connect<C>(
    connector: &C,
    endpoint: &Endpoint,
    side: ConnectionSide,
    max_attempts: u32,
    backoff: Duration,
    status: &StatusSink,
) -> Connection<C::Stream>
where
    C: Connector,
{
    let mut failed_attempts = 0;
    loop {
        publish(
            status,
            StatusUpdate::connection(side, ConnectionState::Connecting),
        );
        match connector.connect(endpoint).await {
            Ok(stream) => {
                info!(%side, %endpoint, "connection established");
                publish(
                    status,
                    StatusUpdate::connection(side, ConnectionState::Established),
                );
                return Connection::new(side, stream);
            }
            Err(error) if failed_attempts < max_attempts => {
                failed_attempts += 1;
                debug!(%side, %endpoint, attempt = failed_attempts, error = ?error, "connect failed, retrying");
            }
            Err(error) => {
                warn!(%side, %endpoint, error = ?error, "connect failed, retrying in {backoff:?}");
                time::sleep(backoff).await;
            }
        }
    }
}

/// One open stream to the server, owned by a single session iteration.
pub struct Connection<S> {
    side: ConnectionSide,
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(side: ConnectionSide, stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            side,
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub fn side(&self) -> ConnectionSide {
        self.side
    }

    pub async fn read_line(&mut self) -> Result<String, ChatError> {
        read_line(&mut self.reader).await
    }

    pub async fn write_line(&mut self, text: Option<&str>) -> Result<(), ChatError> {
        write_line(&mut self.writer, text).await
    }

    /// Drops every complete line that has already arrived, without waiting
    /// for more. A trailing partial line stays buffered.
    pub async fn discard_ready_lines(&mut self) -> Result<usize, ChatError> {
        let reader = &mut self.reader;
        let discarded = poll_fn(|cx| {
            let mut discarded = 0;
            loop {
                let ready = match Pin::new(&mut *reader).poll_fill_buf(cx) {
                    Poll::Ready(Ok(ready)) => ready,
                    Poll::Ready(Err(error)) => return Poll::Ready(Err(ChatError::from(error))),
                    Poll::Pending => return Poll::Ready(Ok(discarded)),
                };
                if ready.is_empty() {
                    return Poll::Ready(Err(ChatError::TransportClosed));
                }
                let Some(end) = ready.iter().rposition(|byte| *byte == b'\n') else {
                    return Poll::Ready(Ok(discarded));
                };
                discarded += ready[..=end].iter().filter(|byte| **byte == b'\n').count();
                reader.consume(end + 1);
            }
        })
        .await?;

        if discarded > 0 {
            debug!(side = %self.side, lines = discarded, "discarded stale lines");
        }
        Ok(discarded)
    }

    /// Shuts the stream down and drops it. Failures are logged, never returned,
    /// so teardown always completes. This is the only place a connection is
    /// reported closed.
    pub async fn close(mut self, status: &StatusSink) {
        if let Err(error) = self.writer.shutdown().await {
            debug!(side = %self.side, error = ?error, "shutdown on close failed");
        }
        info!(side = %self.side, "connection closed");
        publish(
            status,
            StatusUpdate::connection(self.side, ConnectionState::Closed),
        );
    }
}

/// Reads one frame and strips its line ending. Empty lines are returned as-is.
/// Bytes that are not valid UTF-8 become U+FFFD instead of failing the read.
pub async fn read_line<R>(reader: &mut R) -> Result<String, ChatError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let bytes = reader.read_until(b'\n', &mut line).await?;
    if bytes == 0 {
        return Err(ChatError::TransportClosed);
    }

    let decoded = String::from_utf8_lossy(&line)
        .trim_end_matches(LINE_ENDINGS)
        .to_string();
    debug!(line = %decoded, "received line");
    Ok(decoded)
}

pub async fn write_line<W>(writer: &mut W, text: Option<&str>) -> Result<(), ChatError>
where
    W: AsyncWrite + Unpin,
{
    let framed = frame_line(text);
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Turns text into exactly one wire line. Absent or empty text becomes a bare
/// newline, which doubles as the keep-alive ping.
pub fn frame_line(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.is_empty() => {
            let flattened = text.replace(LINE_ENDINGS, "");
            let mut framed = flattened.trim().to_string();
            framed.push('\n');
            framed
        }
        _ => "\n".to_string(),
    }
}
