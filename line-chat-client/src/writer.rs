//! Outgoing side of a session: user messages plus the keep-alive ping.
//!
//! Sends and pings share the write connection and never overlap. Each
//! iteration of the loop either delivers one queued message or runs one
//! ping to completion. Queued messages win over a due ping.
//!
//! The server answers lines on this connection. A message waits for its
//! acknowledgement, and lines still buffered from earlier exchanges are
//! dropped before the next ping so a stale answer never counts as a reply.

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::mpsc::UnboundedReceiver,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    error::ChatError,
    liveness::{LivenessSender, LivenessSource, beat},
    transport::Connection,
};

#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    /// Pause between pings.
    pub interval: Duration,
    /// How long a ping or a sent message may wait for the server's answer.
    pub timeout: Duration,
}

pub async fn write_stream<S>(
    connection: &mut Connection<S>,
    outgoing: &mut UnboundedReceiver<String>,
    liveness: &LivenessSender,
    keep_alive: KeepAlive,
) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut ticker = time::interval(keep_alive.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            biased;
            message = outgoing.recv() => {
                let message = message.ok_or(ChatError::QueueClosed("outgoing"))?;
                send_message(connection, &message).await?;
                await_answer(connection, keep_alive.timeout).await?;
                beat(liveness, LivenessSource::MessageSent);
            }
            _ = ticker.tick() => {
                ping(connection, keep_alive.timeout).await?;
                beat(liveness, LivenessSource::KeepAliveReply);
            }
        }
    }
}

/// A chat message is its text line followed by a blank terminator line.
pub async fn send_message<S>(connection: &mut Connection<S>, message: &str) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    connection.write_line(Some(message)).await?;
    connection.write_line(None).await?;
    info!(%message, "message sent");
    Ok(())
}

async fn ping<S>(connection: &mut Connection<S>, window: Duration) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    connection.discard_ready_lines().await?;
    connection.write_line(None).await?;
    await_answer(connection, window).await
}

/// Waits for the first answer line, then drops whatever else has already
/// arrived with it.
async fn await_answer<S>(connection: &mut Connection<S>, window: Duration) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    match time::timeout(window, connection.read_line()).await {
        Ok(reply) => {
            let reply = reply?;
            debug!(%reply, "server answered");
            connection.discard_ready_lines().await?;
            Ok(())
        }
        Err(_) => {
            warn!("write connection did not answer within {window:?}");
            Err(ChatError::KeepAliveTimeout(window))
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{BufReader, DuplexStream, duplex},
        sync::{mpsc::unbounded_channel, oneshot},
        time::Instant,
    };

    use super::*;
    use crate::{
        liveness::LivenessReceiver,
        status::ConnectionSide,
        transport::{read_line, write_line},
    };

    const KEEP_ALIVE: KeepAlive = KeepAlive {
        interval: Duration::from_secs(1),
        timeout: Duration::from_secs(5),
    };
    const ANSWER: &str = "Message send. Write more";

    fn pair() -> (Connection<DuplexStream>, BufReader<DuplexStream>) {
        let (client, server) = duplex(1024);
        (
            Connection::new(ConnectionSide::Write, client),
            BufReader::new(server),
        )
    }

    fn count(liveness: &mut LivenessReceiver, source: LivenessSource) -> usize {
        let mut seen = 0;
        while let Ok(event) = liveness.try_recv() {
            if event.source == source {
                seen += 1;
            }
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn queued_messages_go_out_in_order_with_blank_terminators() {
        let (mut connection, mut server) = pair();
        let (outgoing_tx, mut outgoing_rx) = unbounded_channel();
        let (liveness_tx, mut liveness_rx) = unbounded_channel();
        let (lines_tx, mut lines_rx) = unbounded_channel();

        tokio::spawn(async move {
            while let Ok(line) = read_line(&mut server).await {
                let _ = lines_tx.send(line);
                if write_line(server.get_mut(), Some(ANSWER)).await.is_err() {
                    break;
                }
            }
        });

        outgoing_tx.send("first".to_string()).expect("queue first");
        outgoing_tx.send("second\nline".to_string()).expect("queue second");

        let writer = write_stream(&mut connection, &mut outgoing_rx, &liveness_tx, KEEP_ALIVE);
        let both_sent = async {
            let mut sent = 0;
            while sent < 2 {
                let event = liveness_rx.recv().await.expect("liveness event");
                if event.source == LivenessSource::MessageSent {
                    sent += 1;
                }
            }
        };
        select! {
            result = writer => panic!("writer stopped early: {result:?}"),
            _ = both_sent => {}
        }

        let mut lines = Vec::new();
        while let Ok(line) = lines_rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines[..4], ["first", "", "secondline", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_ping_times_out() {
        let (mut connection, mut server) = pair();
        let (_outgoing_tx, mut outgoing_rx) = unbounded_channel::<String>();
        let (liveness_tx, mut liveness_rx) = unbounded_channel();

        // Swallow pings without answering.
        tokio::spawn(async move { while read_line(&mut server).await.is_ok() {} });

        let start = Instant::now();
        let result = write_stream(&mut connection, &mut outgoing_rx, &liveness_tx, KEEP_ALIVE).await;

        assert!(matches!(result, Err(ChatError::KeepAliveTimeout(_))));
        assert_eq!(start.elapsed(), KEEP_ALIVE.timeout);
        assert_eq!(count(&mut liveness_rx, LivenessSource::KeepAliveReply), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn answered_ping_counts_as_liveness() {
        let (mut connection, mut server) = pair();
        let (_outgoing_tx, mut outgoing_rx) = unbounded_channel::<String>();
        let (liveness_tx, mut liveness_rx) = unbounded_channel();

        tokio::spawn(async move {
            while read_line(&mut server).await.is_ok() {
                if write_line(server.get_mut(), Some("pong")).await.is_err() {
                    break;
                }
            }
        });

        let writer = write_stream(&mut connection, &mut outgoing_rx, &liveness_tx, KEEP_ALIVE);
        let event = select! {
            result = writer => panic!("writer stopped early: {result:?}"),
            event = liveness_rx.recv() => event.expect("liveness event"),
        };
        assert_eq!(event.source, LivenessSource::KeepAliveReply);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_to_earlier_messages_do_not_hide_a_silent_server() {
        let (mut connection, mut server) = pair();
        let (outgoing_tx, mut outgoing_rx) = unbounded_channel();
        let (liveness_tx, mut liveness_rx) = unbounded_channel();
        let (silent_tx, silent_rx) = oneshot::channel();

        // Answers both lines of five messages, then keeps the stream open
        // without answering anything else.
        tokio::spawn(async move {
            for _ in 0..10 {
                read_line(&mut server).await?;
                write_line(server.get_mut(), Some(ANSWER)).await?;
            }
            let _ = silent_tx.send(Instant::now());
            while read_line(&mut server).await.is_ok() {}
            Ok::<_, ChatError>(())
        });

        for n in 0..5 {
            outgoing_tx.send(format!("message {n}")).expect("queue message");
        }

        let result = write_stream(&mut connection, &mut outgoing_rx, &liveness_tx, KEEP_ALIVE).await;
        let failed_at = Instant::now();
        let silent_since = silent_rx.await.expect("server went silent");

        assert!(matches!(result, Err(ChatError::KeepAliveTimeout(_))));
        let undetected = failed_at.duration_since(silent_since);
        assert!(
            undetected <= KEEP_ALIVE.interval + KEEP_ALIVE.timeout,
            "silence went unnoticed for {undetected:?}"
        );

        let mut sent = 0;
        let mut replies = 0;
        while let Ok(event) = liveness_rx.try_recv() {
            match event.source {
                LivenessSource::MessageSent => sent += 1,
                LivenessSource::KeepAliveReply => replies += 1,
                _ => {}
            }
        }
        assert_eq!(sent, 5);
        assert_eq!(replies, 0);
    }

    #[tokio::test]
    async fn closed_outgoing_queue_ends_the_stream() {
        let (mut connection, _server) = pair();
        let (outgoing_tx, mut outgoing_rx) = unbounded_channel::<String>();
        let (liveness_tx, _liveness_rx) = unbounded_channel();
        drop(outgoing_tx);

        let result = write_stream(&mut connection, &mut outgoing_rx, &liveness_tx, KEEP_ALIVE).await;
        assert!(matches!(result, Err(ChatError::QueueClosed("outgoing"))));
    }
}
