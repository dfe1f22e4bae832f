use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc::UnboundedSender,
};
use tracing::debug;

use crate::{
    error::ChatError,
    liveness::{LivenessSender, LivenessSource, beat},
    transport::Connection,
};

/// Streams chat lines from the read connection into the presentation and
/// history queues. Returns only when the connection fails.
pub async fn read_stream<S>(
    connection: &mut Connection<S>,
    incoming: &UnboundedSender<String>,
    history: &UnboundedSender<String>,
    liveness: &LivenessSender,
) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    loop {
        let line = connection.read_line().await?;
        if incoming.send(line.clone()).is_err() {
            debug!("incoming queue has no consumer, line not displayed");
        }
        if history.send(line).is_err() {
            debug!("history queue has no consumer, line not logged");
        }
        beat(liveness, LivenessSource::MessageReceived);
    }
}
