//! Terminal frontend: prints the incoming queue and status updates, feeds
//! stdin lines into the outgoing queue.

use anyhow::Result;
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
};
use tracing::warn;

use crate::status::StatusUpdate;

/// Runs until stdin closes or the user types `/quit`.
pub async fn run(
    incoming: UnboundedReceiver<String>,
    status: UnboundedReceiver<StatusUpdate>,
    outgoing: UnboundedSender<String>,
) -> Result<()> {
    relay(BufReader::new(tokio::io::stdin()), incoming, status, outgoing).await
}

/// Same loop over any line source. `next_line` keeps a partly typed line
/// buffered when another branch wins the select.
pub async fn relay<R>(
    input: R,
    mut incoming: UnboundedReceiver<String>,
    mut status: UnboundedReceiver<StatusUpdate>,
    outgoing: UnboundedSender<String>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut input = input.lines();

    loop {
        select! {
            Some(line) = incoming.recv() => {
                write_stdout(&line).await?;
            }
            Some(update) = status.recv() => {
                render_status(update).await?;
            }
            line = input.next_line() => {
                if !handle_stdin_input(line, &outgoing).await? {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn handle_stdin_input(
    line: io::Result<Option<String>>,
    outgoing: &UnboundedSender<String>,
) -> Result<bool> {
    let Some(line) = line? else {
        return Ok(false);
    };

    let text = line.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    if outgoing.send(text.to_string()).is_err() {
        warn!("session stopped, message not sent");
        return Ok(false);
    }
    Ok(true)
}

pub async fn render_status(update: StatusUpdate) -> io::Result<()> {
    match update {
        StatusUpdate::Connection { side, state } => {
            write_stdout(&format!("*** {side} connection: {state}")).await
        }
        StatusUpdate::Nickname(nickname) => {
            write_stdout(&format!("*** logged in as {nickname}")).await
        }
    }
}

pub async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
