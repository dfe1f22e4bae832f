use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::{select, sync::mpsc::unbounded_channel};
use tracing::warn;

use line_chat_client::{
    cli::{ChatArgs, Cli, Command, RegisterArgs},
    console, history,
    session::{self, CONNECT_BACKOFF, FrontendQueues, Session},
    token::{FileTokenStore, TokenStore},
    transport::{Endpoint, TcpConnector},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => run_chat(args).await?,
        Command::Register(args) => run_register(args).await?,
    }

    Ok(())
}

async fn run_chat(args: ChatArgs) -> Result<()> {
    let history_dir = args.history_dir()?;
    if !history_dir.is_dir() {
        bail!("history log path does not exist: {}", history_dir.display());
    }

    let tokens = FileTokenStore::new(&args.server.token_file);
    let stored_token = tokens.load().await?;
    let config = args.session_config(stored_token)?;

    let (queues, frontend) = session::queues();
    let FrontendQueues {
        incoming,
        history,
        outgoing,
        status,
    } = frontend;

    let history_file = history::history_path(&history_dir);
    replay_history(&history_file, &queues.incoming).await?;
    let history_task = tokio::spawn(history::save_messages(history_file, history));

    let session = Session::new(config, TcpConnector, tokens, queues);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
    };

    select! {
        result = session.run_until(shutdown) => result.context("chat session aborted")?,
        result = console::run(incoming, status, outgoing) => result?,
    }

    history_task
        .await
        .context("history writer panicked")?
        .context("failed to write history")?;
    Ok(())
}

async fn replay_history(
    path: &Path,
    incoming: &tokio::sync::mpsc::UnboundedSender<String>,
) -> Result<()> {
    for line in history::load_history(path).await? {
        incoming
            .send(line)
            .context("incoming queue closed during history replay")?;
    }
    Ok(())
}

async fn run_register(args: RegisterArgs) -> Result<()> {
    let tokens = FileTokenStore::new(&args.server.token_file);
    let endpoint = Endpoint::new(args.server.host.clone(), args.server.send_port);
    let (status_tx, mut status_rx) = unbounded_channel();

    let status_task = tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            console::render_status(update).await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let identity = session::register_account(
        &TcpConnector,
        &endpoint,
        &args.nickname,
        args.server.attempts,
        CONNECT_BACKOFF,
        &tokens,
        &status_tx,
    )
    .await
    .context("registration failed, try again")?;

    drop(status_tx);
    status_task.await??;
    console::write_stdout(&format!(
        "*** registered as {}; token saved to {}",
        identity.nickname,
        tokens.path().display()
    ))
    .await?;
    Ok(())
}
