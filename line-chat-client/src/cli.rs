use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::session::{Credential, SessionConfig, Timeouts};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the chat and stay connected until interrupted.
    Chat(ChatArgs),
    /// Create a new account and save its token.
    Register(RegisterArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Chat server host name.
    #[arg(long, env = "HOST", default_value = "minechat.dvmn.org")]
    pub host: String,

    /// Port of the read/write stream used for login and sending.
    #[arg(long, env = "SEND_PORT", default_value_t = 5050)]
    pub send_port: u16,

    /// Immediate connect retries before waiting between attempts.
    #[arg(long, env = "ATTEMPTS_COUNT", default_value_t = 3)]
    pub attempts: u32,

    /// File holding the account token.
    #[arg(long, default_value = "token.txt")]
    pub token_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Port of the read-only message stream.
    #[arg(long, env = "READ_PORT", default_value_t = 5000)]
    pub read_port: u16,

    /// Account token; takes precedence over the token file.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Register under this nickname when no token is available.
    #[arg(long)]
    pub nickname: Option<String>,

    /// Directory holding history_logs.txt. Defaults to the working directory.
    #[arg(long, env = "HISTORY_LOG_DIR_PATH")]
    pub history: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Nickname to claim.
    #[arg(long)]
    pub nickname: String,
}

impl ChatArgs {
    /// Builds the session configuration. `stored_token` is whatever the token
    /// file held; an explicit `--token` wins over it.
    pub fn session_config(&self, stored_token: Option<String>) -> Result<SessionConfig> {
        let credential = match (self.token.clone().or(stored_token), &self.nickname) {
            (Some(token), _) => Credential::Token(token),
            (None, Some(nickname)) => Credential::Nickname(nickname.clone()),
            (None, None) => bail!(
                "no account token: pass --token, save one to {}, or register with --nickname",
                self.server.token_file.display()
            ),
        };

        Ok(SessionConfig {
            host: self.server.host.clone(),
            read_port: self.read_port,
            send_port: self.server.send_port,
            max_attempts: self.server.attempts,
            credential,
            timeouts: Timeouts::default(),
        })
    }

    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.history {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}
