//! Registration and authentication exchanges on the write connection.
//!
//! Both flows are strict request/response sequences. The server's last line
//! is a JSON record; anything that does not parse is a
//! [`ChatError::MalformedResponse`].

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::{error::ChatError, transport::Connection};

/// Final handshake line as sent by the server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    pub nickname: String,
    #[serde(default)]
    pub account_hash: Option<String>,
}

/// Who the server says we are for the current session iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub nickname: String,
    /// Set only when the account was created by this handshake.
    pub issued_token: Option<String>,
}

/// Claims `nickname` as a new anonymous account.
pub async fn register<S>(
    connection: &mut Connection<S>,
    nickname: &str,
) -> Result<SessionIdentity, ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    let greeting = connection.read_line().await?;
    debug!(%greeting, "registration greeting");
    connection.write_line(None).await?;
    let prompt = connection.read_line().await?;
    debug!(%prompt, "nickname prompt");
    connection.write_line(Some(nickname)).await?;

    let reply = connection.read_line().await?;
    let record = match parse_record(&reply)? {
        Some(record) => record,
        None => return Err(ChatError::MalformedResponse(reply)),
    };
    let token = match record.account_hash {
        Some(token) if !token.is_empty() => token,
        _ => return Err(ChatError::MalformedResponse(reply)),
    };

    info!(nickname = %record.nickname, "registered new account");
    Ok(SessionIdentity {
        nickname: record.nickname,
        issued_token: Some(token),
    })
}

/// Redeems an existing account token.
pub async fn authorise<S>(
    connection: &mut Connection<S>,
    token: &str,
) -> Result<SessionIdentity, ChatError>
where
    S: AsyncRead + AsyncWrite,
{
    let greeting = connection.read_line().await?;
    debug!(%greeting, "authorisation greeting");
    connection.write_line(Some(token)).await?;

    let reply = connection.read_line().await?;
    let record = parse_record(&reply)?.ok_or(ChatError::InvalidCredential)?;

    info!(nickname = %record.nickname, "authorised");
    Ok(SessionIdentity {
        nickname: record.nickname,
        issued_token: None,
    })
}

/// `null` and `{}` both mean "no such account".
fn parse_record(line: &str) -> Result<Option<AccountRecord>, ChatError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|error| ChatError::MalformedResponse(format!("{line:?}: {error}")))?;
    let empty = match &value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(fields) => fields.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|error| ChatError::MalformedResponse(format!("{line:?}: {error}")))
}

#[cfg(test)]
mod tests {
    use tokio::io::{BufReader, DuplexStream, duplex};

    use super::*;
    use crate::{
        status::ConnectionSide,
        transport::{read_line, write_line},
    };

    fn pair() -> (Connection<DuplexStream>, BufReader<DuplexStream>) {
        let (client, server) = duplex(1024);
        (
            Connection::new(ConnectionSide::Write, client),
            BufReader::new(server),
        )
    }

    #[tokio::test]
    async fn registration_returns_echoed_nickname_and_token() {
        let (mut connection, mut server) = pair();
        let server_task = tokio::spawn(async move {
            write_line(server.get_mut(), Some("Hello %username%! Enter your personal hash or leave it empty to create new account.")).await?;
            let blank = read_line(&mut server).await?;
            write_line(server.get_mut(), Some("Enter preferred nickname below:")).await?;
            let nickname = read_line(&mut server).await?;
            let record = format!(r#"{{"nickname": "{nickname}", "account_hash": "abc123"}}"#);
            write_line(server.get_mut(), Some(&record)).await?;
            Ok::<_, ChatError>((blank, nickname))
        });

        let identity = register(&mut connection, "alice")
            .await
            .expect("registration succeeds");
        let (blank, submitted) = server_task
            .await
            .expect("server task")
            .expect("server exchange");

        assert_eq!(blank, "");
        assert_eq!(submitted, "alice");
        assert_eq!(
            identity,
            SessionIdentity {
                nickname: "alice".into(),
                issued_token: Some("abc123".into()),
            }
        );
    }

    #[tokio::test]
    async fn registration_rejects_unparseable_record() {
        let (mut connection, mut server) = pair();
        tokio::spawn(async move {
            write_line(server.get_mut(), Some("greeting")).await?;
            read_line(&mut server).await?;
            write_line(server.get_mut(), Some("prompt")).await?;
            read_line(&mut server).await?;
            write_line(server.get_mut(), Some("Welcome, alice")).await?;
            // Keep the stream open until the client has read the reply.
            read_line(&mut server).await
        });

        let result = register(&mut connection, "alice").await;
        assert!(matches!(result, Err(ChatError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn authorisation_with_known_token_yields_nickname() {
        let (mut connection, mut server) = pair();
        let server_task = tokio::spawn(async move {
            write_line(server.get_mut(), Some("Hello %username%! Enter your personal hash or leave it empty to create new account.")).await?;
            let token = read_line(&mut server).await?;
            write_line(server.get_mut(), Some(r#"{"nickname": "Bold Bob", "account_hash": "t0k3n"}"#)).await?;
            Ok::<_, ChatError>(token)
        });

        let identity = authorise(&mut connection, "t0k3n")
            .await
            .expect("authorisation succeeds");
        let submitted = server_task.await.expect("server task").expect("exchange");

        assert_eq!(submitted, "t0k3n");
        assert_eq!(identity.nickname, "Bold Bob");
        assert_eq!(identity.issued_token, None);
    }

    #[tokio::test]
    async fn authorisation_with_unknown_token_is_invalid_credential() {
        let (mut connection, mut server) = pair();
        tokio::spawn(async move {
            write_line(server.get_mut(), Some("greeting")).await?;
            read_line(&mut server).await?;
            write_line(server.get_mut(), Some("null")).await?;
            read_line(&mut server).await
        });

        let result = authorise(&mut connection, "forged").await;
        assert!(matches!(result, Err(ChatError::InvalidCredential)));
    }

    #[test]
    fn empty_object_counts_as_rejection() {
        assert_eq!(parse_record("{}").expect("parses"), None);
        assert_eq!(parse_record("null").expect("parses"), None);
        assert!(matches!(
            parse_record("[1, 2]"),
            Err(ChatError::MalformedResponse(_))
        ));
    }
}
