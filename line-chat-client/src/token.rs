use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::info;

use crate::error::ChatError;

/// Where the account token lives between runs.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns `None` when no token has been saved yet.
    async fn load(&self) -> Result<Option<String>, ChatError>;

    async fn save(&self, token: &str) -> Result<(), ChatError>;
}

/// Keeps the token as the whole content of a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, ChatError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ChatError::TokenStorage(error)),
        }
    }

    async fn save(&self, token: &str) -> Result<(), ChatError> {
        tokio::fs::write(&self.path, token)
            .await
            .map_err(ChatError::TokenStorage)?;
        info!(path = %self.path.display(), "account token saved");
        Ok(())
    }
}
