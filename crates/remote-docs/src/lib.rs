//! Asynchronous client for the remote file metadata service.
//!
//! The surface context uses this to turn a file key into a document snapshot.
//! Authentication is a personal access token sent in a request header; the
//! token is supplied out-of-band (usually the `FIGMA_TOKEN` environment
//! variable).

mod memory;

use async_trait::async_trait;
use bridge_proto::{DocumentSnapshot, SnapshotError};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

pub use memory::InMemoryDocumentSource;

pub const DEFAULT_API_BASE: &str = "https://api.figma.com/v1";
pub const TOKEN_HEADER: &str = "X-Figma-Token";

#[derive(Debug, Error)]
pub enum RemoteDocsError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("file {0} not found")]
    NotFound(String),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("invalid document snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
}

/// Anything that can resolve a file key to a document snapshot.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, file_key: &str) -> Result<DocumentSnapshot, RemoteDocsError>;
}

#[derive(Clone)]
pub struct RemoteDocsClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RemoteDocsClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn file_url(&self, file_key: &str) -> String {
        format!("{}/files/{}", self.base_url, file_key)
    }

    pub async fn get_file(&self, file_key: &str) -> Result<DocumentSnapshot, RemoteDocsError> {
        let url = self.file_url(file_key);
        debug!(target: "remote_docs", %url, "fetching file");
        let res = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            let body = res.json::<serde_json::Value>().await?;
            Ok(DocumentSnapshot::from_json(body)?)
        } else if status == StatusCode::NOT_FOUND {
            Err(RemoteDocsError::NotFound(file_key.to_string()))
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(RemoteDocsError::UnexpectedStatus { status, body })
        }
    }
}

#[async_trait]
impl DocumentSource for RemoteDocsClient {
    async fn fetch(&self, file_key: &str) -> Result<DocumentSnapshot, RemoteDocsError> {
        self.get_file(file_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_ignores_trailing_slash() {
        let client = RemoteDocsClient::new("https://docs.example/v1/", "token");
        assert_eq!(
            client.file_url("ABC123"),
            "https://docs.example/v1/files/ABC123"
        );
    }
}
