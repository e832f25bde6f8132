use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_proto::DocumentSnapshot;
use tokio::sync::Mutex;

use crate::{DocumentSource, RemoteDocsError};

/// In-memory source for tests and offline runs.
#[derive(Default)]
pub struct InMemoryDocumentSource {
    files: Mutex<HashMap<String, DocumentSnapshot>>,
    fetches: Mutex<Vec<String>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, file_key: impl Into<String>, snapshot: DocumentSnapshot) {
        self.files.lock().await.insert(file_key.into(), snapshot);
    }

    /// Every key passed to `fetch`, in call order.
    pub async fn fetch_log(&self) -> Vec<String> {
        self.fetches.lock().await.clone()
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch(&self, file_key: &str) -> Result<DocumentSnapshot, RemoteDocsError> {
        self.fetches.lock().await.push(file_key.to_string());
        self.files
            .lock()
            .await
            .get(file_key)
            .cloned()
            .ok_or_else(|| RemoteDocsError::NotFound(file_key.to_string()))
    }
}
