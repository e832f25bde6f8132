//! The "last opened file" record, kept on the document root so it outlives
//! the surface.

use std::sync::Arc;

use tracing::{debug, info};

use super::document::{DocumentHost, HostError, RelaunchData};

pub const RELAUNCH_KEY: &str = "linkpeek.fileKey";
pub const NO_ACTIVE_PAGE_MESSAGE: &str = "No active page";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchOutcome {
    Persisted,
    /// Nothing was written; the user was told there is no page.
    NoActivePage,
}

#[derive(Clone)]
pub struct SessionStore {
    host: Arc<dyn DocumentHost>,
}

impl SessionStore {
    pub fn new(host: Arc<dyn DocumentHost>) -> Self {
        Self { host }
    }

    pub async fn add_relaunch(&self, file_key: &str) -> Result<RelaunchOutcome, HostError> {
        match self.host.set_relaunch_data(RelaunchData::open()).await {
            Ok(()) => {}
            Err(HostError::NoActivePage) => {
                info!(
                    target: "linkpeek::core",
                    file_key, "no active page; session not persisted"
                );
                self.host.notify(NO_ACTIVE_PAGE_MESSAGE).await;
                return Ok(RelaunchOutcome::NoActivePage);
            }
            Err(err) => return Err(err),
        }
        self.host.set_root_data(RELAUNCH_KEY, file_key).await;
        debug!(target: "linkpeek::core", file_key, "session persisted");
        Ok(RelaunchOutcome::Persisted)
    }

    pub async fn get_relaunch(&self) -> Option<String> {
        self.host
            .root_data(RELAUNCH_KEY)
            .await
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryDocumentHost;
    use bridge_proto::{Node, NodeId};

    #[tokio::test]
    async fn round_trips_the_exact_key() {
        let host = InMemoryDocumentHost::new("open");
        host.add_page(Node::new("page"));
        let session = SessionStore::new(host.clone());

        assert_eq!(session.get_relaunch().await, None);
        let key = "AbC-123_ü";
        assert_eq!(
            session.add_relaunch(key).await.unwrap(),
            RelaunchOutcome::Persisted
        );
        assert_eq!(session.get_relaunch().await.as_deref(), Some(key));
        assert_eq!(
            host.page_relaunch(&NodeId::from("page")),
            Some(RelaunchData::open())
        );
    }

    #[tokio::test]
    async fn no_page_is_a_soft_failure() {
        let host = InMemoryDocumentHost::new("open");
        let session = SessionStore::new(host.clone());

        assert_eq!(
            session.add_relaunch("ABC123").await.unwrap(),
            RelaunchOutcome::NoActivePage
        );
        assert_eq!(host.notifications(), vec![NO_ACTIVE_PAGE_MESSAGE]);
        assert_eq!(session.get_relaunch().await, None);
    }

    #[tokio::test]
    async fn empty_key_reads_as_none() {
        let host = InMemoryDocumentHost::new("open");
        host.set_root_data(RELAUNCH_KEY, "").await;
        assert_eq!(SessionStore::new(host).get_relaunch().await, None);
    }
}
