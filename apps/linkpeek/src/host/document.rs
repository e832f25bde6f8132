//! The document model boundary of the core context.
//!
//! [`DocumentHost`] is everything the core needs from the application that
//! owns the live document. [`InMemoryDocumentHost`] is a complete in-process
//! model used by the CLI and tests; its `pub` driver methods stand in for the
//! user clicking around in the editor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_proto::{DocumentSnapshot, Node, NodeId, PageSnapshot};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::methods::WindowSize;

const EVENT_CAPACITY: usize = 64;
const RECTANGLE_SPACING: f64 = 150.0;
const ORANGE: Rgb = Rgb {
    r: 1.0,
    g: 0.5,
    b: 0.0,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("import failed: invalid SVG")]
    InvalidSvg,
    #[error("no active page")]
    NoActivePage,
    #[error("client storage unavailable: {0}")]
    Storage(String),
}

/// Changes the core forwards to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    SelectionChanged(Vec<NodeId>),
    PageChanged(PageSnapshot),
}

/// Marks a page so the host offers to reopen the plugin from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchData {
    pub command: String,
    pub description: String,
}

impl RelaunchData {
    pub fn open() -> Self {
        Self {
            command: "open".into(),
            description: "Reopen the linked file preview".into(),
        }
    }
}

#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// The command the plugin was launched with.
    async fn command(&self) -> String;
    async fn set_client_storage(&self, key: &str, value: &str) -> Result<(), HostError>;
    async fn resize_window(&self, size: WindowSize);
    /// Transient toast-style notification.
    async fn notify(&self, message: &str);
    async fn current_page(&self) -> Option<PageSnapshot>;
    /// Selected nodes on the current page, in selection order.
    async fn selection(&self) -> Vec<Node>;
    /// Create a node from SVG markup and append it to the current page.
    async fn import_svg(&self, svg: &str) -> Result<NodeId, HostError>;
    async fn create_rectangles(&self, count: usize) -> Result<Vec<NodeId>, HostError>;
    /// Plugin data stored on the document root.
    async fn root_data(&self, key: &str) -> Option<String>;
    async fn set_root_data(&self, key: &str, value: &str);
    /// Relaunch data on the current page.
    async fn set_relaunch_data(&self, data: RelaunchData) -> Result<(), HostError>;
    fn subscribe_events(&self) -> broadcast::Receiver<HostEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// Position and fill of a node created by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub fill: Option<Rgb>,
}

#[derive(Default)]
struct HostState {
    command: String,
    pages: Vec<Node>,
    current: Option<usize>,
    selection: Vec<NodeId>,
    root_data: HashMap<String, String>,
    client_storage: HashMap<String, String>,
    notifications: Vec<String>,
    window: Option<WindowSize>,
    relaunch: HashMap<NodeId, RelaunchData>,
    geometry: HashMap<NodeId, Placement>,
    viewport: Vec<NodeId>,
    next_node: u64,
}

impl HostState {
    fn current_page_mut(&mut self) -> Result<&mut Node, HostError> {
        let index = self.current.ok_or(HostError::NoActivePage)?;
        self.pages.get_mut(index).ok_or(HostError::NoActivePage)
    }

    fn current_page(&self) -> Option<&Node> {
        self.current.and_then(|index| self.pages.get(index))
    }

    fn allocate_id(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId::new(format!("local:{}", self.next_node))
    }
}

fn page_snapshot(page: &Node) -> PageSnapshot {
    PageSnapshot {
        id: page.id.clone(),
        name: page.name.clone().unwrap_or_default(),
    }
}

/// Shallow markup check: an optional XML declaration followed by a single
/// `<svg>` element.
fn looks_like_svg(markup: &str) -> bool {
    let mut body = markup.trim();
    if body.starts_with("<?xml") {
        match body.find("?>") {
            Some(end) => body = body[end + 2..].trim_start(),
            None => return false,
        }
    }
    body.starts_with("<svg") && (body.ends_with("</svg>") || body.ends_with("/>"))
}

pub struct InMemoryDocumentHost {
    state: RwLock<HostState>,
    events: broadcast::Sender<HostEvent>,
}

impl InMemoryDocumentHost {
    pub fn new(command: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(HostState {
                command: command.into(),
                ..HostState::default()
            }),
            events,
        })
    }

    fn emit(&self, event: HostEvent) {
        // No subscribers just means no core is attached right now.
        let _ = self.events.send(event);
    }

    /// Append a page. The first page added becomes current.
    pub fn add_page(&self, page: Node) {
        let mut state = self.state.write();
        state.pages.push(page);
        if state.current.is_none() {
            state.current = Some(0);
        }
    }

    /// Switch pages, clearing the selection. Returns false for unknown ids.
    pub fn set_current_page(&self, id: &NodeId) -> bool {
        let snapshot = {
            let mut state = self.state.write();
            let Some(index) = state.pages.iter().position(|page| &page.id == id) else {
                return false;
            };
            state.current = Some(index);
            state.selection.clear();
            page_snapshot(&state.pages[index])
        };
        self.emit(HostEvent::PageChanged(snapshot));
        true
    }

    /// Leave the editor without a current page.
    pub fn clear_current_page(&self) {
        let mut state = self.state.write();
        state.current = None;
        state.selection.clear();
    }

    /// Replace the selection and announce it.
    pub fn select<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        let ids: Vec<NodeId> = ids.into_iter().map(Into::into).collect();
        self.state.write().selection = ids.clone();
        self.emit(HostEvent::SelectionChanged(ids));
    }

    /// Replace every page with the top-level children of `snapshot`.
    pub fn load_document(&self, snapshot: &DocumentSnapshot) {
        let mut state = self.state.write();
        state.pages = snapshot.document.children().to_vec();
        state.current = if state.pages.is_empty() { None } else { Some(0) };
        state.selection.clear();
        debug!(
            target: "linkpeek::core",
            pages = state.pages.len(),
            "document loaded into host"
        );
    }

    pub fn notifications(&self) -> Vec<String> {
        self.state.read().notifications.clone()
    }

    pub fn window_size(&self) -> Option<WindowSize> {
        self.state.read().window
    }

    pub fn client_storage(&self, key: &str) -> Option<String> {
        self.state.read().client_storage.get(key).cloned()
    }

    pub fn page_relaunch(&self, page: &NodeId) -> Option<RelaunchData> {
        self.state.read().relaunch.get(page).cloned()
    }

    /// Direct children of the current page.
    pub fn page_nodes(&self) -> Vec<Node> {
        self.state
            .read()
            .current_page()
            .map(|page| page.children().to_vec())
            .unwrap_or_default()
    }

    pub fn geometry(&self, id: &NodeId) -> Option<Placement> {
        self.state.read().geometry.get(id).copied()
    }

    /// Nodes most recently scrolled into view.
    pub fn viewport(&self) -> Vec<NodeId> {
        self.state.read().viewport.clone()
    }
}

#[async_trait]
impl DocumentHost for InMemoryDocumentHost {
    async fn command(&self) -> String {
        self.state.read().command.clone()
    }

    async fn set_client_storage(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.state
            .write()
            .client_storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn resize_window(&self, size: WindowSize) {
        self.state.write().window = Some(size);
    }

    async fn notify(&self, message: &str) {
        self.state.write().notifications.push(message.to_string());
    }

    async fn current_page(&self) -> Option<PageSnapshot> {
        self.state.read().current_page().map(page_snapshot)
    }

    async fn selection(&self) -> Vec<Node> {
        let state = self.state.read();
        let Some(page) = state.current_page() else {
            return Vec::new();
        };
        state
            .selection
            .iter()
            .filter_map(|id| page.find(id).cloned())
            .collect()
    }

    async fn import_svg(&self, svg: &str) -> Result<NodeId, HostError> {
        if !looks_like_svg(svg) {
            return Err(HostError::InvalidSvg);
        }
        let mut state = self.state.write();
        state.current_page_mut()?;
        let id = state.allocate_id();
        state.geometry.insert(
            id.clone(),
            Placement {
                x: 0.0,
                y: 0.0,
                fill: None,
            },
        );
        let node = Node::new(id.clone()).with_kind("FRAME").with_name("Svg");
        state.current_page_mut()?.children.get_or_insert_with(Vec::new).push(node);
        Ok(id)
    }

    async fn create_rectangles(&self, count: usize) -> Result<Vec<NodeId>, HostError> {
        let mut state = self.state.write();
        state.current_page_mut()?;
        let mut created = Vec::with_capacity(count);
        for i in 0..count {
            let id = state.allocate_id();
            state.geometry.insert(
                id.clone(),
                Placement {
                    x: i as f64 * RECTANGLE_SPACING,
                    y: 0.0,
                    fill: Some(ORANGE),
                },
            );
            let node = Node::new(id.clone()).with_kind("RECTANGLE").with_name("Rectangle");
            state.current_page_mut()?.children.get_or_insert_with(Vec::new).push(node);
            created.push(id);
        }
        state.selection = created.clone();
        state.viewport = created.clone();
        drop(state);
        self.emit(HostEvent::SelectionChanged(created.clone()));
        Ok(created)
    }

    async fn root_data(&self, key: &str) -> Option<String> {
        self.state.read().root_data.get(key).cloned()
    }

    async fn set_root_data(&self, key: &str, value: &str) {
        self.state
            .write()
            .root_data
            .insert(key.to_string(), value.to_string());
    }

    async fn set_relaunch_data(&self, data: RelaunchData) -> Result<(), HostError> {
        let mut state = self.state.write();
        let page = state.current_page_mut()?.id.clone();
        state.relaunch.insert(page, data);
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_page() -> Arc<InMemoryDocumentHost> {
        let host = InMemoryDocumentHost::new("open");
        host.add_page(
            Node::new("page")
                .with_name("Page 1")
                .with_child(Node::new("n1").with_child(Node::new("n2"))),
        );
        host
    }

    #[test]
    fn svg_shape_check() {
        assert!(looks_like_svg("<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>"));
        assert!(looks_like_svg("<?xml version=\"1.0\"?>\n<svg/>"));
        assert!(!looks_like_svg("<div></div>"));
        assert!(!looks_like_svg("<?xml version=\"1.0\""));
        assert!(!looks_like_svg(""));
    }

    #[tokio::test]
    async fn selection_resolves_nodes_on_current_page() {
        let host = host_with_page();
        let mut events = host.subscribe_events();
        host.select(["n2", "missing", "n1"]);

        let selected: Vec<_> = host.selection().await.into_iter().map(|n| n.id).collect();
        assert_eq!(selected, vec![NodeId::from("n2"), NodeId::from("n1")]);
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::SelectionChanged(vec!["n2".into(), "missing".into(), "n1".into()])
        );
    }

    #[tokio::test]
    async fn page_switch_announces_and_clears_selection() {
        let host = host_with_page();
        host.add_page(Node::new("page2").with_name("Page 2"));
        host.select(["n1"]);
        let mut events = host.subscribe_events();

        assert!(host.set_current_page(&NodeId::from("page2")));
        assert!(!host.set_current_page(&NodeId::from("nope")));
        assert!(host.selection().await.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            HostEvent::PageChanged(PageSnapshot {
                id: "page2".into(),
                name: "Page 2".into()
            })
        );
    }

    #[tokio::test]
    async fn rectangles_are_spaced_filled_and_selected() {
        let host = host_with_page();
        let ids = host.create_rectangles(3).await.unwrap();
        assert_eq!(ids.len(), 3);

        let xs: Vec<f64> = ids.iter().map(|id| host.geometry(id).unwrap().x).collect();
        assert_eq!(xs, vec![0.0, 150.0, 300.0]);
        assert_eq!(host.geometry(&ids[2]).unwrap().fill, Some(ORANGE));
        assert_eq!(host.viewport(), ids);
        let selected: Vec<_> = host.selection().await.into_iter().map(|n| n.id).collect();
        assert_eq!(selected, ids);
        assert_eq!(host.page_nodes().len(), 4);
    }

    #[tokio::test]
    async fn page_scoped_operations_need_a_page() {
        let host = InMemoryDocumentHost::new("open");
        assert_eq!(host.current_page().await, None);
        assert_eq!(
            host.create_rectangles(1).await.unwrap_err(),
            HostError::NoActivePage
        );
        assert_eq!(
            host.set_relaunch_data(RelaunchData::open()).await.unwrap_err(),
            HostError::NoActivePage
        );
        assert_eq!(host.import_svg("<svg/>").await.unwrap_err(), HostError::NoActivePage);
        assert_eq!(host.import_svg("nope").await.unwrap_err(), HostError::InvalidSvg);
    }

    #[tokio::test]
    async fn loading_a_document_makes_pages() {
        let host = InMemoryDocumentHost::new("open");
        let snapshot = DocumentSnapshot::new(
            Node::new("0:0")
                .with_child(Node::new("0:1").with_name("Cover"))
                .with_child(Node::new("0:2").with_name("Flows")),
        );
        host.load_document(&snapshot);
        assert_eq!(
            host.current_page().await,
            Some(PageSnapshot {
                id: "0:1".into(),
                name: "Cover".into()
            })
        );
    }
}
