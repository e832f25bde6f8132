//! The core context: sole owner of the document model.
//!
//! [`CoreContext::attach`] wires a [`DocumentHost`] to a channel. It serves
//! the core capability table and forwards host events to the surface as
//! notifications.

mod document;
pub mod session;

use std::sync::Arc;

use bridge_channel::Channel;
use bridge_proto::NodeId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WindowBounds;
use crate::methods::{
    self, CreateRectanglesArgs, NotifyArgs, PlaceSvgArgs, RelaunchArgs, RelaunchReply,
    SetStorageArgs, WindowSize,
};
use crate::rpc::{bind, params, reply, CapabilityTable, RpcEndpoint, RpcError};
use crate::walker;

pub use document::{
    DocumentHost, HostError, HostEvent, InMemoryDocumentHost, Placement, RelaunchData, Rgb,
};
pub use session::{RelaunchOutcome, SessionStore, NO_ACTIVE_PAGE_MESSAGE, RELAUNCH_KEY};

/// State every core capability handler closes over.
#[derive(Clone)]
struct CoreState {
    host: Arc<dyn DocumentHost>,
    session: SessionStore,
    bounds: WindowBounds,
    last_selection: Arc<Mutex<Vec<NodeId>>>,
}

pub struct CoreContext {
    endpoint: RpcEndpoint,
    last_selection: Arc<Mutex<Vec<NodeId>>>,
    dispatch: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl CoreContext {
    pub fn attach(
        host: Arc<dyn DocumentHost>,
        channel: Arc<dyn Channel>,
        bounds: WindowBounds,
    ) -> Result<Self, RpcError> {
        let endpoint = RpcEndpoint::new("core", channel);
        let last_selection = Arc::new(Mutex::new(Vec::new()));
        let state = CoreState {
            host: Arc::clone(&host),
            session: SessionStore::new(Arc::clone(&host)),
            bounds,
            last_selection: Arc::clone(&last_selection),
        };

        // Subscribe before serving so no event after attach is missed.
        let events = host.subscribe_events();
        let dispatch = endpoint.serve(capabilities(state))?;
        let pump = tokio::spawn(event_pump(events, endpoint.clone()));
        info!(target: "linkpeek::core", "core context attached");

        Ok(Self {
            endpoint,
            last_selection,
            dispatch,
            pump,
        })
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// The subtree ids most recently returned by `getSelections`.
    pub fn last_selection(&self) -> Vec<NodeId> {
        self.last_selection.lock().clone()
    }

    /// Stop serving and stop forwarding events. The host keeps its state.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for CoreContext {
    fn drop(&mut self) {
        self.dispatch.abort();
        self.pump.abort();
    }
}

fn capabilities(state: CoreState) -> CapabilityTable {
    CapabilityTable::new("core")
        .with(methods::GET_COMMAND, bind(state.clone(), get_command))
        .with(methods::SET_STORAGE, bind(state.clone(), set_storage))
        .with(methods::SET_WINDOW_SIZE, bind(state.clone(), set_window_size))
        .with(methods::NOTIFY, bind(state.clone(), notify))
        .with(methods::PLACE_SVG, bind(state.clone(), place_svg))
        .with(methods::ADD_RELAUNCH, bind(state.clone(), add_relaunch))
        .with(methods::GET_RELAUNCH, bind(state.clone(), get_relaunch))
        .with(methods::GET_SELECTIONS, bind(state.clone(), get_selections))
        .with(methods::CREATE_RECTANGLES, bind(state, create_rectangles))
}

async fn get_command(state: CoreState, _args: Value) -> Result<Value, RpcError> {
    reply(&state.host.command().await)
}

async fn set_storage(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let SetStorageArgs { key, value } = params(args)?;
    state
        .host
        .set_client_storage(&key, &value)
        .await
        .map_err(RpcError::handler)?;
    Ok(Value::Null)
}

async fn set_window_size(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let requested: WindowSize = params(args)?;
    let size = state.bounds.clamp(requested);
    if size != requested {
        debug!(
            target: "linkpeek::core",
            ?requested,
            ?size,
            "window size clamped"
        );
    }
    state.host.resize_window(size).await;
    Ok(Value::Null)
}

async fn notify(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let NotifyArgs { message } = params(args)?;
    state.host.notify(&message).await;
    Ok(Value::Null)
}

async fn place_svg(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let PlaceSvgArgs { svg } = params(args)?;
    match state.host.import_svg(&svg).await {
        Ok(id) => debug!(target: "linkpeek::core", node = %id, "svg placed"),
        Err(err) => warn!(target: "linkpeek::core", error = %err, "svg not placed"),
    }
    Ok(Value::Null)
}

async fn add_relaunch(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let RelaunchArgs { file_key } = params(args)?;
    let outcome = state
        .session
        .add_relaunch(&file_key)
        .await
        .map_err(RpcError::handler)?;
    reply(&RelaunchReply {
        persisted: outcome == RelaunchOutcome::Persisted,
    })
}

async fn get_relaunch(state: CoreState, _args: Value) -> Result<Value, RpcError> {
    reply(&state.session.get_relaunch().await)
}

async fn get_selections(state: CoreState, _args: Value) -> Result<Value, RpcError> {
    let selected = state.host.selection().await;
    let ids = selected
        .first()
        .map(walker::collect_subtree_ids)
        .unwrap_or_default();
    *state.last_selection.lock() = ids.clone();
    reply(&ids)
}

async fn create_rectangles(state: CoreState, args: Value) -> Result<Value, RpcError> {
    let CreateRectanglesArgs { count } = params(args)?;
    if count > methods::MAX_RECTANGLES {
        return Err(RpcError::InvalidParams(format!(
            "count {count} exceeds the limit of {}",
            methods::MAX_RECTANGLES
        )));
    }
    let ids = state
        .host
        .create_rectangles(count)
        .await
        .map_err(RpcError::handler)?;
    reply(&ids)
}

async fn event_pump(mut events: broadcast::Receiver<HostEvent>, endpoint: RpcEndpoint) {
    loop {
        let (method, args) = match events.recv().await {
            Ok(HostEvent::SelectionChanged(ids)) => {
                (methods::SELECTION_CHANGED, serde_json::to_value(&ids))
            }
            Ok(HostEvent::PageChanged(page)) => (methods::PAGE_CHANGED, serde_json::to_value(&page)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "linkpeek::core", skipped, "host events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let args = match args {
            Ok(args) => args,
            Err(err) => {
                warn!(target: "linkpeek::core", method, error = %err, "unencodable host event");
                continue;
            }
        };
        if let Err(err) = endpoint.notify(method, args) {
            debug!(target: "linkpeek::core", error = %err, "event forwarding stopped");
            break;
        }
    }
}
