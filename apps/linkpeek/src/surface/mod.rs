//! The surface context: everything the preview panel does, minus pixels.
//!
//! [`SurfaceApp`] talks to the core only through [`CoreClient`] and exposes
//! its own capabilities (`selectionChanged`, `pageChanged`) through a table
//! bound to the app instance. Observable state is published on a
//! `tokio::sync::watch` channel as a [`SurfaceView`].

mod client;
pub mod locator;
pub mod selection;

use std::sync::{Arc, Weak};

use bridge_channel::Channel;
use bridge_proto::{DocumentSnapshot, Link, NodeId, PageSnapshot};
use parking_lot::Mutex;
use remote_docs::DocumentSource;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, WindowLayout};
use crate::methods;
use crate::rpc::{bind, params, CapabilityTable, RpcEndpoint, RpcError};
use crate::walker;

pub use client::CoreClient;
pub use locator::parse_file_key;
pub use selection::{Resolution, SelectionResolver, Ticket};

pub const INVALID_LOCATOR_MESSAGE: &str = "Please input valid file URL";
pub const FILE_NOT_FOUND_MESSAGE: &str = "File not found";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    Home,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { file_key: String, links: usize },
    InvalidLocator,
    NotFound,
    /// A newer load started before this one finished.
    Superseded,
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("surface detached")]
    Detached,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceView {
    pub route: Route,
    pub loading: bool,
    pub file_key: Option<String>,
    pub links: Vec<Link>,
    pub resolution: Resolution,
    pub current_url: Option<String>,
    pub desktop: bool,
    pub page: Option<PageSnapshot>,
}

#[derive(Default)]
struct LoadState {
    generation: u64,
    requested: Option<String>,
    loaded: Option<String>,
    /// Links of `loaded`; the view mirrors this.
    links: Vec<Link>,
    /// The session must record `requested` once it lands.
    persist: bool,
}

pub struct SurfaceApp {
    core: CoreClient,
    docs: Arc<dyn DocumentSource>,
    layout: WindowLayout,
    loads: Mutex<LoadState>,
    /// Latest load generation that finished, landed or not.
    loads_done: watch::Sender<u64>,
    resolver: Mutex<SelectionResolver>,
    view: watch::Sender<SurfaceView>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceApp {
    pub fn attach(
        channel: Arc<dyn Channel>,
        docs: Arc<dyn DocumentSource>,
        config: &BridgeConfig,
    ) -> Result<Arc<Self>, RpcError> {
        let endpoint = RpcEndpoint::new("surface", channel);
        let (view, _) = watch::channel(SurfaceView::default());
        let app = Arc::new(Self {
            core: CoreClient::new(endpoint.clone(), config.bounds),
            docs,
            layout: config.layout,
            loads: Mutex::new(LoadState::default()),
            loads_done: watch::channel(0).0,
            resolver: Mutex::new(SelectionResolver::default()),
            view,
            dispatch: Mutex::new(None),
        });
        let dispatch = endpoint.serve(capabilities(Arc::downgrade(&app)))?;
        *app.dispatch.lock() = Some(dispatch);
        info!(target: "linkpeek::surface", "surface context attached");
        Ok(app)
    }

    pub fn core(&self) -> &CoreClient {
        &self.core
    }

    pub fn view(&self) -> SurfaceView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SurfaceView> {
        self.view.subscribe()
    }

    /// Stop serving surface capabilities. The core keeps its state.
    pub fn detach(&self) {
        if let Some(dispatch) = self.dispatch.lock().take() {
            dispatch.abort();
        }
    }

    /// Handle a pasted share url.
    pub async fn submit_locator(&self, locator: &str) -> Result<LoadOutcome, SurfaceError> {
        let Some(file_key) = parse_file_key(locator) else {
            info!(target: "linkpeek::surface", locator, "rejected locator");
            self.core.notify(INVALID_LOCATOR_MESSAGE).await?;
            return Ok(LoadOutcome::InvalidLocator);
        };
        self.load(file_key, true).await
    }

    /// Fetch `file_key` and rebuild the link list from it.
    pub async fn load_file(&self, file_key: &str) -> Result<LoadOutcome, SurfaceError> {
        self.load(file_key.to_string(), false).await
    }

    /// Reopen the file recorded on the document, if any.
    pub async fn restore_session(&self) -> Result<Option<LoadOutcome>, SurfaceError> {
        match self.core.get_relaunch().await? {
            Some(file_key) => {
                debug!(target: "linkpeek::surface", %file_key, "restoring session");
                Ok(Some(self.load(file_key, true).await?))
            }
            None => Ok(None),
        }
    }

    /// Load the current file again. `None` when nothing is loaded yet.
    pub async fn reload(&self) -> Result<Option<LoadOutcome>, SurfaceError> {
        let loaded = self.loads.lock().loaded.clone();
        match loaded {
            Some(file_key) => Ok(Some(self.load(file_key, false).await?)),
            None => Ok(None),
        }
    }

    /// Switch between the compact and desktop frame. Returns the new mode.
    pub async fn toggle_desktop(&self) -> Result<bool, SurfaceError> {
        let mut desktop = false;
        self.view.send_modify(|view| {
            view.desktop = !view.desktop;
            desktop = view.desktop;
        });
        let size = if desktop {
            self.layout.desktop()
        } else {
            self.layout.compact()
        };
        self.core.set_window_size(size).await?;
        Ok(desktop)
    }

    /// The user typed a url into the preview bar.
    pub fn enter_url(&self, url: &str) -> Resolution {
        let resolution = self.resolver.lock().enter_url(url).clone();
        self.publish_resolution(&resolution);
        resolution
    }

    /// React to a `selectionChanged` push. Returns the resolution applied,
    /// or `None` when a newer change overtook this one.
    ///
    /// The pass never resolves against a link list older than the requested
    /// file: pending loads land first, either ours or one already running.
    pub async fn on_selection_changed(
        &self,
        selected: Vec<NodeId>,
    ) -> Result<Option<Resolution>, SurfaceError> {
        debug!(
            target: "linkpeek::surface",
            selected = selected.len(),
            "selection changed"
        );
        let ticket = self.resolver.lock().begin();
        let (links, selection) = loop {
            self.catch_up().await?;
            let selection = self.core.get_selections().await?;
            let loads = self.loads.lock();
            if loads.requested == loads.loaded {
                break (loads.links.clone(), selection);
            }
        };

        let resolution = self
            .resolver
            .lock()
            .complete(ticket, &links, &selection)
            .cloned();
        match &resolution {
            Some(resolution) => self.publish_resolution(resolution),
            None => debug!(target: "linkpeek::surface", "discarding stale resolution"),
        }
        Ok(resolution)
    }

    /// Wait until no selection pass is outstanding and return its result.
    pub async fn settled(&self) -> Resolution {
        let mut views = self.view.subscribe();
        loop {
            {
                let resolver = self.resolver.lock();
                if !resolver.is_pending() {
                    return resolver.resolution().clone();
                }
            }
            // Every completed pass publishes, so a wakeup always follows.
            if views.changed().await.is_err() {
                return self.resolver.lock().resolution().clone();
            }
        }
    }

    pub fn on_page_changed(&self, page: PageSnapshot) {
        debug!(target: "linkpeek::surface", page = %page.id, "page changed");
        self.view.send_modify(|view| view.page = Some(page));
    }

    /// Return once the loaded file is the requested one. A load already in
    /// flight is waited for; otherwise the requested key is reloaded here.
    async fn catch_up(&self) -> Result<(), SurfaceError> {
        loop {
            let (pending, generation) = {
                let loads = self.loads.lock();
                let pending = loads
                    .requested
                    .clone()
                    .filter(|requested| loads.loaded.as_ref() != Some(requested));
                (pending, loads.generation)
            };
            let Some(file_key) = pending else {
                return Ok(());
            };

            if *self.loads_done.borrow() < generation {
                debug!(target: "linkpeek::surface", %file_key, "waiting for in-flight load");
                let mut done = self.loads_done.subscribe();
                if done.wait_for(|done| *done >= generation).await.is_err() {
                    return Err(SurfaceError::Detached);
                }
            } else {
                debug!(
                    target: "linkpeek::surface",
                    %file_key,
                    "reloading before resolving selection"
                );
                self.load(file_key, false).await?;
            }
        }
    }

    async fn load(&self, file_key: String, persist: bool) -> Result<LoadOutcome, SurfaceError> {
        let generation = {
            let mut loads = self.loads.lock();
            loads.generation += 1;
            if loads.requested.as_ref() != Some(&file_key) {
                loads.persist = false;
            }
            loads.persist |= persist;
            loads.requested = Some(file_key.clone());
            loads.generation
        };
        let _in_flight = InFlight {
            app: self,
            generation,
        };
        self.view.send_modify(|view| view.loading = true);

        let snapshot = match self.docs.fetch(&file_key).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if !self.abandon(generation) {
                    debug!(target: "linkpeek::surface", %file_key, "load superseded");
                    return Ok(LoadOutcome::Superseded);
                }
                warn!(
                    target: "linkpeek::surface",
                    %file_key,
                    error = %err,
                    "failed to load file"
                );
                self.core.notify(FILE_NOT_FOUND_MESSAGE).await?;
                return Ok(LoadOutcome::NotFound);
            }
        };

        let Some((links, persist)) = self.commit(generation, &file_key, &snapshot) else {
            debug!(target: "linkpeek::surface", %file_key, "load superseded");
            return Ok(LoadOutcome::Superseded);
        };
        info!(target: "linkpeek::surface", %file_key, links, "file loaded");

        if persist {
            self.core.add_relaunch(&file_key).await?;
        }
        self.core.set_window_size(self.layout.compact()).await?;
        Ok(LoadOutcome::Loaded { file_key, links })
    }

    /// Install `snapshot` as the loaded file unless a newer load started.
    /// Returns the link count and whether the session still needs writing.
    fn commit(
        &self,
        generation: u64,
        file_key: &str,
        snapshot: &DocumentSnapshot,
    ) -> Option<(usize, bool)> {
        let links = walker::extract_links(&snapshot.document);
        let count = links.len();
        let persist = {
            let mut loads = self.loads.lock();
            if loads.generation != generation {
                return None;
            }
            loads.loaded = Some(file_key.to_string());
            loads.links = links.clone();
            std::mem::take(&mut loads.persist)
        };
        self.resolver.lock().reset();
        self.view.send_modify(|view| {
            view.route = Route::Preview;
            view.loading = false;
            view.file_key = Some(file_key.to_string());
            view.links = links;
            view.resolution = Resolution::NoSelection;
            view.current_url = None;
            view.desktop = false;
        });
        self.finish(generation);
        Some((count, persist))
    }

    /// Give up on the load `generation`, keeping the loaded file. Returns
    /// `false` when a newer load already took over.
    fn abandon(&self, generation: u64) -> bool {
        {
            let mut loads = self.loads.lock();
            if loads.generation != generation {
                return false;
            }
            loads.requested = loads.loaded.clone();
            loads.persist = false;
        }
        self.view
            .send_if_modified(|view| std::mem::replace(&mut view.loading, false));
        self.finish(generation);
        true
    }

    fn finish(&self, generation: u64) {
        self.loads_done.send_if_modified(|done| {
            let advanced = generation > *done;
            if advanced {
                *done = generation;
            }
            advanced
        });
    }

    fn publish_resolution(&self, resolution: &Resolution) {
        self.view.send_modify(|view| {
            view.current_url = resolution.current_url().map(str::to_string);
            view.resolution = resolution.clone();
        });
    }
}

/// Releases waiters when a load future is dropped before it finishes.
struct InFlight<'a> {
    app: &'a SurfaceApp,
    generation: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.app.abandon(self.generation);
    }
}

impl Drop for SurfaceApp {
    fn drop(&mut self) {
        self.detach();
    }
}

fn capabilities(app: Weak<SurfaceApp>) -> CapabilityTable {
    CapabilityTable::new("surface")
        .with(methods::SELECTION_CHANGED, bind(app.clone(), selection_changed))
        .with(methods::PAGE_CHANGED, bind(app, page_changed))
}

fn upgrade(app: &Weak<SurfaceApp>) -> Result<Arc<SurfaceApp>, RpcError> {
    app.upgrade()
        .ok_or_else(|| RpcError::handler(SurfaceError::Detached))
}

async fn selection_changed(app: Weak<SurfaceApp>, args: Value) -> Result<Value, RpcError> {
    let selected: Vec<NodeId> = params(args)?;
    let app = upgrade(&app)?;
    app.on_selection_changed(selected)
        .await
        .map_err(RpcError::handler)?;
    Ok(Value::Null)
}

async fn page_changed(app: Weak<SurfaceApp>, args: Value) -> Result<Value, RpcError> {
    let page: PageSnapshot = params(args)?;
    upgrade(&app)?.on_page_changed(page);
    Ok(Value::Null)
}
