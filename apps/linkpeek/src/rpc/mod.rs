//! Request/response RPC over a [`Channel`].
//!
//! One [`RpcEndpoint`] lives in each context. Outbound calls are matched to
//! responses purely by correlation id, so any number may be in flight and
//! responses may arrive in any order. Inbound requests are dispatched against
//! the local [`CapabilityTable`]; every request gets a response, including
//! requests for unknown methods and requests whose handler fails.
//! Requests run concurrently; notifications run one at a time in the order
//! they arrived.

pub mod capability;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_channel::{Channel, ChannelError};
use bridge_proto::{
    decode_message, encode_message, CorrelationId, ErrorPayload, Message, Outcome, ProtoError,
    ERROR_HANDLER, ERROR_INVALID_PARAMS, ERROR_METHOD_NOT_FOUND,
};
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub use capability::{bind, params, reply, Capability, CapabilityFuture, CapabilityTable};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("method '{0}' not found")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("remote error {}: {}", .0.code, .0.message)]
    Remote(ErrorPayload),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Codec(#[from] ProtoError),
    #[error("call abandoned before a response arrived")]
    Abandoned,
}

impl RpcError {
    pub fn handler(err: impl std::fmt::Display) -> Self {
        RpcError::Handler(err.to_string())
    }

    /// Error payload sent back to the caller.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            RpcError::MethodNotFound(method) => ErrorPayload::method_not_found(method),
            RpcError::InvalidParams(message) => ErrorPayload::invalid_params(message.clone()),
            RpcError::Remote(payload) => payload.clone(),
            other => ErrorPayload::handler(other.to_string()),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::MethodNotFound(_) => Some(ERROR_METHOD_NOT_FOUND),
            RpcError::InvalidParams(_) => Some(ERROR_INVALID_PARAMS),
            RpcError::Handler(_) => Some(ERROR_HANDLER),
            RpcError::Remote(payload) => Some(payload.code),
            _ => None,
        }
    }
}

type Waiter = oneshot::Sender<Result<Value, RpcError>>;

struct EndpointInner {
    label: &'static str,
    channel: Arc<dyn Channel>,
    pending: Mutex<HashMap<CorrelationId, Waiter>>,
    next_id: AtomicU64,
}

impl EndpointInner {
    fn post(&self, message: &Message) -> Result<(), RpcError> {
        let bytes: Bytes = encode_message(message)?;
        self.channel.send(bytes)?;
        Ok(())
    }

    fn resolve(&self, id: CorrelationId, outcome: Outcome) {
        let Some(waiter) = self.pending.lock().remove(&id) else {
            debug!(
                target: "linkpeek::rpc",
                endpoint = self.label,
                id = %id,
                "dropping response for unknown or abandoned call"
            );
            return;
        };
        let result = match outcome {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(payload) => Err(RpcError::Remote(payload)),
        };
        let _ = waiter.send(result);
    }
}

/// Removes a call's waiter if the caller stops waiting before the response.
struct PendingGuard<'a> {
    inner: &'a EndpointInner,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.id);
    }
}

#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<EndpointInner>,
}

impl RpcEndpoint {
    pub fn new(label: &'static str, channel: Arc<dyn Channel>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                label,
                channel,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Takes the channel's inbound side and starts dispatching against
    /// `capabilities`. The returned task ends when the peer goes away.
    pub fn serve(&self, capabilities: CapabilityTable) -> Result<JoinHandle<()>, RpcError> {
        let inbound = self.inner.channel.subscribe()?;
        let inner = Arc::clone(&self.inner);
        debug!(
            target: "linkpeek::rpc",
            endpoint = inner.label,
            table = capabilities.label(),
            methods = ?capabilities.methods(),
            "serving capabilities"
        );
        Ok(tokio::spawn(dispatch_loop(
            inner,
            Arc::new(capabilities),
            inbound,
        )))
    }

    /// Invoke `method` on the peer. Never times out on its own: a call to a
    /// peer that went away stays pending until the caller drops the future.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, RpcError> {
        let id = CorrelationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        trace!(
            target: "linkpeek::rpc",
            endpoint = self.inner.label,
            id = %id,
            method,
            "sending request"
        );
        self.inner.post(&Message::request(id, method, args))?;

        rx.await.unwrap_or(Err(RpcError::Abandoned))
    }

    pub async fn call_typed<A, R>(&self, method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let args =
            serde_json::to_value(args).map_err(|err| RpcError::InvalidParams(err.to_string()))?;
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|err| RpcError::InvalidResponse(err.to_string()))
    }

    /// Fire-and-forget push; the peer never answers.
    pub fn notify(&self, method: &str, args: Value) -> Result<(), RpcError> {
        trace!(
            target: "linkpeek::rpc",
            endpoint = self.inner.label,
            method,
            "sending notification"
        );
        self.inner.post(&Message::notification(method, args))
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

async fn dispatch_loop(
    inner: Arc<EndpointInner>,
    capabilities: Arc<CapabilityTable>,
    mut inbound: mpsc::UnboundedReceiver<Bytes>,
) {
    // Notifications run one at a time on their own task, in arrival order.
    let (notifications, queued) = mpsc::unbounded_channel();
    let mut worker = AbortOnDrop(tokio::spawn(notification_worker(inner.label, queued)));

    while let Some(frame) = inbound.recv().await {
        let message = match decode_message(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: "linkpeek::rpc",
                    endpoint = inner.label,
                    error = %err,
                    "discarding undecodable frame"
                );
                continue;
            }
        };

        match message {
            Message::Response { id, outcome } => inner.resolve(id, outcome),
            Message::Request {
                id,
                method,
                payload,
            } => {
                let Some(handler) = capabilities.get(&method) else {
                    warn!(
                        target: "linkpeek::rpc",
                        endpoint = inner.label,
                        id = %id,
                        method = %method,
                        "request for unknown method"
                    );
                    let reply = Message::failure(id, ErrorPayload::method_not_found(&method));
                    if let Err(err) = inner.post(&reply) {
                        debug!(target: "linkpeek::rpc", error = %err, "failed to post response");
                    }
                    continue;
                };
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let reply = match run_handler(handler, payload).await {
                        Ok(value) => Message::success(id, value),
                        Err(err) => {
                            warn!(
                                target: "linkpeek::rpc",
                                endpoint = inner.label,
                                id = %id,
                                method = %method,
                                error = %err,
                                "capability failed"
                            );
                            Message::failure(id, err.to_payload())
                        }
                    };
                    if let Err(err) = inner.post(&reply) {
                        debug!(target: "linkpeek::rpc", error = %err, "failed to post response");
                    }
                });
            }
            Message::Notification { method, payload } => {
                let Some(handler) = capabilities.get(&method) else {
                    warn!(
                        target: "linkpeek::rpc",
                        endpoint = inner.label,
                        method = %method,
                        "notification for unknown method"
                    );
                    continue;
                };
                if notifications.send((method, handler, payload)).is_err() {
                    debug!(target: "linkpeek::rpc", endpoint = inner.label, "notification worker gone");
                }
            }
        }
    }

    debug!(
        target: "linkpeek::rpc",
        endpoint = inner.label,
        pending = inner.pending.lock().len(),
        "inbound channel closed"
    );
    drop(notifications);
    let _ = (&mut worker.0).await;
}

type QueuedNotification = (String, Arc<dyn Capability>, Value);

async fn notification_worker(
    label: &'static str,
    mut queued: mpsc::UnboundedReceiver<QueuedNotification>,
) {
    while let Some((method, handler, payload)) = queued.recv().await {
        if let Err(err) = run_handler(handler, payload).await {
            warn!(
                target: "linkpeek::rpc",
                endpoint = label,
                method = %method,
                error = %err,
                "notification handler failed"
            );
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_handler(handler: Arc<dyn Capability>, payload: Value) -> Result<Value, RpcError> {
    match AssertUnwindSafe(handler.invoke(payload)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Handler("capability panicked".into())),
    }
}
