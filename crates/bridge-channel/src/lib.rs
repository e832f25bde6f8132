//! Duplex message channel between the core and surface contexts.
//!
//! Each end can post frames to its peer and hand out exactly one inbound
//! receiver. Frames are delivered in send order; there is no acknowledgement,
//! retry or duplicate suppression at this layer.

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("channel receiver already taken")]
    AlreadySubscribed,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

pub trait Channel: Send + Sync {
    /// Enqueue one frame for the peer. Frames sent after the peer went away
    /// are dropped without error.
    fn send(&self, payload: Bytes) -> ChannelResult<()>;

    /// Take the inbound side. Only the first caller gets a receiver.
    fn subscribe(&self) -> ChannelResult<mpsc::UnboundedReceiver<Bytes>>;
}

/// In-process channel end backed by unbounded tokio queues.
#[derive(Debug)]
pub struct LocalChannel {
    label: &'static str,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl LocalChannel {
    /// Two connected ends: whatever `core` sends, `surface` receives, and the
    /// other way around.
    pub fn pair() -> (LocalChannel, LocalChannel) {
        let (core_tx, surface_rx) = mpsc::unbounded_channel();
        let (surface_tx, core_rx) = mpsc::unbounded_channel();
        (
            LocalChannel::new("core", core_tx, core_rx),
            LocalChannel::new("surface", surface_tx, surface_rx),
        )
    }

    fn new(
        label: &'static str,
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> Self {
        Self {
            label,
            outbound: Mutex::new(Some(outbound)),
            inbound: Mutex::new(Some(inbound)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Tear this end down. The peer's receiver ends once queued frames drain.
    pub fn close(&self) {
        self.outbound.lock().take();
        self.inbound.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}

impl Channel for LocalChannel {
    fn send(&self, payload: Bytes) -> ChannelResult<()> {
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or(ChannelError::Closed)?;
        if sender.send(payload).is_err() {
            debug!(
                target: "bridge::channel",
                channel = self.label,
                "peer gone; dropping frame"
            );
        }
        Ok(())
    }

    fn subscribe(&self) -> ChannelResult<mpsc::UnboundedReceiver<Bytes>> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.inbound.lock().take().ok_or(ChannelError::AlreadySubscribed)
    }
}
