use bridge_proto::NodeId;

use crate::config::WindowBounds;
use crate::methods::{
    self, CreateRectanglesArgs, NotifyArgs, PlaceSvgArgs, RelaunchArgs, RelaunchReply,
    SetStorageArgs, WindowSize,
};
use crate::rpc::{RpcEndpoint, RpcError};

/// Typed stubs for the core capability table.
#[derive(Clone)]
pub struct CoreClient {
    endpoint: RpcEndpoint,
    bounds: WindowBounds,
}

impl CoreClient {
    pub fn new(endpoint: RpcEndpoint, bounds: WindowBounds) -> Self {
        Self { endpoint, bounds }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    pub async fn command(&self) -> Result<String, RpcError> {
        self.endpoint.call_typed(methods::GET_COMMAND, &()).await
    }

    pub async fn set_storage(&self, key: &str, value: &str) -> Result<(), RpcError> {
        let args = SetStorageArgs {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.endpoint.call_typed(methods::SET_STORAGE, &args).await
    }

    /// Requests are clamped to the configured bounds before they leave.
    pub async fn set_window_size(&self, size: WindowSize) -> Result<(), RpcError> {
        let size = self.bounds.clamp(size);
        self.endpoint.call_typed(methods::SET_WINDOW_SIZE, &size).await
    }

    pub async fn notify(&self, message: &str) -> Result<(), RpcError> {
        let args = NotifyArgs {
            message: message.to_string(),
        };
        self.endpoint.call_typed(methods::NOTIFY, &args).await
    }

    pub async fn place_svg(&self, svg: &str) -> Result<(), RpcError> {
        let args = PlaceSvgArgs {
            svg: svg.to_string(),
        };
        self.endpoint.call_typed(methods::PLACE_SVG, &args).await
    }

    /// Whether the session was written. `false` means the core had no page
    /// and told the user so.
    pub async fn add_relaunch(&self, file_key: &str) -> Result<bool, RpcError> {
        let args = RelaunchArgs {
            file_key: file_key.to_string(),
        };
        let reply: RelaunchReply = self.endpoint.call_typed(methods::ADD_RELAUNCH, &args).await?;
        Ok(reply.persisted)
    }

    pub async fn get_relaunch(&self) -> Result<Option<String>, RpcError> {
        self.endpoint.call_typed(methods::GET_RELAUNCH, &()).await
    }

    pub async fn get_selections(&self) -> Result<Vec<NodeId>, RpcError> {
        self.endpoint.call_typed(methods::GET_SELECTIONS, &()).await
    }

    pub async fn create_rectangles(&self, count: usize) -> Result<Vec<NodeId>, RpcError> {
        self.endpoint
            .call_typed(methods::CREATE_RECTANGLES, &CreateRectanglesArgs { count })
            .await
    }
}
