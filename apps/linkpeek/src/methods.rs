//! Capability names and argument shapes shared by both contexts.

use serde::{Deserialize, Serialize};

// Core capabilities, invoked by the surface.
pub const GET_COMMAND: &str = "getCommand";
pub const SET_STORAGE: &str = "setStorage";
pub const SET_WINDOW_SIZE: &str = "setWindowSize";
pub const NOTIFY: &str = "notify";
pub const PLACE_SVG: &str = "placeSvg";
pub const ADD_RELAUNCH: &str = "addRelaunch";
pub const GET_RELAUNCH: &str = "getRelaunch";
pub const GET_SELECTIONS: &str = "getSelections";
pub const CREATE_RECTANGLES: &str = "createRectangles";

// Surface capabilities, pushed by the core as notifications.
pub const SELECTION_CHANGED: &str = "selectionChanged";
pub const PAGE_CHANGED: &str = "pageChanged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStorageArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyArgs {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceSvgArgs {
    pub svg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaunchArgs {
    pub file_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaunchReply {
    pub persisted: bool,
}

/// Largest `count` accepted by `createRectangles`.
pub const MAX_RECTANGLES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRectanglesArgs {
    pub count: usize,
}
