//! Shared protocol definitions for core ↔ surface communication.
//! Kept free of runtime code so both contexts (and tooling) can depend on it
//! without pulling in tokio.

pub mod document;
pub mod message;

pub use document::{
    DocumentSnapshot, Hyperlink, Link, Node, NodeId, PageSnapshot, SnapshotError, TextStyle,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use message::{
    decode_message, encode_message, CorrelationId, ErrorPayload, Message, Outcome, ProtoError,
    ERROR_HANDLER, ERROR_INVALID_PARAMS, ERROR_METHOD_NOT_FOUND,
};
