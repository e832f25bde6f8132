//! Versioned document snapshot schema.
//!
//! Snapshots arrive from outside the core (the remote metadata service or a
//! file on disk) and are validated here before anything walks them. Field
//! names follow the upstream JSON (`styleOverrideTable`, `nodeID`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlink {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "nodeID", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Hyperlink {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            kind: Some("URL".into()),
            url: Some(url.into()),
            node_id: None,
        }
    }
}

/// The part of a text style the bridge cares about. Unknown style fields are
/// ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<Hyperlink>,
}

impl TextStyle {
    pub fn linked(url: impl Into<String>) -> Self {
        Self {
            hyperlink: Some(Hyperlink::url(url)),
        }
    }

    /// The hyperlink url, if one is set and non-empty.
    pub fn link_url(&self) -> Option<&str> {
        self.hyperlink
            .as_ref()
            .and_then(|link| link.url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<TextStyle>,
    #[serde(
        rename = "styleOverrideTable",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub style_overrides: BTreeMap<String, TextStyle>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.style = Some(TextStyle::linked(url));
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, style: TextStyle) -> Self {
        self.style_overrides.insert(key.into(), style);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn link_url(&self) -> Option<&str> {
        self.style.as_ref().and_then(TextStyle::link_url)
    }

    /// Depth-first search for a node by id.
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if &node.id == id {
                return Some(node);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }
}

/// An extracted hyperlink annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: NodeId,
    pub url: String,
    pub mixed: bool,
}

impl Link {
    pub fn new(id: impl Into<NodeId>, url: impl Into<String>, mixed: bool) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            mixed,
        }
    }

    /// A link typed in by hand. Its empty id never matches a real node.
    pub fn manual(url: impl Into<String>) -> Self {
        Self::new(NodeId::default(), url, false)
    }

    pub fn is_manual(&self) -> bool {
        self.id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub id: NodeId,
    pub name: String,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub document: Node,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("unsupported snapshot schema version {0}")]
    UnsupportedVersion(u32),
    #[error("node at depth {depth} has an empty id")]
    EmptyNodeId { depth: usize },
    #[error("snapshot does not match the document schema: {0}")]
    Malformed(String),
}

impl DocumentSnapshot {
    pub fn new(document: Node) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            name: None,
            document,
        }
    }

    /// Decode and validate an untrusted JSON payload.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SnapshotError> {
        let snapshot: DocumentSnapshot = serde_json::from_value(value)
            .map_err(|err| SnapshotError::Malformed(err.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.schema_version));
        }
        let mut stack = vec![(&self.document, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if node.id.is_empty() {
                return Err(SnapshotError::EmptyNodeId { depth });
            }
            stack.extend(node.children().iter().map(|child| (child, depth + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_upstream_field_names() {
        let snapshot = DocumentSnapshot::from_json(json!({
            "name": "Landing",
            "document": {
                "id": "0:0",
                "type": "DOCUMENT",
                "children": [{
                    "id": "1:2",
                    "type": "TEXT",
                    "style": {"fontSize": 12, "hyperlink": {"type": "URL", "url": "https://a.test"}},
                    "styleOverrideTable": {
                        "1": {"hyperlink": {"type": "NODE", "nodeID": "3:4"}},
                        "2": {"fontWeight": 700}
                    }
                }]
            }
        }))
        .expect("valid snapshot");

        assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
        let text = &snapshot.document.children()[0];
        assert_eq!(text.link_url(), Some("https://a.test"));
        assert_eq!(text.style_overrides.len(), 2);
        assert_eq!(text.style_overrides["1"].link_url(), None);
        assert_eq!(
            text.style_overrides["1"].hyperlink.as_ref().unwrap().node_id.as_deref(),
            Some("3:4")
        );
    }

    #[test]
    fn rejects_unknown_schema_versions() {
        let err = DocumentSnapshot::from_json(json!({
            "schemaVersion": 9,
            "document": {"id": "0:0"}
        }))
        .unwrap_err();
        assert_eq!(err, SnapshotError::UnsupportedVersion(9));
    }

    #[test]
    fn rejects_empty_ids() {
        let err = DocumentSnapshot::from_json(json!({
            "document": {"id": "0:0", "children": [{"id": "1:1", "children": [{"id": ""}]}]}
        }))
        .unwrap_err();
        assert_eq!(err, SnapshotError::EmptyNodeId { depth: 2 });
    }

    #[test]
    fn rejects_missing_document() {
        assert!(matches!(
            DocumentSnapshot::from_json(json!({"name": "x"})),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[test]
    fn empty_url_is_not_a_link() {
        let node = Node::new("n").with_link("");
        assert_eq!(node.link_url(), None);
    }

    #[test]
    fn find_walks_descendants() {
        let tree = Node::new("a").with_child(Node::new("b").with_child(Node::new("c")));
        assert_eq!(tree.find(&NodeId::from("c")).map(|n| n.id.as_str()), Some("c"));
        assert!(tree.find(&NodeId::from("z")).is_none());
    }
}
