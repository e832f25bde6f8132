//! Document tree traversals. Both are pure functions of the snapshot they are
//! given and use an explicit stack, so arbitrarily deep trees are fine.

use bridge_proto::{Link, Node, NodeId};

/// Every hyperlink annotation under `root`, in pre-order by node. A node's
/// whole-style link comes first, then one mixed link per style override that
/// carries a url (in override-key order), then its children.
pub fn extract_links(root: &Node) -> Vec<Link> {
    let mut links = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(url) = node.link_url() {
            links.push(Link::new(node.id.clone(), url, false));
        }
        for style in node.style_overrides.values() {
            if let Some(url) = style.link_url() {
                links.push(Link::new(node.id.clone(), url, true));
            }
        }
        stack.extend(node.children().iter().rev());
    }
    links
}

/// Ids of `root` and all of its descendants, pre-order. Duplicate ids are
/// kept: the length is always the subtree's node count.
pub fn collect_subtree_ids(root: &Node) -> Vec<NodeId> {
    let mut ids = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        ids.push(node.id.clone());
        stack.extend(node.children().iter().rev());
    }
    ids
}
