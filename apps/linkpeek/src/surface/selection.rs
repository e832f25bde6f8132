//! Maps the host selection to the single link the preview shows.

use std::collections::HashSet;

use bridge_proto::{Link, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    NoSelection,
    ResolvedLink(Link),
    SelectionWithNoLink,
}

impl Resolution {
    /// The first link, in list order, whose node is part of `selection`.
    pub fn resolve(links: &[Link], selection: &[NodeId]) -> Self {
        if selection.is_empty() {
            return Resolution::NoSelection;
        }
        let selected: HashSet<&NodeId> = selection.iter().collect();
        links
            .iter()
            .find(|link| selected.contains(&link.id))
            .cloned()
            .map_or(Resolution::SelectionWithNoLink, Resolution::ResolvedLink)
    }

    pub fn manual(url: impl Into<String>) -> Self {
        Resolution::ResolvedLink(Link::manual(url))
    }

    pub fn active_link(&self) -> Option<&Link> {
        match self {
            Resolution::ResolvedLink(link) => Some(link),
            _ => None,
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.active_link().map(|link| link.url.as_str())
    }
}

/// Proof that a resolution was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Generation-guarded resolver. Each selection change takes a ticket; a
/// resolution completed with an outdated ticket is discarded.
#[derive(Debug, Default)]
pub struct SelectionResolver {
    generation: u64,
    settled: u64,
    resolution: Resolution,
}

impl SelectionResolver {
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        Ticket(self.generation)
    }

    /// Apply a finished resolution. Returns `None` when a newer selection
    /// change or manual edit happened since `ticket` was taken.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        links: &[Link],
        selection: &[NodeId],
    ) -> Option<&Resolution> {
        if ticket.0 != self.generation {
            return None;
        }
        self.resolution = Resolution::resolve(links, selection);
        self.settled = ticket.0;
        Some(&self.resolution)
    }

    /// Manual url edit. Supersedes any resolution in flight.
    pub fn enter_url(&mut self, url: impl Into<String>) -> &Resolution {
        self.generation += 1;
        self.settled = self.generation;
        self.resolution = Resolution::manual(url);
        &self.resolution
    }

    /// Forget the current resolution after the link list was rebuilt.
    /// Outstanding tickets stay valid; they resolve against the new list.
    pub fn reset(&mut self) {
        self.resolution = Resolution::NoSelection;
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn settled_generation(&self) -> u64 {
        self.settled
    }

    pub fn is_pending(&self) -> bool {
        self.settled != self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> Vec<Link> {
        vec![
            Link::new("n1", "http://x", false),
            Link::new("n2", "http://y", true),
            Link::new("n2", "http://z", true),
        ]
    }

    fn ids(list: &[&str]) -> Vec<NodeId> {
        list.iter().copied().map(NodeId::from).collect()
    }

    #[test]
    fn resolves_by_link_order() {
        assert_eq!(
            Resolution::resolve(&links(), &ids(&["n2"])),
            Resolution::ResolvedLink(Link::new("n2", "http://y", true))
        );
        // Selection order does not matter; link order does.
        assert_eq!(
            Resolution::resolve(&links(), &ids(&["n2", "n1"])).current_url(),
            Some("http://x")
        );
        assert_eq!(
            Resolution::resolve(&links(), &ids(&["n2", "n2"])).current_url(),
            Some("http://y")
        );
    }

    #[test]
    fn empty_and_unlinked_selections() {
        assert_eq!(Resolution::resolve(&links(), &[]), Resolution::NoSelection);
        assert_eq!(
            Resolution::resolve(&links(), &ids(&["n9"])),
            Resolution::SelectionWithNoLink
        );
        assert_eq!(
            Resolution::resolve(&[], &ids(&["n1"])),
            Resolution::SelectionWithNoLink
        );
    }

    #[test]
    fn manual_links_never_match_selections() {
        let mut with_manual = links();
        with_manual.insert(0, Link::manual("http://typed"));
        assert_eq!(
            Resolution::resolve(&with_manual, &ids(&["n1"])).current_url(),
            Some("http://x")
        );
        assert!(Resolution::manual("http://typed")
            .active_link()
            .unwrap()
            .is_manual());
    }

    #[test]
    fn stale_tickets_are_discarded() {
        let mut resolver = SelectionResolver::default();
        let first = resolver.begin();
        let second = resolver.begin();
        assert!(resolver.is_pending());

        assert!(resolver.complete(first, &links(), &ids(&["n1"])).is_none());
        assert_eq!(resolver.resolution(), &Resolution::NoSelection);

        let settled = resolver.complete(second, &links(), &ids(&["n2"])).cloned();
        assert_eq!(settled.as_ref().and_then(Resolution::current_url), Some("http://y"));
        assert_eq!(resolver.settled_generation(), 2);
        assert!(!resolver.is_pending());
    }

    #[test]
    fn manual_edit_supersedes_pending_resolution() {
        let mut resolver = SelectionResolver::default();
        let ticket = resolver.begin();
        assert_eq!(
            resolver.enter_url("http://typed").current_url(),
            Some("http://typed")
        );
        assert!(resolver.complete(ticket, &links(), &ids(&["n1"])).is_none());
        assert_eq!(resolver.resolution().current_url(), Some("http://typed"));

        resolver.reset();
        assert_eq!(resolver.resolution(), &Resolution::NoSelection);
    }

    #[test]
    fn reset_keeps_outstanding_tickets() {
        let mut resolver = SelectionResolver::default();
        let ticket = resolver.begin();
        resolver.reset();
        assert!(resolver.complete(ticket, &links(), &ids(&["n1"])).is_some());
    }
}
