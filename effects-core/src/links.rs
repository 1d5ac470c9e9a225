//! Linked actors: companions whose persistent effects resolve on the
//! turn of the actor they are linked from.
//!
//! Links are directed and never followed transitively.

use crate::actor::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The ordered set of actors linked from one source actor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSet {
    linked: Vec<ActorId>,
}

/// What a [`LinkSet::link`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    pub added: Vec<ActorId>,
    /// Set when the source actor appeared among the targets.
    pub rejected_self: bool,
}

impl LinkSet {
    pub fn from_ids(ids: impl IntoIterator<Item = ActorId>) -> Self {
        let mut set = Self::default();
        for id in ids {
            if !set.linked.contains(&id) {
                set.linked.push(id);
            }
        }
        set
    }

    /// Add `targets` to the set, keeping insertion order. Linking
    /// `source` to itself is refused.
    pub fn link(&mut self, source: ActorId, targets: impl IntoIterator<Item = ActorId>) -> LinkOutcome {
        let mut outcome = LinkOutcome::default();
        for target in targets {
            if target == source {
                outcome.rejected_self = true;
                continue;
            }
            if !self.linked.contains(&target) {
                self.linked.push(target);
                outcome.added.push(target);
            }
        }
        outcome
    }

    pub fn clear(&mut self) {
        self.linked.clear();
    }

    pub fn ids(&self) -> &[ActorId] {
        &self.linked
    }

    pub fn into_ids(self) -> Vec<ActorId> {
        self.linked
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.linked.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.linked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linked.is_empty()
    }
}

/// Links for many actors, kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkGraph {
    edges: HashMap<ActorId, LinkSet>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&mut self, source: ActorId, targets: impl IntoIterator<Item = ActorId>) -> LinkOutcome {
        let outcome = self.edges.entry(source).or_default().link(source, targets);
        if outcome.rejected_self {
            tracing::warn!(actor = %source, "Refusing to link an actor to itself");
        }
        outcome
    }

    pub fn unlink(&mut self, source: ActorId) {
        self.edges.remove(&source);
    }

    /// Directly linked actors, in insertion order.
    pub fn linked(&self, source: ActorId) -> &[ActorId] {
        self.edges.get(&source).map(LinkSet::ids).unwrap_or(&[])
    }

    pub fn set(&mut self, source: ActorId, links: LinkSet) {
        if links.is_empty() {
            self.edges.remove(&source);
        } else {
            self.edges.insert(source, links);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_accumulates_in_order() {
        let (a, b, c) = (ActorId::new(), ActorId::new(), ActorId::new());
        let mut graph = LinkGraph::new();
        graph.link(a, [b]);
        graph.link(a, [c, b]);
        assert_eq!(graph.linked(a), &[b, c]);
    }

    #[test]
    fn test_self_link_rejected() {
        let a = ActorId::new();
        let mut graph = LinkGraph::new();
        let outcome = graph.link(a, [a]);
        assert!(outcome.rejected_self);
        assert!(outcome.added.is_empty());
        assert!(graph.linked(a).is_empty());
    }

    #[test]
    fn test_self_link_among_others() {
        let (a, b) = (ActorId::new(), ActorId::new());
        let mut set = LinkSet::default();
        let outcome = set.link(a, [a, b]);
        assert!(outcome.rejected_self);
        assert_eq!(outcome.added, vec![b]);
        assert_eq!(set.ids(), &[b]);
    }

    #[test]
    fn test_unlink_empties() {
        let (a, b) = (ActorId::new(), ActorId::new());
        let mut graph = LinkGraph::new();
        graph.link(a, [b]);
        graph.unlink(a);
        assert!(graph.linked(a).is_empty());
    }

    #[test]
    fn test_edges_are_directed() {
        let (a, b) = (ActorId::new(), ActorId::new());
        let mut graph = LinkGraph::new();
        graph.link(a, [b]);
        assert!(graph.linked(b).is_empty());
        graph.link(b, [a]);
        assert_eq!(graph.linked(a), &[b]);
        assert_eq!(graph.linked(b), &[a]);
    }

    #[test]
    fn test_from_ids_dedups() {
        let (a, b) = (ActorId::new(), ActorId::new());
        let set = LinkSet::from_ids([a, b, a]);
        assert_eq!(set.ids(), &[a, b]);
    }
}
