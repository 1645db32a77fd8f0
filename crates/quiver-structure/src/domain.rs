//! Candidate-set assignments for homomorphism queries.
//!
//! A [`DomainMap`] maps each source node to the set of target nodes still
//! admissible for it. Propagation and search only ever shrink domains; an
//! empty domain for any node marks the whole map as failed, and the
//! all-nodes-empty state is the explicit failure marker handed back by
//! propagation. A map is always scoped to one (source, target) pair.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::structure::NodeId;

/// Per-node candidate sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMap {
    domains: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DomainMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a node with a single admissible value.
    pub fn pin(&mut self, node: NodeId, value: NodeId) {
        self.domains.insert(node, BTreeSet::from([value]));
    }

    pub fn insert(&mut self, node: NodeId, candidates: BTreeSet<NodeId>) {
        self.domains.insert(node, candidates);
    }

    pub fn remove(&mut self, node: NodeId) -> Option<BTreeSet<NodeId>> {
        self.domains.remove(&node)
    }

    pub fn get(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.domains.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.domains.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.domains.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &BTreeSet<NodeId>)> {
        self.domains.iter().map(|(&node, dom)| (node, dom))
    }

    /// The sub-map covering only the nodes in `keep`.
    pub fn restricted_to(&self, keep: &BTreeSet<NodeId>) -> Self {
        Self {
            domains: self
                .domains
                .iter()
                .filter(|(node, _)| keep.contains(node))
                .map(|(&node, dom)| (node, dom.clone()))
                .collect(),
        }
    }

    /// Whether any domain has emptied — the terminal failure condition.
    pub fn has_empty(&self) -> bool {
        self.domains.values().any(|dom| dom.is_empty())
    }

    /// Empty every domain over `universe`: the explicit failure marker.
    pub fn wipe(&mut self, universe: impl IntoIterator<Item = NodeId>) {
        for node in universe {
            self.domains.insert(node, BTreeSet::new());
        }
        for dom in self.domains.values_mut() {
            dom.clear();
        }
    }

    /// Most-constrained open node: the smallest domain of size two or more,
    /// ties broken by ascending node id.
    pub fn smallest_open(&self) -> Option<NodeId> {
        self.domains
            .iter()
            .filter(|(_, dom)| dom.len() > 1)
            .min_by_key(|(&node, dom)| (dom.len(), node))
            .map(|(&node, _)| node)
    }

    /// The total assignment, if every domain is a singleton.
    pub fn as_assignment(&self) -> Option<BTreeMap<NodeId, NodeId>> {
        let mut map = BTreeMap::new();
        for (&node, dom) in &self.domains {
            if dom.len() != 1 {
                return None;
            }
            let &value = dom.iter().next()?;
            map.insert(node, value);
        }
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[NodeId]) -> BTreeSet<NodeId> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_pin_makes_a_singleton() {
        let mut f = DomainMap::new();
        f.insert(0, set(&[1, 2, 3]));
        f.pin(0, 2);
        assert_eq!(f.get(0), Some(&set(&[2])));
    }

    #[test]
    fn test_smallest_open_prefers_small_domains() {
        let mut f = DomainMap::new();
        f.insert(0, set(&[1, 2, 3]));
        f.insert(1, set(&[1, 2]));
        f.insert(2, set(&[5]));
        assert_eq!(f.smallest_open(), Some(1));
    }

    #[test]
    fn test_smallest_open_ignores_singletons_and_breaks_ties_by_id() {
        let mut f = DomainMap::new();
        f.insert(3, set(&[1, 2]));
        f.insert(1, set(&[4, 5]));
        f.insert(0, set(&[9]));
        assert_eq!(f.smallest_open(), Some(1));
    }

    #[test]
    fn test_as_assignment_requires_all_singletons() {
        let mut f = DomainMap::new();
        f.insert(0, set(&[7]));
        f.insert(1, set(&[7, 8]));
        assert_eq!(f.as_assignment(), None);
        f.pin(1, 8);
        let map = f.as_assignment().unwrap();
        assert_eq!(map[&0], 7);
        assert_eq!(map[&1], 8);
    }

    #[test]
    fn test_wipe_marks_every_node_failed() {
        let mut f = DomainMap::new();
        f.insert(0, set(&[1]));
        f.wipe([0, 1, 2]);
        assert_eq!(f.len(), 3);
        assert!(f.has_empty());
        assert!(f.iter().all(|(_, dom)| dom.is_empty()));
    }

    #[test]
    fn test_restricted_to_keeps_only_listed_nodes() {
        let mut f = DomainMap::new();
        f.insert(0, set(&[1]));
        f.insert(1, set(&[2]));
        f.insert(2, set(&[3]));
        let keep = set(&[0, 2]);
        let g = f.restricted_to(&keep);
        assert_eq!(g.len(), 2);
        assert!(g.contains(0) && g.contains(2) && !g.contains(1));
    }
}
