//! Relational structures: a shared node universe plus directed edge relations.
//!
//! Structures are immutable once built. Every edge endpoint is part of the
//! universe by construction, and all relations of one structure range over the
//! same universe. Node removal (`induced`, `without`) produces a fresh value
//! that shares no mutable state with the original.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Node identifier within one structure.
pub type NodeId = u32;

/// One directed edge relation, stored as forward and reverse adjacency.
///
/// The two maps are transposes of each other; constructors keep them in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    succ: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pred: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Relation {
    fn from_edges(edges: &[(NodeId, NodeId)]) -> Self {
        let mut succ: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        let mut pred: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for &(u, v) in edges {
            succ.entry(u).or_default().insert(v);
            pred.entry(v).or_default().insert(u);
        }
        Self { succ, pred }
    }

    /// All nodes that occur as an endpoint of some edge.
    fn endpoints(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.succ.keys().chain(self.pred.keys()).copied()
    }

    pub fn successors(&self, v: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.succ.get(&v).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, v: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.pred.get(&v).into_iter().flatten().copied()
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.succ.get(&u).map_or(false, |vs| vs.contains(&v))
    }

    pub fn has_loop(&self, v: NodeId) -> bool {
        self.has_edge(v, v)
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.succ
            .iter()
            .flat_map(|(&u, vs)| vs.iter().map(move |&v| (u, v)))
    }

    pub fn edge_count(&self) -> usize {
        self.succ.values().map(|vs| vs.len()).sum()
    }

    /// The sub-relation induced on `keep`.
    fn restricted(&self, keep: &BTreeSet<NodeId>) -> Self {
        let edges: Vec<(NodeId, NodeId)> = self
            .edges()
            .filter(|(u, v)| keep.contains(u) && keep.contains(v))
            .collect();
        Self::from_edges(&edges)
    }
}

/// A finite node universe with one or more directed edge relations over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalStructure {
    nodes: BTreeSet<NodeId>,
    relations: Vec<Relation>,
}

impl RelationalStructure {
    /// Build a structure whose universe is the union of all edge endpoints.
    pub fn new(relations: Vec<Vec<(NodeId, NodeId)>>) -> Self {
        Self::with_nodes([], relations)
    }

    /// Build a structure from explicit nodes plus edge lists. Endpoints not
    /// listed in `nodes` are added to the universe automatically; listing a
    /// node without edges keeps it as an isolated node.
    pub fn with_nodes(
        nodes: impl IntoIterator<Item = NodeId>,
        relations: Vec<Vec<(NodeId, NodeId)>>,
    ) -> Self {
        let relations: Vec<Relation> = relations
            .iter()
            .map(|edges| Relation::from_edges(edges))
            .collect();
        let mut universe: BTreeSet<NodeId> = nodes.into_iter().collect();
        for relation in &relations {
            universe.extend(relation.endpoints());
        }
        Self {
            nodes: universe,
            relations,
        }
    }

    /// Single-relation convenience: an ordinary digraph.
    pub fn digraph(edges: Vec<(NodeId, NodeId)>) -> Self {
        Self::new(vec![edges])
    }

    /// Single-relation convenience with explicit (possibly isolated) nodes.
    pub fn digraph_with_nodes(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: Vec<(NodeId, NodeId)>,
    ) -> Self {
        Self::with_nodes(nodes, vec![edges])
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_set(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, v: NodeId) -> bool {
        self.nodes.contains(&v)
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn relation(&self, index: usize) -> &Relation {
        &self.relations[index]
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// The substructure induced on `keep` (intersected with the universe).
    pub fn induced(&self, keep: &BTreeSet<NodeId>) -> Self {
        let nodes: BTreeSet<NodeId> = self.nodes.intersection(keep).copied().collect();
        let relations = self
            .relations
            .iter()
            .map(|relation| relation.restricted(&nodes))
            .collect();
        Self { nodes, relations }
    }

    /// The substructure induced on the universe minus `drop`.
    pub fn without(&self, drop: &BTreeSet<NodeId>) -> Self {
        let keep: BTreeSet<NodeId> = self.nodes.difference(drop).copied().collect();
        self.induced(&keep)
    }

    /// Weakly-connected components: maximal node sets connected when edge
    /// direction is ignored, across all relations. Components are returned in
    /// ascending order of their smallest member.
    pub fn weakly_connected_components(&self) -> Vec<BTreeSet<NodeId>> {
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut components = Vec::new();
        for &start in &self.nodes {
            if seen.contains(&start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([start]);
            seen.insert(start);
            while let Some(v) = queue.pop_front() {
                component.insert(v);
                for relation in &self.relations {
                    for w in relation.successors(v).chain(relation.predecessors(v)) {
                        if seen.insert(w) {
                            queue.push_back(w);
                        }
                    }
                }
            }
            components.push(component);
        }
        components
    }
}
