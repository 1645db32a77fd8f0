//! Decision kernel for homomorphism existence between relational structures.
//!
//! The pipeline: a [`consistency`] pass prunes candidate domains to their
//! maximal arc-consistent closure; [`search`] extends a consistent map to a
//! total assignment through a cascade of strategies under a wall-clock
//! budget; [`oracle`] answers existence queries per weakly-connected
//! component; [`minimize`] shrinks an unsatisfiable structure to a
//! vertex-minimal unsatisfiable substructure.

pub mod consistency;
pub mod deadline;
pub mod minimize;
pub mod oracle;
pub mod rng;
pub mod search;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quiver_structure::{DomainMap, NodeId, RelationalStructure};

/// A total node mapping from a source structure into a target structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Homomorphism {
    /// Source node -> target node.
    pub map: BTreeMap<NodeId, NodeId>,
}

impl Homomorphism {
    pub fn image_of(&self, node: NodeId) -> Option<NodeId> {
        self.map.get(&node).copied()
    }

    /// Whether this mapping is total on `source` and carries every edge of
    /// every relation to an edge of the corresponding target relation.
    pub fn preserves(&self, source: &RelationalStructure, target: &RelationalStructure) -> bool {
        if source.relation_count() != target.relation_count() {
            return false;
        }
        if source.nodes().any(|v| !self.map.contains_key(&v)) {
            return false;
        }
        for index in 0..source.relation_count() {
            for (u, v) in source.relation(index).edges() {
                let (Some(&hu), Some(&hv)) = (self.map.get(&u), self.map.get(&v)) else {
                    return false;
                };
                if !target.relation(index).has_edge(hu, hv) {
                    return false;
                }
            }
        }
        true
    }
}

/// Malformed-input failures. Raised at query entry, before any propagation
/// or search runs; no partial result is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    #[error("source has {source_arity} relations but target has {target_arity}")]
    RelationMismatch {
        source_arity: usize,
        target_arity: usize,
    },

    #[error("seed assignment references node {node}, which is not in the source structure")]
    SeedNodeUnknown { node: NodeId },

    #[error("seed assignment for node {node} contains value {value}, which is not in the target structure")]
    SeedValueUnknown { node: NodeId, value: NodeId },
}

/// Check a query's inputs against the malformed-input taxonomy.
pub(crate) fn validate_query(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
) -> Result<(), SolveError> {
    if source.relation_count() != target.relation_count() {
        return Err(SolveError::RelationMismatch {
            source_arity: source.relation_count(),
            target_arity: target.relation_count(),
        });
    }
    for (node, dom) in seed.iter() {
        if !source.contains_node(node) {
            return Err(SolveError::SeedNodeUnknown { node });
        }
        for &value in dom {
            if !target.contains_node(value) {
                return Err(SolveError::SeedValueUnknown { node, value });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_accepts_a_valid_mapping() {
        let g = RelationalStructure::digraph(vec![(0, 1), (1, 0)]);
        let h = RelationalStructure::digraph(vec![(5, 5)]);
        let hom = Homomorphism {
            map: [(0, 5), (1, 5)].into_iter().collect(),
        };
        assert!(hom.preserves(&g, &h));
    }

    #[test]
    fn test_preserves_rejects_a_dropped_edge() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let hom = Homomorphism {
            map: [(0, 6), (1, 5)].into_iter().collect(),
        };
        assert!(!hom.preserves(&g, &h));
    }

    #[test]
    fn test_preserves_rejects_a_partial_mapping() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let hom = Homomorphism {
            map: [(0, 5)].into_iter().collect(),
        };
        assert!(!hom.preserves(&g, &h));
    }

    #[test]
    fn test_validate_rejects_relation_mismatch() {
        let g = RelationalStructure::new(vec![vec![(0, 1)], vec![]]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let err = validate_query(&g, &DomainMap::new(), &h).unwrap_err();
        assert_eq!(
            err,
            SolveError::RelationMismatch {
                source_arity: 2,
                target_arity: 1
            }
        );
    }

    #[test]
    fn test_validate_rejects_unknown_seed_node() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let mut seed = DomainMap::new();
        seed.pin(9, 5);
        assert_eq!(
            validate_query(&g, &seed, &h).unwrap_err(),
            SolveError::SeedNodeUnknown { node: 9 }
        );
    }

    #[test]
    fn test_validate_rejects_unknown_seed_value() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let mut seed = DomainMap::new();
        seed.pin(0, 9);
        assert_eq!(
            validate_query(&g, &seed, &h).unwrap_err(),
            SolveError::SeedValueUnknown { node: 0, value: 9 }
        );
    }
}
