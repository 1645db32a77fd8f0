//! Minimal-counterexample extraction by validated vertex deletion.
//!
//! Given a structure with no homomorphism into the target, shrink it to a
//! vertex-induced substructure that still has none, working on the first
//! failing weakly-connected component:
//!
//! - **Batch phase**: delete a random batch of `floor(ratio * n) + 1` nodes
//!   and re-test under a short per-probe budget. A deletion that keeps the
//!   structure unsatisfiable is kept and the ratio doubles (capped); a
//!   deletion that restores satisfiability — or whose probe times out — is
//!   discarded and the ratio decays by 5%. Runs while the batch size and the
//!   node count stay above their floors.
//! - **Exact phase**: try every remaining vertex one at a time with no time
//!   limit, keep any removal that preserves unsatisfiability, and repeat
//!   over the shrinking vertex set until a full pass removes nothing.
//!
//! The result is vertex-minimal, not globally minimum: a different deletion
//! order can yield a different (or smaller) minimal substructure. Sampling
//! is driven by a caller-supplied seed, so runs are reproducible.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::seq::index;

use quiver_structure::{DomainMap, NodeId, RelationalStructure};

use crate::consistency::PropagationCache;
use crate::deadline::Deadline;
use crate::oracle::{exists_with_cache, Existence, QueryOptions};
use crate::rng::deletion_rng;
use crate::{validate_query, SolveError};

/// Tuning knobs for the two-phase reduction.
#[derive(Debug, Clone)]
pub struct MinimizeConfig {
    /// Initial fraction of nodes deleted per batch.
    pub drop_ratio: f64,
    /// Ceiling for the adaptive ratio.
    pub max_drop_ratio: f64,
    /// Multiplier applied to the ratio after a failed batch.
    pub ratio_decay: f64,
    /// Batch phase stops once `ratio * n` falls to this value.
    pub batch_floor: f64,
    /// Batch phase stops once the component shrinks to this many nodes.
    pub size_floor: usize,
    /// Wall-clock budget per batch probe.
    pub probe_budget: Duration,
    /// Seed for the deletion sampler; same seed, same reduction.
    pub rng_seed: u64,
    /// Forwarded to the existence probes (see [`QueryOptions::ac_only`]).
    pub ac_only: bool,
}

impl Default for MinimizeConfig {
    fn default() -> Self {
        Self {
            drop_ratio: 0.3,
            max_drop_ratio: 0.6,
            ratio_decay: 0.95,
            batch_floor: 5.0,
            size_floor: 50,
            probe_budget: Duration::from_secs(2),
            rng_seed: 0,
            ac_only: false,
        }
    }
}

/// An unsatisfiable substructure together with the seed assignment
/// restricted to its surviving nodes.
#[derive(Debug, Clone)]
pub struct Counterexample {
    pub structure: RelationalStructure,
    pub seed: DomainMap,
}

/// Reduce `source` to a vertex-minimal substructure with no homomorphism
/// into `target` under `seed`. Returns `None` when every weakly-connected
/// component of `source` already admits a homomorphism.
pub fn minimal_counterexample(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    config: &MinimizeConfig,
) -> Result<Option<Counterexample>, SolveError> {
    validate_query(source, seed, target)?;

    let probe_options = QueryOptions {
        ac_only: config.ac_only,
        ..QueryOptions::default()
    };
    let whole_component = QueryOptions {
        componentwise: false,
        ..probe_options.clone()
    };
    // The target never changes across probes, so one cache serves the run.
    let mut cache = PropagationCache::new();

    for component in source.weakly_connected_components() {
        let part = source.induced(&component);
        let part_seed = seed.restricted_to(&component);
        let verdict = exists_with_cache(
            &part,
            &part_seed,
            target,
            &whole_component,
            Deadline::unbounded(),
            &mut cache,
        );
        if verdict != Existence::Impossible {
            continue;
        }

        let (part, part_seed) =
            batch_phase(part, part_seed, target, config, &probe_options, &mut cache);
        let (part, part_seed) = exact_phase(part, part_seed, target, &probe_options, &mut cache);
        return Ok(Some(Counterexample {
            structure: part,
            seed: part_seed,
        }));
    }
    Ok(None)
}

/// Randomized batch deletion under an adaptive ratio.
fn batch_phase(
    mut part: RelationalStructure,
    mut seed: DomainMap,
    target: &RelationalStructure,
    config: &MinimizeConfig,
    options: &QueryOptions,
    cache: &mut PropagationCache,
) -> (RelationalStructure, DomainMap) {
    let mut rng = deletion_rng(config.rng_seed);
    let mut ratio = config.drop_ratio;

    loop {
        let n = part.node_count();
        if !(ratio * n as f64 > config.batch_floor && n > config.size_floor) {
            break;
        }

        let batch_size = ((ratio * n as f64).floor() as usize + 1).min(n);
        let nodes: Vec<NodeId> = part.nodes().collect();
        let batch: BTreeSet<NodeId> = index::sample(&mut rng, nodes.len(), batch_size)
            .iter()
            .map(|i| nodes[i])
            .collect();

        let candidate = part.without(&batch);
        let candidate_seed = seed.restricted_to(candidate.node_set());
        let verdict = exists_with_cache(
            &candidate,
            &candidate_seed,
            target,
            options,
            Deadline::within(config.probe_budget),
            cache,
        );
        if verdict == Existence::Impossible {
            part = candidate;
            seed = candidate_seed;
            ratio = (ratio * 2.0).min(config.max_drop_ratio);
        } else {
            // Satisfiable again, or the probe timed out: either way the
            // deletion is discarded and the next batch gets smaller.
            ratio *= config.ratio_decay;
        }
    }
    (part, seed)
}

/// Exact single-vertex reduction to a fixpoint, with no time limit.
fn exact_phase(
    mut part: RelationalStructure,
    mut seed: DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
    cache: &mut PropagationCache,
) -> (RelationalStructure, DomainMap) {
    loop {
        let mut removed = false;
        for v in part.nodes().collect::<Vec<_>>() {
            if !part.contains_node(v) {
                continue;
            }
            let drop = BTreeSet::from([v]);
            let candidate = part.without(&drop);
            let candidate_seed = seed.restricted_to(candidate.node_set());
            let verdict = exists_with_cache(
                &candidate,
                &candidate_seed,
                target,
                options,
                Deadline::unbounded(),
                cache,
            );
            if verdict == Existence::Impossible {
                part = candidate;
                seed = candidate_seed;
                removed = true;
            }
        }
        if !removed {
            return (part, seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_edge() -> RelationalStructure {
        RelationalStructure::digraph(vec![(10, 11)])
    }

    #[test]
    fn test_satisfiable_source_yields_nothing() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let result =
            minimal_counterexample(&g, &DomainMap::new(), &one_edge(), &MinimizeConfig::default())
                .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_cycle_with_satellite_reduces_to_the_cycle() {
        // 3-cycle plus an isolated node; only the cycle fails against the
        // acyclic target, and it is already vertex-minimal.
        let g = RelationalStructure::digraph_with_nodes([3], vec![(0, 1), (1, 2), (2, 0)]);
        let result =
            minimal_counterexample(&g, &DomainMap::new(), &one_edge(), &MinimizeConfig::default())
                .unwrap()
                .unwrap();

        let expected: BTreeSet<NodeId> = [0, 1, 2].into_iter().collect();
        assert_eq!(result.structure.node_set(), &expected);
        assert_eq!(result.structure.relation(0).edge_count(), 3);
        assert!(result.structure.relation(0).has_edge(0, 1));
        assert!(result.structure.relation(0).has_edge(1, 2));
        assert!(result.structure.relation(0).has_edge(2, 0));
    }

    #[test]
    fn test_seed_is_restricted_to_survivors() {
        let g = RelationalStructure::digraph_with_nodes([3], vec![(0, 1), (1, 2), (2, 0)]);
        let mut seed = DomainMap::new();
        seed.pin(0, 10);
        seed.pin(3, 10);
        let result = minimal_counterexample(&g, &seed, &one_edge(), &MinimizeConfig::default())
            .unwrap()
            .unwrap();
        assert!(result.seed.contains(0));
        assert!(!result.seed.contains(3));
    }

    #[test]
    fn test_same_seed_reduces_identically() {
        let edges: Vec<(NodeId, NodeId)> = (0..9).map(|i| (i, i + 1)).collect();
        let g = RelationalStructure::digraph(edges);
        let config = MinimizeConfig {
            size_floor: 3,
            batch_floor: 1.0,
            rng_seed: 42,
            ..MinimizeConfig::default()
        };
        let first = minimal_counterexample(&g, &DomainMap::new(), &one_edge(), &config)
            .unwrap()
            .unwrap();
        let second = minimal_counterexample(&g, &DomainMap::new(), &one_edge(), &config)
            .unwrap()
            .unwrap();
        assert_eq!(first.structure, second.structure);
    }
}
