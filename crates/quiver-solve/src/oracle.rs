//! Existence queries over relational structures.
//!
//! Queries decompose the source into weakly-connected components: components
//! cannot interact through edge constraints, so a total homomorphism exists
//! iff every component independently admits one. Each component gets the
//! seed assignment restricted to its own nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use quiver_structure::{DomainMap, RelationalStructure};

use crate::consistency::{enforce, init_domains, Closure, PropagationCache};
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::search::{extend, SearchConfig, SearchOutcome};
use crate::{validate_query, Homomorphism, SolveError};

/// Options shared by the query entry points.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Answer existence from propagation alone, skipping all search.
    ///
    /// Caller contract: this is only correct when the caller guarantees, on
    /// external algebraic grounds, that propagation is decisive for the
    /// target structure. The kernel cannot verify that guarantee; enabling
    /// the flag without it can report existence where none holds. A negative
    /// answer (some domain emptied) is authoritative either way.
    pub ac_only: bool,
    /// Decompose the source into weakly-connected components.
    pub componentwise: bool,
    /// Overall wall-clock budget. `None` is unbounded.
    pub budget: Option<Duration>,
    /// Pre-restrict self-looped source nodes to self-looped target nodes.
    pub loop_filter: bool,
    /// Tuning for the backtracking cascade.
    pub search: SearchConfig,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            ac_only: false,
            componentwise: true,
            budget: None,
            loop_filter: true,
            search: SearchConfig::default(),
        }
    }
}

/// Three-valued existence verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    /// A homomorphism exists (or, on the propagation-only path, propagation
    /// did not refute one — see [`QueryOptions::ac_only`]).
    Exists,
    /// Proven: no homomorphism exists.
    Impossible,
    /// The budget ran out before the question was settled.
    Unknown,
}

fn query_deadline(options: &QueryOptions) -> Deadline {
    options.budget.map_or(Deadline::unbounded(), Deadline::within)
}

/// Does a homomorphism from `source` into `target` extending `seed` exist?
pub fn exists_hom(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
) -> Result<Existence, SolveError> {
    validate_query(source, seed, target)?;
    let mut cache = PropagationCache::new();
    Ok(exists_with_cache(
        source,
        seed,
        target,
        options,
        query_deadline(options),
        &mut cache,
    ))
}

/// Existence check reusing a caller-held cache. The cache must have been
/// populated against the same target.
pub(crate) fn exists_with_cache(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
    deadline: Deadline,
    cache: &mut PropagationCache,
) -> Existence {
    if !options.componentwise {
        return exists_component(source, seed, target, options, deadline, cache);
    }
    let mut verdict = Existence::Exists;
    for component in source.weakly_connected_components() {
        let part = source.induced(&component);
        let part_seed = seed.restricted_to(&component);
        match exists_component(&part, &part_seed, target, options, deadline, cache) {
            Existence::Impossible => return Existence::Impossible,
            Existence::Unknown => verdict = Existence::Unknown,
            Existence::Exists => {}
        }
    }
    verdict
}

fn exists_component(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
    deadline: Deadline,
    cache: &mut PropagationCache,
) -> Existence {
    let mut f = init_domains(source, target, seed, options.loop_filter);
    if options.ac_only {
        match enforce(source, target, &mut f, cache, None, None, deadline) {
            Err(DeadlineExceeded) => Existence::Unknown,
            Ok(Closure::Exhausted) => Existence::Impossible,
            Ok(Closure::Stable) => Existence::Exists,
        }
    } else {
        match extend(source, target, f, cache, deadline, &options.search) {
            SearchOutcome::Found(_) => Existence::Exists,
            SearchOutcome::Unsatisfiable => Existence::Impossible,
            SearchOutcome::Inconclusive => Existence::Unknown,
        }
    }
}

/// Find a total homomorphism from `source` into `target` extending `seed`.
///
/// With `componentwise` set, each component is searched independently and the
/// per-component mappings are merged. The `ac_only` flag is ignored here:
/// producing a mapping always requires the full search.
pub fn find_hom(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
) -> Result<SearchOutcome, SolveError> {
    validate_query(source, seed, target)?;
    let deadline = query_deadline(options);
    let mut cache = PropagationCache::new();

    if !options.componentwise {
        let f = init_domains(source, target, seed, options.loop_filter);
        return Ok(extend(source, target, f, &mut cache, deadline, &options.search));
    }

    let mut merged = BTreeMap::new();
    for component in source.weakly_connected_components() {
        let part = source.induced(&component);
        let part_seed = seed.restricted_to(&component);
        let f = init_domains(&part, target, &part_seed, options.loop_filter);
        match extend(&part, target, f, &mut cache, deadline, &options.search) {
            SearchOutcome::Found(hom) => merged.extend(hom.map),
            SearchOutcome::Unsatisfiable => return Ok(SearchOutcome::Unsatisfiable),
            SearchOutcome::Inconclusive => return Ok(SearchOutcome::Inconclusive),
        }
    }
    Ok(SearchOutcome::Found(Homomorphism { map: merged }))
}

/// Enumerate every homomorphism from `source` into `target` extending `seed`.
///
/// Exhaustive and unbudgeted: the answer set can be exponential in the size
/// of the source. Componentwise enumeration combines the per-component
/// answer sets as a cartesian product.
pub fn all_homs(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
) -> Result<Vec<Homomorphism>, SolveError> {
    validate_query(source, seed, target)?;
    let mut cache = PropagationCache::new();

    if !options.componentwise {
        return Ok(component_homs(source, seed, target, options, &mut cache));
    }

    let mut maps: Vec<BTreeMap<_, _>> = vec![BTreeMap::new()];
    for component in source.weakly_connected_components() {
        let part = source.induced(&component);
        let part_seed = seed.restricted_to(&component);
        let part_homs = component_homs(&part, &part_seed, target, options, &mut cache);
        if part_homs.is_empty() {
            return Ok(Vec::new());
        }
        let mut combined = Vec::with_capacity(maps.len() * part_homs.len());
        for base in &maps {
            for hom in &part_homs {
                let mut map = base.clone();
                map.extend(hom.map.iter().map(|(&k, &v)| (k, v)));
                combined.push(map);
            }
        }
        maps = combined;
    }
    Ok(maps.into_iter().map(|map| Homomorphism { map }).collect())
}

/// Worklist enumeration over one component: branch on the most-constrained
/// open node, propagate each pin, keep every fully singled-out map.
fn component_homs(
    source: &RelationalStructure,
    seed: &DomainMap,
    target: &RelationalStructure,
    options: &QueryOptions,
    cache: &mut PropagationCache,
) -> Vec<Homomorphism> {
    let mut root = init_domains(source, target, seed, options.loop_filter);
    match enforce(
        source,
        target,
        &mut root,
        cache,
        None,
        None,
        Deadline::unbounded(),
    ) {
        Ok(Closure::Stable) => {}
        _ => return Vec::new(),
    }

    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(f) = stack.pop() {
        let Some(node) = f.smallest_open() else {
            if let Some(map) = f.as_assignment() {
                found.push(Homomorphism { map });
            }
            continue;
        };
        let Some(domain) = f.get(node).cloned() else {
            continue;
        };
        for value in domain {
            let mut branch = f.clone();
            branch.pin(node, value);
            let worklist = BTreeSet::from([node]);
            if let Ok(Closure::Stable) = enforce(
                source,
                target,
                &mut branch,
                cache,
                Some(&worklist),
                None,
                Deadline::unbounded(),
            ) {
                stack.push(branch);
            }
        }
    }
    found
}

/// Homomorphic equivalence: structures that map into each other.
pub fn hom_equivalent(
    a: &RelationalStructure,
    b: &RelationalStructure,
    options: &QueryOptions,
) -> Result<Existence, SolveError> {
    let forward = exists_hom(a, &DomainMap::new(), b, options)?;
    if forward == Existence::Impossible {
        return Ok(Existence::Impossible);
    }
    let backward = exists_hom(b, &DomainMap::new(), a, options)?;
    Ok(match (forward, backward) {
        (Existence::Exists, Existence::Exists) => Existence::Exists,
        (_, Existence::Impossible) => Existence::Impossible,
        _ => Existence::Unknown,
    })
}

/// Propagation-only core test, sound for orientations of trees: a tree is a
/// core iff the self-query closure pins every node to itself.
pub fn is_tree_core(structure: &RelationalStructure) -> bool {
    let mut f = init_domains(structure, structure, &DomainMap::new(), true);
    let mut cache = PropagationCache::new();
    match enforce(
        structure,
        structure,
        &mut f,
        &mut cache,
        None,
        None,
        Deadline::unbounded(),
    ) {
        Ok(Closure::Stable) => f.iter().all(|(_, dom)| dom.len() == 1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_seed() -> DomainMap {
        DomainMap::new()
    }

    #[test]
    fn test_propagation_decides_the_path_query_negatively() {
        // Node 2 needs a successor image for node 3, but the target's sink
        // has no outgoing edge; propagation alone empties node 2's domain.
        let g = RelationalStructure::digraph(vec![(0, 1), (1, 2), (2, 3)]);
        let h = RelationalStructure::digraph(vec![(0, 1)]);
        let fast = QueryOptions {
            ac_only: true,
            ..QueryOptions::default()
        };
        assert_eq!(exists_hom(&g, &no_seed(), &h, &fast).unwrap(), Existence::Impossible);
        assert_eq!(
            exists_hom(&g, &no_seed(), &h, &QueryOptions::default()).unwrap(),
            Existence::Impossible
        );
    }

    #[test]
    fn test_fast_path_trusts_the_caller_guarantee() {
        // A directed 3-cycle does not map into a directed 2-cycle, but
        // propagation alone cannot see it: the fast path answers positively.
        // That is exactly the documented caller contract on `ac_only`.
        let g = RelationalStructure::digraph(vec![(0, 1), (1, 2), (2, 0)]);
        let h = RelationalStructure::digraph(vec![(0, 1), (1, 0)]);
        let fast = QueryOptions {
            ac_only: true,
            ..QueryOptions::default()
        };
        assert_eq!(exists_hom(&g, &no_seed(), &h, &fast).unwrap(), Existence::Exists);
        assert_eq!(
            exists_hom(&g, &no_seed(), &h, &QueryOptions::default()).unwrap(),
            Existence::Impossible
        );
    }

    #[test]
    fn test_components_are_tested_independently() {
        // 3-cycle plus an isolated node; the target is a single edge. The
        // isolated node maps fine, the cycle cannot.
        let g = RelationalStructure::digraph_with_nodes([3], vec![(0, 1), (1, 2), (2, 0)]);
        let h = RelationalStructure::digraph(vec![(0, 1)]);
        assert_eq!(
            exists_hom(&g, &no_seed(), &h, &QueryOptions::default()).unwrap(),
            Existence::Impossible
        );

        let isolated = RelationalStructure::digraph_with_nodes([3], vec![]);
        assert_eq!(
            exists_hom(&isolated, &no_seed(), &h, &QueryOptions::default()).unwrap(),
            Existence::Exists
        );
    }

    #[test]
    fn test_find_hom_merges_component_mappings() {
        let g = RelationalStructure::digraph_with_nodes([4], vec![(0, 1), (2, 3)]);
        let h = RelationalStructure::digraph(vec![(7, 8)]);
        match find_hom(&g, &no_seed(), &h, &QueryOptions::default()).unwrap() {
            SearchOutcome::Found(hom) => {
                assert_eq!(hom.map.len(), 5);
                assert!(hom.preserves(&g, &h));
            }
            other => panic!("expected a mapping, got {other:?}"),
        }
    }

    #[test]
    fn test_find_hom_rejects_malformed_seed() {
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(5, 6)]);
        let mut seed = DomainMap::new();
        seed.pin(99, 5);
        assert!(matches!(
            find_hom(&g, &seed, &h, &QueryOptions::default()),
            Err(SolveError::SeedNodeUnknown { node: 99 })
        ));
    }

    #[test]
    fn test_all_homs_enumerates_the_full_answer_set() {
        // A single edge maps into a directed 3-cycle in exactly 3 ways.
        let g = RelationalStructure::digraph(vec![(0, 1)]);
        let h = RelationalStructure::digraph(vec![(0, 1), (1, 2), (2, 0)]);
        let homs = all_homs(&g, &no_seed(), &h, &QueryOptions::default()).unwrap();
        assert_eq!(homs.len(), 3);
        for hom in &homs {
            assert!(hom.preserves(&g, &h));
        }
    }

    #[test]
    fn test_all_homs_combines_components_as_a_product() {
        // Two isolated nodes into a two-node target: 2 x 2 mappings.
        let g = RelationalStructure::digraph_with_nodes([0, 1], vec![]);
        let h = RelationalStructure::digraph_with_nodes([5, 6], vec![]);
        let homs = all_homs(&g, &no_seed(), &h, &QueryOptions::default()).unwrap();
        assert_eq!(homs.len(), 4);
    }

    #[test]
    fn test_hom_equivalence() {
        // The 6-cycle wraps onto the 3-cycle, but a 3-cycle cannot walk the
        // 6-cycle back to its start, so the pair is not equivalent.
        let c3 = RelationalStructure::digraph(vec![(0, 1), (1, 2), (2, 0)]);
        let c6 = RelationalStructure::digraph(vec![
            (0, 1),
            (1, 2),
            (2, 3),
            (3, 4),
            (4, 5),
            (5, 0),
        ]);
        assert_eq!(
            hom_equivalent(&c6, &c3, &QueryOptions::default()).unwrap(),
            Existence::Impossible
        );
        assert_eq!(
            hom_equivalent(&c3, &c3, &QueryOptions::default()).unwrap(),
            Existence::Exists
        );
    }

    #[test]
    fn test_tree_core_detection() {
        // An oriented path is its own core; two disjoint copies of an edge
        // are not (they retract onto one copy).
        let path = RelationalStructure::digraph(vec![(0, 1), (1, 2)]);
        assert!(is_tree_core(&path));

        let doubled = RelationalStructure::digraph(vec![(0, 1), (2, 3)]);
        assert!(!is_tree_core(&doubled));
    }
}
