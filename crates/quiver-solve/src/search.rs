//! Cascading backtracking search for total homomorphisms.
//!
//! [`extend`] takes a domain map, drives it to arc consistency, then
//! escalates through four strategies, each on its own copy of the consistent
//! state so a failed strategy cannot corrupt the next one:
//!
//! 1. Backtracking DFS on roughly a third of the remaining budget.
//! 2. Iterative-deepening DFS on roughly half of the remaining budget; a
//!    branch that outgrows the depth limit reports a distinguished
//!    "too deep" result, the limit is raised and the round retried up to a
//!    configured cap.
//! 3. First-fit greedy assignment without backtracking on roughly two thirds
//!    of the remaining budget; its failure proves nothing and escalates.
//! 4. Exhaustive backtracking DFS on whatever budget remains — the
//!    completeness fallback. Only its timeout reaches the caller.
//!
//! All DFS variants share the same engine: most-constrained variable first,
//! already-used target values first (biasing toward value reuse), one
//! incremental propagation pass seeded from each tentative assignment, and a
//! per-decision undo trail instead of copying state at every branch.

use std::collections::BTreeSet;
use std::time::Duration;

use quiver_structure::{DomainMap, NodeId, RelationalStructure};

use crate::consistency::{enforce, Closure, PropagationCache, Trail};
use crate::deadline::{Deadline, DeadlineExceeded};
use crate::Homomorphism;

/// Tuning knobs for the strategy cascade.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Extra iterative-deepening rounds before escalating past strategy 2.
    pub max_deepening_rounds: u32,
    /// Per-round budget for iterative deepening when the overall budget is
    /// unbounded.
    pub deepening_round_budget: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_deepening_rounds: 2,
            deepening_round_budget: Duration::from_secs(3),
        }
    }
}

/// Caller-visible result of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A valid total assignment.
    Found(Homomorphism),
    /// Proven: no extension of the given map exists.
    Unsatisfiable,
    /// The budget ran out before the question was settled.
    Inconclusive,
}

/// Result of one strategy probe.
enum Probe {
    Solved(Homomorphism),
    /// The subtree was fully explored without hitting the depth limit.
    Exhausted,
    /// Some branch was cut by the depth limit; exhaustion is not a proof.
    TooDeep,
}

/// Extend `f` to a total homomorphism from `source` into `target`, or prove
/// that none exists, within the deadline.
pub fn extend(
    source: &RelationalStructure,
    target: &RelationalStructure,
    mut f: DomainMap,
    cache: &mut PropagationCache,
    deadline: Deadline,
    config: &SearchConfig,
) -> SearchOutcome {
    match enforce(source, target, &mut f, cache, None, None, deadline) {
        Err(DeadlineExceeded) => return SearchOutcome::Inconclusive,
        Ok(Closure::Exhausted) => return SearchOutcome::Unsatisfiable,
        Ok(Closure::Stable) => {}
    }

    // Strategy 1: plain backtracking DFS.
    {
        let budget = deadline.fraction(1, 3);
        let mut state = f.clone();
        let mut used = BTreeSet::new();
        match dfs(source, target, &mut state, cache, &mut used, budget, 0, u32::MAX) {
            Ok(Probe::Solved(hom)) => return SearchOutcome::Found(hom),
            Ok(Probe::Exhausted) => return SearchOutcome::Unsatisfiable,
            Ok(Probe::TooDeep) | Err(DeadlineExceeded) => {}
        }
    }

    // Strategy 2: iterative deepening.
    {
        let overall = deadline.fraction(1, 2);
        let mut limit = 1u32;
        let mut rounds = 0u32;
        loop {
            let round_deadline = if overall.is_unbounded() {
                Deadline::within(config.deepening_round_budget)
            } else {
                overall
            };
            let mut state = f.clone();
            let mut used = BTreeSet::new();
            match dfs(
                source,
                target,
                &mut state,
                cache,
                &mut used,
                round_deadline,
                0,
                limit,
            ) {
                Ok(Probe::Solved(hom)) => return SearchOutcome::Found(hom),
                Ok(Probe::Exhausted) => return SearchOutcome::Unsatisfiable,
                Ok(Probe::TooDeep) => {
                    if rounds >= config.max_deepening_rounds {
                        break;
                    }
                    rounds += 1;
                    limit += 1;
                }
                Err(DeadlineExceeded) => break,
            }
            if overall.check().is_err() {
                break;
            }
        }
    }

    // Strategy 3: first-fit greedy, commitments are never undone.
    {
        let budget = deadline.fraction(2, 3);
        let mut state = f.clone();
        match greedy(source, target, &mut state, cache, budget) {
            Ok(Some(hom)) => return SearchOutcome::Found(hom),
            Ok(None) | Err(DeadlineExceeded) => {}
        }
    }

    // Strategy 4: exhaustive backtracking on the remaining budget.
    let mut used = BTreeSet::new();
    match dfs(source, target, &mut f, cache, &mut used, deadline, 0, u32::MAX) {
        Ok(Probe::Solved(hom)) => SearchOutcome::Found(hom),
        Ok(Probe::Exhausted) => SearchOutcome::Unsatisfiable,
        Ok(Probe::TooDeep) | Err(DeadlineExceeded) => SearchOutcome::Inconclusive,
    }
}

/// Recursive backtracking over an arc-consistent map.
///
/// On entry every domain is non-empty and consistent. `depth` counts
/// tentative assignments along the current branch; `limit` cuts branches for
/// iterative deepening. Timeouts abandon the map mid-branch — callers own a
/// strategy-local copy and discard it on escalation.
#[allow(clippy::too_many_arguments)]
fn dfs(
    source: &RelationalStructure,
    target: &RelationalStructure,
    f: &mut DomainMap,
    cache: &mut PropagationCache,
    used: &mut BTreeSet<NodeId>,
    deadline: Deadline,
    depth: u32,
    limit: u32,
) -> Result<Probe, DeadlineExceeded> {
    deadline.check()?;

    let Some(node) = f.smallest_open() else {
        return Ok(match f.as_assignment() {
            Some(map) => Probe::Solved(Homomorphism { map }),
            None => Probe::Exhausted,
        });
    };
    if depth >= limit {
        return Ok(Probe::TooDeep);
    }

    let Some(domain) = f.get(node).cloned() else {
        return Ok(Probe::Exhausted);
    };

    let mut cut_by_depth = false;
    for value in ordered_candidates(&domain, used) {
        let mut trail = Trail::new();
        trail.record_change(node, domain.clone());
        f.pin(node, value);
        let worklist = BTreeSet::from([node]);
        let closure = enforce(
            source,
            target,
            f,
            cache,
            Some(&worklist),
            Some(&mut trail),
            deadline,
        )?;
        if closure == Closure::Exhausted {
            trail.rollback(f);
            continue;
        }

        let fresh = used.insert(value);
        let probe = dfs(source, target, f, cache, used, deadline, depth + 1, limit);
        if fresh {
            used.remove(&value);
        }
        match probe? {
            Probe::Solved(hom) => return Ok(Probe::Solved(hom)),
            Probe::TooDeep => {
                cut_by_depth = true;
                trail.rollback(f);
            }
            Probe::Exhausted => trail.rollback(f),
        }
    }

    Ok(if cut_by_depth {
        Probe::TooDeep
    } else {
        Probe::Exhausted
    })
}

/// First-fit greedy assignment: commit to the first candidate that survives
/// propagation, never revisit a commitment. Fails on the first node where no
/// candidate survives — which proves nothing about other assignment orders.
fn greedy(
    source: &RelationalStructure,
    target: &RelationalStructure,
    f: &mut DomainMap,
    cache: &mut PropagationCache,
    deadline: Deadline,
) -> Result<Option<Homomorphism>, DeadlineExceeded> {
    let mut used: BTreeSet<NodeId> = BTreeSet::new();
    loop {
        deadline.check()?;

        let Some(node) = f.smallest_open() else {
            return Ok(f.as_assignment().map(|map| Homomorphism { map }));
        };
        let Some(domain) = f.get(node).cloned() else {
            return Ok(None);
        };

        let mut committed = false;
        for value in ordered_candidates(&domain, &used) {
            let mut trail = Trail::new();
            trail.record_change(node, domain.clone());
            f.pin(node, value);
            let worklist = BTreeSet::from([node]);
            match enforce(
                source,
                target,
                f,
                cache,
                Some(&worklist),
                Some(&mut trail),
                deadline,
            )? {
                Closure::Stable => {
                    used.insert(value);
                    committed = true;
                    break;
                }
                Closure::Exhausted => trail.rollback(f),
            }
        }
        if !committed {
            return Ok(None);
        }
    }
}

/// Candidates with already-used target values first, ascending id within
/// each group.
fn ordered_candidates(domain: &BTreeSet<NodeId>, used: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let mut ordered: Vec<NodeId> = domain.iter().copied().filter(|v| used.contains(v)).collect();
    ordered.extend(domain.iter().copied().filter(|v| !used.contains(v)));
    ordered
}
