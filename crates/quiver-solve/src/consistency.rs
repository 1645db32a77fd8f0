//! Arc-consistency propagation over candidate domains.
//!
//! [`enforce`] prunes a [`DomainMap`] to the unique maximal sub-map in which
//! every edge constraint is supported in both directions: for every source
//! edge `(u, v)` in relation `i`, every candidate of `u` has some successor
//! among the candidates of `v` in target relation `i`, and every candidate of
//! `v` has some predecessor among the candidates of `u`.
//!
//! The engine is a worklist propagator. Two node sets drive it: a priority
//! set holding nodes whose domain shrank most recently, and a default set
//! holding everything still to visit. Nodes pop in ascending id order,
//! priority set first; only the fixpoint is a contract, not the visit order.
//! Multi-relational structures repeat whole single-relation passes until a
//! full round changes nothing — relations interact only through the shared
//! domains.
//!
//! Failure is terminal: as soon as any domain empties, the whole map is wiped
//! to the all-nodes-empty marker and [`Closure::Exhausted`] is returned.

use std::collections::{BTreeSet, HashMap};

use quiver_structure::{DomainMap, NodeId, RelationalStructure};

use crate::deadline::{Deadline, DeadlineExceeded};

/// Outcome of a propagation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// A fixpoint was reached with every domain non-empty.
    Stable,
    /// Some domain emptied; the map has been wiped to the all-empty marker.
    Exhausted,
}

/// Memo of forward/backward images per candidate set, per relation.
///
/// Keyed by `(relation index, sorted candidate snapshot)` so the key is
/// immutable and hashable regardless of how the live domain later shrinks.
/// The cached images are a pure function of the target structure: one cache
/// may serve an entire query session, but it must be discarded when the
/// target changes.
#[derive(Debug, Default)]
pub struct PropagationCache {
    images: HashMap<(usize, Vec<NodeId>), CachedImages>,
}

#[derive(Debug, Clone)]
struct CachedImages {
    forward: BTreeSet<NodeId>,
    backward: BTreeSet<NodeId>,
}

impl PropagationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Drop every cached image. Required whenever the target changes.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Union of target successors (forward) and predecessors (backward) over
    /// all candidates, memoized.
    fn images(
        &mut self,
        relation: usize,
        candidates: &BTreeSet<NodeId>,
        target: &RelationalStructure,
    ) -> &CachedImages {
        let key = (relation, candidates.iter().copied().collect::<Vec<_>>());
        self.images.entry(key).or_insert_with(|| {
            let rel = target.relation(relation);
            let mut forward = BTreeSet::new();
            let mut backward = BTreeSet::new();
            for &h in candidates {
                forward.extend(rel.successors(h));
                backward.extend(rel.predecessors(h));
            }
            CachedImages { forward, backward }
        })
    }
}

/// Undo log for one tentative decision.
///
/// Records each domain's prior value the moment it shrinks; rolling back
/// replays the records in reverse, restoring the map to its pre-decision
/// state without ever copying it wholesale.
#[derive(Debug, Default)]
pub struct Trail {
    entries: Vec<TrailEntry>,
}

#[derive(Debug)]
enum TrailEntry {
    Changed(NodeId, BTreeSet<NodeId>),
    Inserted(NodeId),
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_change(&mut self, node: NodeId, prior: BTreeSet<NodeId>) {
        self.entries.push(TrailEntry::Changed(node, prior));
    }

    pub fn record_insert(&mut self, node: NodeId) {
        self.entries.push(TrailEntry::Inserted(node));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restore `f` to its state before this trail's decision.
    pub fn rollback(mut self, f: &mut DomainMap) {
        while let Some(entry) = self.entries.pop() {
            match entry {
                TrailEntry::Changed(node, prior) => {
                    f.insert(node, prior);
                }
                TrailEntry::Inserted(node) => {
                    f.remove(node);
                }
            }
        }
    }
}

/// Initialize domains for a query: seeded nodes keep their candidate sets,
/// everything else starts at the full target node set. With `loop_filter`,
/// a source node carrying a self-loop in relation `i` starts restricted to
/// target nodes that also carry a self-loop in relation `i` — a cheap, sound
/// pre-filter.
pub fn init_domains(
    source: &RelationalStructure,
    target: &RelationalStructure,
    seed: &DomainMap,
    loop_filter: bool,
) -> DomainMap {
    let mut f = seed.clone();
    if loop_filter {
        let arity = source.relation_count().min(target.relation_count());
        for index in 0..arity {
            let loops: BTreeSet<NodeId> = target
                .nodes()
                .filter(|&h| target.relation(index).has_loop(h))
                .collect();
            for v in source.nodes() {
                if !source.relation(index).has_loop(v) {
                    continue;
                }
                let dom = match f.get(v) {
                    Some(dom) => dom.intersection(&loops).copied().collect(),
                    None => loops.clone(),
                };
                f.insert(v, dom);
            }
        }
    }
    for v in source.nodes() {
        if !f.contains(v) {
            f.insert(v, target.node_set().clone());
        }
    }
    f
}

/// Prune `f` to its maximal arc-consistent closure.
///
/// Nodes missing from `f` are implicitly initialized to the full target node
/// set. `seed` scopes the initial worklist to the given nodes (incremental
/// propagation after a single assignment); `None` schedules everything.
/// Every shrink is recorded on `trail` when one is supplied, so a caller can
/// roll the decision back. The deadline is consulted once per propagation
/// round.
#[allow(clippy::too_many_arguments)]
pub fn enforce(
    source: &RelationalStructure,
    target: &RelationalStructure,
    f: &mut DomainMap,
    cache: &mut PropagationCache,
    seed: Option<&BTreeSet<NodeId>>,
    mut trail: Option<&mut Trail>,
    deadline: Deadline,
) -> Result<Closure, DeadlineExceeded> {
    if source.relation_count() != target.relation_count() {
        wipe(source, f, trail.as_deref_mut());
        return Ok(Closure::Exhausted);
    }

    for v in source.nodes() {
        if !f.contains(v) {
            if let Some(t) = trail.as_deref_mut() {
                t.record_insert(v);
            }
            f.insert(v, target.node_set().clone());
        }
    }
    if f.has_empty() {
        wipe(source, f, trail.as_deref_mut());
        return Ok(Closure::Exhausted);
    }

    match source.relation_count() {
        0 => Ok(Closure::Stable),
        1 => {
            match propagate_relation(0, source, target, f, cache, seed, trail, deadline)? {
                Pass::Exhausted => Ok(Closure::Exhausted),
                Pass::Done { .. } => Ok(Closure::Stable),
            }
        }
        arity => {
            // Relations only interact through the shared domains, so a full
            // pass per relation, iterated to a fixpoint, reaches the joint
            // closure. The seed worklist is not usable across passes.
            loop {
                deadline.check()?;
                let mut changed = false;
                for index in 0..arity {
                    match propagate_relation(
                        index,
                        source,
                        target,
                        f,
                        cache,
                        None,
                        trail.as_deref_mut(),
                        deadline,
                    )? {
                        Pass::Exhausted => return Ok(Closure::Exhausted),
                        Pass::Done { changed: pass_changed } => changed |= pass_changed,
                    }
                }
                if !changed {
                    return Ok(Closure::Stable);
                }
            }
        }
    }
}

enum Pass {
    Done { changed: bool },
    Exhausted,
}

/// One single-relation worklist run to its fixpoint.
#[allow(clippy::too_many_arguments)]
fn propagate_relation(
    relation: usize,
    source: &RelationalStructure,
    target: &RelationalStructure,
    f: &mut DomainMap,
    cache: &mut PropagationCache,
    seed: Option<&BTreeSet<NodeId>>,
    mut trail: Option<&mut Trail>,
    deadline: Deadline,
) -> Result<Pass, DeadlineExceeded> {
    deadline.check()?;

    let (mut priority, mut pending) = match seed {
        Some(worklist) => (worklist.clone(), worklist.clone()),
        None => (BTreeSet::new(), source.node_set().clone()),
    };

    let mut changed = false;
    while let Some(v) = pop_next(&mut priority, &mut pending) {
        let Some(candidates) = f.get(v) else {
            continue;
        };
        let images = cache.images(relation, candidates, target);

        for u in source.relation(relation).successors(v) {
            let Some(dom) = f.get(u) else {
                continue;
            };
            if dom.is_subset(&images.forward) {
                continue;
            }
            let prior = dom.clone();
            let shrunk: BTreeSet<NodeId> =
                prior.intersection(&images.forward).copied().collect();
            let emptied = shrunk.is_empty();
            if let Some(t) = trail.as_deref_mut() {
                t.record_change(u, prior);
            }
            f.insert(u, shrunk);
            changed = true;
            if emptied {
                wipe(source, f, trail.as_deref_mut());
                return Ok(Pass::Exhausted);
            }
            priority.insert(u);
        }

        for u in source.relation(relation).predecessors(v) {
            let Some(dom) = f.get(u) else {
                continue;
            };
            if dom.is_subset(&images.backward) {
                continue;
            }
            let prior = dom.clone();
            let shrunk: BTreeSet<NodeId> =
                prior.intersection(&images.backward).copied().collect();
            let emptied = shrunk.is_empty();
            if let Some(t) = trail.as_deref_mut() {
                t.record_change(u, prior);
            }
            f.insert(u, shrunk);
            changed = true;
            if emptied {
                wipe(source, f, trail.as_deref_mut());
                return Ok(Pass::Exhausted);
            }
            priority.insert(u);
        }
    }

    Ok(Pass::Done { changed })
}

/// Pop the next node, priority set first, ascending id within each set.
fn pop_next(priority: &mut BTreeSet<NodeId>, pending: &mut BTreeSet<NodeId>) -> Option<NodeId> {
    if let Some(v) = priority.pop_first() {
        pending.remove(&v);
        return Some(v);
    }
    pending.pop_first()
}

/// Set every source node's domain to the empty set — the failure marker.
fn wipe(source: &RelationalStructure, f: &mut DomainMap, trail: Option<&mut Trail>) {
    let Some(trail) = trail else {
        f.wipe(source.nodes());
        return;
    };
    for v in source.nodes() {
        match f.remove(v) {
            Some(prior) => trail.record_change(v, prior),
            None => trail.record_insert(v),
        }
        f.insert(v, BTreeSet::new());
    }
}

/// Singleton refinement: delete any candidate whose tentative assignment
/// exhausts under propagation, iterating to a fixpoint. Strictly stronger
/// than plain arc consistency, and much more expensive — every remaining
/// candidate is probed on a scratch copy of the map.
pub fn singleton_enforce(
    source: &RelationalStructure,
    target: &RelationalStructure,
    f: &mut DomainMap,
    cache: &mut PropagationCache,
    deadline: Deadline,
) -> Result<Closure, DeadlineExceeded> {
    loop {
        if enforce(source, target, f, cache, None, None, deadline)? == Closure::Exhausted {
            return Ok(Closure::Exhausted);
        }
        let mut unsupported = None;
        'scan: for v in f.nodes().collect::<Vec<_>>() {
            let Some(candidates) = f.get(v).cloned() else {
                continue;
            };
            for u in candidates {
                deadline.check()?;
                let mut probe = f.clone();
                probe.pin(v, u);
                let worklist = BTreeSet::from([v]);
                if enforce(source, target, &mut probe, cache, Some(&worklist), None, deadline)?
                    == Closure::Exhausted
                {
                    unsupported = Some((v, u));
                    break 'scan;
                }
            }
        }
        match unsupported {
            Some((v, u)) => {
                let Some(dom) = f.get(v) else {
                    continue;
                };
                let mut dom = dom.clone();
                dom.remove(&u);
                f.insert(v, dom);
            }
            None => return Ok(Closure::Stable),
        }
    }
}
