// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Partial-Order Solver (component G): orders candidate migration groups
//! by their mutual dependency constraints, contracts strongly-connected
//! components with an iterative Tarjan (§9 "recursive installability check"
//! design note applies equally here: no recursion on the SCC search), and
//! linearises the contracted graph into a migration schedule (§4.G).

use std::collections::{HashMap, HashSet};

use crate::model::MigrationItem;
use crate::universe::{BinaryIdx, PackageUniverse};

/// One candidate migration: the binaries it would add and the binaries it
/// would remove from the target, computed by whoever assembles the batch
/// from accepted excuses.
#[derive(Debug, Clone)]
pub struct Group {
    pub item: MigrationItem,
    pub adds: HashSet<BinaryIdx>,
    pub removes: HashSet<BinaryIdx>,
}

/// A contracted strongly-connected component: one or more groups that must
/// migrate atomically.
#[derive(Debug, Clone)]
pub struct Scc {
    pub members: Vec<usize>,
}

/// Build the `before`/`after` constraint graph over group indices (§4.G
/// step 1). `present` is the target's current present set (before any of
/// these groups have been applied), used to decide whether a clause is
/// "still satisfied" without the binaries a group is taking out.
pub fn build_constraints(groups: &[Group], universe: &PackageUniverse, present: &HashSet<BinaryIdx>) -> Vec<HashSet<usize>> {
    let n = groups.len();
    let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); n];

    // idx -> group that adds/removes it, for groups that touch this binary.
    let mut adders: HashMap<BinaryIdx, usize> = HashMap::new();
    let mut removers: HashMap<BinaryIdx, usize> = HashMap::new();
    for (gi, g) in groups.iter().enumerate() {
        for &a in &g.adds {
            adders.insert(a, gi);
        }
        for &r in &g.removes {
            removers.insert(r, gi);
        }
    }

    let going_out: HashSet<BinaryIdx> = groups.iter().flat_map(|g| g.removes.iter().copied()).collect();
    let remains_present = |idx: BinaryIdx| present.contains(&idx) && !going_out.contains(&idx);

    let mut add_edge = |edges: &mut Vec<HashSet<usize>>, before: usize, after: usize| {
        if before != after {
            edges[before].insert(after);
        }
    };

    for (gi, g) in groups.iter().enumerate() {
        // Removed binaries: anything that still rdeps on them and isn't
        // satisfied some other way wants this group to go last relative to
        // whichever group supplies the replacement.
        for &removed in &g.removes {
            for &r in universe.relations(removed).reverse_deps.iter() {
                if going_out.contains(&r) {
                    continue;
                }
                let still_satisfied = universe
                    .relations(r)
                    .depends
                    .iter()
                    .all(|clause| clause.iter().any(|&c| c != removed && remains_present(c)));
                if still_satisfied {
                    continue;
                }
                if let Some(&other) = adders.get(&r) {
                    add_edge(&mut edges, gi, other);
                }
            }
        }

        // Added binaries: for every clause not already satisfied by what
        // stays present, whichever group supplies a candidate solver must
        // run before us; whichever group is removing a candidate we were
        // relying on must run after us.
        for &added in &g.adds {
            for clause in universe.relations(added).depends.iter() {
                let satisfied = clause.iter().any(|&c| remains_present(c));
                if satisfied {
                    continue;
                }
                for &candidate in clause.iter() {
                    if let Some(&supplier) = adders.get(&candidate) {
                        add_edge(&mut edges, supplier, gi);
                    }
                    if let Some(&remover) = removers.get(&candidate) {
                        add_edge(&mut edges, gi, remover);
                    }
                }
            }
        }

        // Conflicts dropped by this group (in removes, not in adds): the
        // group that adds the formerly-conflicting package must come after.
        for &removed in &g.removes {
            if g.adds.contains(&removed) {
                continue;
            }
            for &conflicting in universe.relations(removed).negative_deps.iter() {
                if let Some(&other) = adders.get(&conflicting) {
                    add_edge(&mut edges, gi, other);
                }
            }
        }
    }

    edges
}

/// Iterative (explicit-stack) Tarjan's algorithm: contracts `edges` into
/// strongly-connected components, returned in reverse-topological order
/// (as Tarjan naturally produces, later reversed by [`linearize`]).
pub fn tarjan_scc(edges: &[HashSet<usize>]) -> Vec<Scc> {
    let n = edges.len();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Scc> = Vec::new();

    for start in 0..n {
        if index[start] != usize::MAX {
            continue;
        }
        // Explicit work stack of (node, next-neighbour-cursor) pairs.
        let mut work: Vec<(usize, usize)> = vec![(start, 0)];
        index[start] = next_index;
        lowlink[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(&mut (v, ref mut cursor)) = work.last_mut() {
            let neighbours: Vec<usize> = edges[v].iter().copied().collect();
            if *cursor < neighbours.len() {
                let w = neighbours[*cursor];
                *cursor += 1;
                if index[w] == usize::MAX {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut members = Vec::new();
                    loop {
                        let w = stack.pop().expect("scc stack not empty");
                        on_stack[w] = false;
                        members.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(Scc { members });
                }
            }
        }
    }

    sccs
}

/// Linearise the SCC-contracted graph (§4.G step 3): seed with SCCs that
/// have no predecessors, smallest first, then repeatedly emit and enqueue
/// newly-freed successors. Returns the migration schedule as a list of SCCs.
pub fn linearize(groups: &[Group], edges: &[HashSet<usize>], sccs: Vec<Scc>) -> Vec<Scc> {
    let mut owner: Vec<usize> = vec![0; groups.len()];
    for (si, scc) in sccs.iter().enumerate() {
        for &m in &scc.members {
            owner[m] = si;
        }
    }

    let num_sccs = sccs.len();
    let mut scc_edges: Vec<HashSet<usize>> = vec![HashSet::new(); num_sccs];
    let mut indegree = vec![0usize; num_sccs];
    for (gi, outs) in edges.iter().enumerate() {
        for &to in outs {
            let (a, b) = (owner[gi], owner[to]);
            if a != b && scc_edges[a].insert(b) {
                indegree[b] += 1;
            }
        }
    }

    let mut ready: Vec<usize> = (0..num_sccs).filter(|&i| indegree[i] == 0).collect();
    ready.sort_by_key(|&i| sccs[i].members.len());

    let mut schedule = Vec::with_capacity(num_sccs);
    let mut emitted = vec![false; num_sccs];
    let mut frontier = ready;
    while !frontier.is_empty() {
        frontier.sort_by_key(|&i| sccs[i].members.len());
        let next = frontier.remove(0);
        emitted[next] = true;
        schedule.push(next);
        for &succ in &scc_edges[next] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 && !emitted[succ] {
                frontier.push(succ);
            }
        }
    }

    schedule.into_iter().map(|i| sccs[i].clone()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acyclic_graph_is_topologically_ordered() {
        // 0 -> 1 -> 2
        let edges = vec![HashSet::from([1]), HashSet::from([2]), HashSet::new()];
        let sccs = tarjan_scc(&edges);
        assert_eq!(sccs.len(), 3);
        let groups = vec![
            Group { item: dummy_item("a"), adds: HashSet::new(), removes: HashSet::new() },
            Group { item: dummy_item("b"), adds: HashSet::new(), removes: HashSet::new() },
            Group { item: dummy_item("c"), adds: HashSet::new(), removes: HashSet::new() },
        ];
        let schedule = linearize(&groups, &edges, sccs);
        let positions: HashMap<usize, usize> = schedule
            .iter()
            .enumerate()
            .flat_map(|(pos, scc)| scc.members.iter().map(move |&m| (m, pos)))
            .collect();
        assert!(positions[&0] < positions[&1]);
        assert!(positions[&1] < positions[&2]);
    }

    #[test]
    fn cycle_is_contracted_to_one_scc() {
        // 0 <-> 1, both depend on each other.
        let edges = vec![HashSet::from([1]), HashSet::from([0])];
        let sccs = tarjan_scc(&edges);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].members.len(), 2);
    }

    fn dummy_item(name: &str) -> MigrationItem {
        MigrationItem::parse(name, &assorted_debian_utils::version::PackageVersion::try_from("1").unwrap(), "unstable").unwrap()
    }
}
