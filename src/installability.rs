// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Installability Tester (component B): answers "is binary B
//! installable in the current present set?" with a backtracking,
//! iterative (explicit-stack) search over the CNF dependency model,
//! memoizing successes and failures and reducing equivalent alternatives to
//! a single representative (§4.B, §9 "recursive installability check"
//! design note).

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use assorted_debian_utils::architectures::Architecture;
use log::trace;

use crate::error::{Error, Result};
use crate::model::BinaryId;
use crate::universe::{BinaryIdx, PackageUniverse};

/// Observability counters maintained by the tester; plain struct fields
/// rather than a logging side-channel, per SPEC_FULL §4.B.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_drops: u64,
    pub backtrack_points_created: u64,
    pub backtrack_points_used: u64,
    pub equivalence_reductions: u64,
    pub conflicts_with_essential: u64,
}

#[derive(Debug, Clone)]
struct SearchState {
    musts: HashSet<BinaryIdx>,
    never: HashSet<BinaryIdx>,
    choices: Vec<Rc<[BinaryIdx]>>,
}

enum Propagated {
    Conflict,
    Success,
    HasChoices,
}

/// The forced-dependency closure of all essential packages present on an
/// architecture, precomputed and cached (§4.B "pseudo-essential set").
#[derive(Debug, Clone, Default)]
struct PseudoEssential {
    musts: HashSet<BinaryIdx>,
    never: HashSet<BinaryIdx>,
    choices: Vec<Rc<[BinaryIdx]>>,
}

struct ChoicePoint {
    state: SearchState,
    candidates: Vec<BinaryIdx>,
}

#[derive(Debug)]
pub struct InstallabilityTester {
    universe: Rc<PackageUniverse>,
    present: HashSet<BinaryIdx>,
    installable_cache: HashMap<BinaryIdx, bool>,
    pseudo_essential: HashMap<Architecture, PseudoEssential>,
    pub stats: Stats,
}

impl std::fmt::Debug for PseudoEssential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoEssential")
            .field("musts", &self.musts.len())
            .field("never", &self.never.len())
            .field("choices", &self.choices.len())
            .finish()
    }
}

impl InstallabilityTester {
    pub fn new(universe: Rc<PackageUniverse>) -> Self {
        Self {
            universe,
            present: HashSet::new(),
            installable_cache: HashMap::new(),
            pseudo_essential: HashMap::new(),
            stats: Stats::default(),
        }
    }

    pub fn is_pkg_present(&self, id: &BinaryId) -> bool {
        self.universe.idx(id).is_some_and(|idx| self.present.contains(&idx))
    }

    pub fn any_of_these_are_in_present(&self, ids: &[BinaryId]) -> bool {
        ids.iter().any(|id| self.is_pkg_present(id))
    }

    pub fn are_equivalent(&self, a: &BinaryId, b: &BinaryId) -> bool {
        let (Some(a), Some(b)) = (self.universe.idx(a), self.universe.idx(b)) else {
            return false;
        };
        if a == b {
            return true;
        }
        self.universe.relations(a).equivalence_class.contains(&b)
    }

    pub fn add_binary(&mut self, id: &BinaryId) {
        if let Some(idx) = self.universe.idx(id) {
            self.present.insert(idx);
        }
        self.invalidate_all();
    }

    pub fn remove_binary(&mut self, id: &BinaryId) {
        if let Some(idx) = self.universe.idx(id) {
            self.present.remove(&idx);
        }
        self.invalidate_all();
    }

    pub fn invalidate_pseudo_essential(&mut self, arch: Architecture) {
        self.pseudo_essential.remove(&arch);
    }

    fn invalidate_all(&mut self) {
        self.installable_cache.clear();
        self.stats.cache_drops += 1;
    }

    /// `is_installable(id) → bool`: see §4.B's contract. Not an error for a
    /// package to be uninstallable; `Err` is reserved for unknown packages.
    pub fn is_installable(&mut self, id: &BinaryId) -> Result<bool> {
        let idx = self
            .universe
            .idx(id)
            .ok_or_else(|| Error::UnknownPackage(Box::new(id.clone())))?;
        self.is_installable_idx(idx)
    }

    fn is_installable_idx(&mut self, idx: BinaryIdx) -> Result<bool> {
        if let Some(&cached) = self.installable_cache.get(&idx) {
            self.stats.cache_hits += 1;
            return Ok(cached);
        }
        self.stats.cache_misses += 1;

        if !self.present.contains(&idx) || self.universe.is_broken(idx) {
            self.installable_cache.insert(idx, false);
            return Ok(false);
        }

        let arch = self.universe.id(idx).architecture;
        let pseudo = self.pseudo_essential(arch);
        let mut initial = SearchState {
            musts: pseudo.musts.clone(),
            never: pseudo.never.clone(),
            choices: pseudo.choices.clone(),
        };
        initial.musts.insert(idx);

        let result = self.search(initial);
        self.installable_cache.insert(idx, result);
        Ok(result)
    }

    fn pseudo_essential(&mut self, arch: Architecture) -> PseudoEssential {
        if let Some(cached) = self.pseudo_essential.get(&arch) {
            return cached.clone();
        }
        let musts: HashSet<BinaryIdx> = self
            .present
            .iter()
            .copied()
            .filter(|&idx| self.universe.is_essential(idx) && self.universe.id(idx).architecture == arch)
            .collect();
        let mut state = SearchState {
            musts,
            never: HashSet::new(),
            choices: Vec::new(),
        };
        // Run propagation once; any conflict just means this architecture's
        // essential set is itself broken, which the real solver will also
        // observe later. We still record whatever choices remain open.
        let _ = self.propagate(&mut state);
        let pseudo = PseudoEssential {
            musts: state.musts,
            never: state.never,
            choices: state.choices,
        };
        self.pseudo_essential.insert(arch, pseudo.clone());
        pseudo
    }

    /// Collapse equivalence-class duplicates in a disjunction down to one
    /// representative each (§4.B "equivalence reduction").
    fn equivalence_reduce(&mut self, members: &[BinaryIdx]) -> Vec<BinaryIdx> {
        let mut seen_classes: HashSet<BinaryIdx> = HashSet::new();
        let mut out = Vec::with_capacity(members.len());
        for &m in members {
            let rel = self.universe.relations(m);
            let representative = rel.equivalence_class.iter().copied().min().unwrap_or(m);
            if seen_classes.insert(representative) {
                out.push(m);
            } else {
                self.stats.equivalence_reductions += 1;
            }
        }
        out.sort_unstable();
        out
    }

    /// Unit-propagate `musts`/`never`/`choices` to a fixpoint (§4.B "main
    /// loop"). Returns the post-propagation outcome.
    fn propagate(&mut self, state: &mut SearchState) -> Propagated {
        let mut processed: HashSet<BinaryIdx> = HashSet::new();
        let mut changed = true;
        while changed {
            changed = false;

            let pending: Vec<BinaryIdx> = state
                .musts
                .iter()
                .copied()
                .filter(|m| !processed.contains(m))
                .collect();
            for m in pending {
                processed.insert(m);
                if state.never.contains(&m) {
                    self.stats.conflicts_with_essential += 1;
                    return Propagated::Conflict;
                }
                let rel = self.universe.relations(m);
                for &neg in rel.negative_deps.iter() {
                    if state.musts.contains(&neg) {
                        return Propagated::Conflict;
                    }
                    if state.never.insert(neg) {
                        changed = true;
                    }
                }
                let clauses: Vec<Rc<[BinaryIdx]>> = rel.depends.to_vec();
                for clause in clauses {
                    let remaining: Vec<BinaryIdx> = clause
                        .iter()
                        .copied()
                        .filter(|c| self.present.contains(c) && !state.never.contains(c))
                        .collect();
                    if remaining.is_empty() {
                        return Propagated::Conflict;
                    }
                    let reduced = self.equivalence_reduce(&remaining);
                    if reduced.len() == 1 {
                        if state.musts.insert(reduced[0]) {
                            changed = true;
                        }
                    } else {
                        let as_rc: Rc<[BinaryIdx]> = Rc::from(reduced.into_boxed_slice());
                        if !state.choices.iter().any(|c| c.as_ref() == as_rc.as_ref()) {
                            state.choices.push(as_rc);
                        }
                    }
                }
            }

            // Re-filter previously-registered choices: newly-added `never`
            // members may shrink or resolve them.
            let mut still_open: Vec<Rc<[BinaryIdx]>> = Vec::with_capacity(state.choices.len());
            for clause in std::mem::take(&mut state.choices) {
                let remaining: Vec<BinaryIdx> = clause
                    .iter()
                    .copied()
                    .filter(|c| self.present.contains(c) && !state.never.contains(c))
                    .collect();
                if remaining.is_empty() {
                    return Propagated::Conflict;
                } else if remaining.len() == 1 {
                    if state.musts.insert(remaining[0]) {
                        changed = true;
                    }
                } else if remaining.len() == clause.len() {
                    still_open.push(clause);
                } else {
                    changed = true;
                    still_open.push(Rc::from(remaining.into_boxed_slice()));
                }
            }
            state.choices = still_open;
        }

        if state.musts.iter().any(|m| state.never.contains(m)) {
            Propagated::Conflict
        } else if state.choices.is_empty() {
            Propagated::Success
        } else {
            Propagated::HasChoices
        }
    }

    /// Pick the smallest pending choice (ties broken by the lowest member,
    /// for determinism across runs).
    fn pick_smallest(choices: &[Rc<[BinaryIdx]>]) -> usize {
        choices
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| (c.len(), c.first().copied().unwrap_or(BinaryIdx::MAX)))
            .map(|(i, _)| i)
            .expect("choices is non-empty")
    }

    /// Iterative (explicit-stack) DPLL-style search: see §4.B and the §9
    /// design note mandating an explicit work stack over recursion.
    fn search(&mut self, initial: SearchState) -> bool {
        let mut stack: Vec<ChoicePoint> = Vec::new();
        let mut state = initial;
        loop {
            match self.propagate(&mut state) {
                Propagated::Success => {
                    for &m in &state.musts {
                        self.installable_cache.insert(m, true);
                    }
                    return true;
                }
                Propagated::HasChoices => {
                    let ci = Self::pick_smallest(&state.choices);
                    let clause = state.choices.remove(ci);
                    let mut candidates = self.equivalence_reduce(&clause);
                    candidates.sort_unstable();
                    let first = candidates.remove(0);
                    if !candidates.is_empty() {
                        self.stats.backtrack_points_created += 1;
                        stack.push(ChoicePoint {
                            state: state.clone(),
                            candidates,
                        });
                    }
                    state.musts.insert(first);
                }
                Propagated::Conflict => match stack.pop() {
                    None => return false,
                    Some(mut cp) => {
                        self.stats.backtrack_points_used += 1;
                        let c = cp.candidates.remove(0);
                        state = cp.state.clone();
                        if !cp.candidates.is_empty() {
                            stack.push(cp);
                        }
                        state.musts.insert(c);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{BinaryPackage, MultiArch, SuiteClass};
    use crate::suite::Suite;
    use assorted_debian_utils::{package::PackageName, version::PackageVersion};

    fn n(s: &str) -> PackageName {
        PackageName::try_from(s).unwrap()
    }
    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn pkg(name: &str, version: &str, depends: Vec<Vec<crate::model::RelationTerm>>) -> BinaryPackage {
        BinaryPackage {
            id: BinaryId::new(n(name), v(version), Architecture::Amd64),
            source_name: n(name),
            source_version: v(version),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends,
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        }
    }

    fn term(name: &str) -> crate::model::RelationTerm {
        crate::model::RelationTerm {
            name: n(name),
            constraint: None,
        }
    }

    #[test]
    fn simple_chain_is_installable() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(pkg("a", "1", vec![vec![term("b")]]));
        suite.insert_binary(pkg("b", "1", vec![]));
        let universe = Rc::new(PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap());
        let mut tester = InstallabilityTester::new(universe.clone());
        let a = BinaryId::new(n("a"), v("1"), Architecture::Amd64);
        let b = BinaryId::new(n("b"), v("1"), Architecture::Amd64);
        tester.add_binary(&a);
        tester.add_binary(&b);
        assert!(tester.is_installable(&a).unwrap());
        assert!(tester.is_installable(&b).unwrap());
    }

    #[test]
    fn missing_dependency_is_not_installable() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(pkg("a", "1", vec![vec![term("missing")]]));
        let universe = Rc::new(PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap());
        let mut tester = InstallabilityTester::new(universe);
        let a = BinaryId::new(n("a"), v("1"), Architecture::Amd64);
        tester.add_binary(&a);
        assert!(!tester.is_installable(&a).unwrap());
    }

    #[test]
    fn not_present_is_not_installable() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(pkg("a", "1", vec![]));
        let universe = Rc::new(PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap());
        let mut tester = InstallabilityTester::new(universe);
        let a = BinaryId::new(n("a"), v("1"), Architecture::Amd64);
        assert!(!tester.is_installable(&a).unwrap());
    }

    #[test]
    fn alternative_dependency_picks_present_branch() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(pkg("a", "1", vec![vec![term("b"), term("c")]]));
        suite.insert_binary(pkg("c", "1", vec![]));
        let universe = Rc::new(PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap());
        let mut tester = InstallabilityTester::new(universe);
        let a = BinaryId::new(n("a"), v("1"), Architecture::Amd64);
        let c = BinaryId::new(n("c"), v("1"), Architecture::Amd64);
        tester.add_binary(&a);
        tester.add_binary(&c);
        assert!(tester.is_installable(&a).unwrap());
        trace!("picked c over absent b");
    }

    #[test]
    fn remove_then_readd_restores_observable_state() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(pkg("a", "1", vec![]));
        let universe = Rc::new(PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap());
        let mut tester = InstallabilityTester::new(universe);
        let a = BinaryId::new(n("a"), v("1"), Architecture::Amd64);
        tester.add_binary(&a);
        assert!(tester.is_installable(&a).unwrap());
        tester.remove_binary(&a);
        assert!(!tester.is_installable(&a).unwrap());
        tester.add_binary(&a);
        assert!(tester.is_installable(&a).unwrap());
    }
}
