// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Package Universe (component A): an immutable, arena-indexed graph of
//! every binary package across every suite, with interned CNF depends
//! clauses, resolved negative deps, reverse deps and equivalence classes.
//!
//! Built once at startup and frozen (§3, §4.A, §9 "cyclic data" design note):
//! the cycle between depends and reverse-deps lives entirely in [`BinaryIdx`]
//! indices, never in owning references.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use assorted_debian_utils::{architectures::Architecture, package::PackageName, version::PackageVersion};
use itertools::Itertools;

use crate::error::{Error, Result};
use crate::model::{BinaryId, RelationTerm, VersionConstraint};
use crate::suite::Suite;

/// Dense index of a binary in the universe's arena. Stable for the lifetime
/// of the universe.
pub type BinaryIdx = u32;

/// Resolved relations of a single binary, computed once at build time.
#[derive(Debug, Clone)]
pub struct Relations {
    /// Conjunction of interned disjunctions: every inner clause is
    /// pointer-identity-shareable with other binaries' identical clauses.
    pub depends: Rc<[Rc<[BinaryIdx]>]>,
    pub negative_deps: Rc<[BinaryIdx]>,
    pub reverse_deps: Rc<HashSet<BinaryIdx>>,
    /// Other members of this binary's equivalence class (empty if the class
    /// has size 1, per §3's "classes of size 1 are omitted").
    pub equivalence_class: Rc<[BinaryIdx]>,
    pub broken: bool,
}

pub(crate) fn version_satisfies(candidate: &PackageVersion, constraint: VersionConstraint, wanted: &PackageVersion) -> bool {
    use std::cmp::Ordering::*;
    match (candidate.cmp(wanted), constraint) {
        (Less, VersionConstraint::Lt | VersionConstraint::Le) => true,
        (Equal, VersionConstraint::Le | VersionConstraint::Eq | VersionConstraint::Ge) => true,
        (Greater, VersionConstraint::Ge | VersionConstraint::Gt) => true,
        _ => false,
    }
}

#[derive(Default)]
struct ArchIndex {
    by_name: HashMap<PackageName, Vec<BinaryIdx>>,
    /// virtual name -> (provider idx, provided version if any)
    provides: HashMap<PackageName, Vec<(BinaryIdx, Option<PackageVersion>)>>,
}

/// The immutable package universe.
#[derive(Debug)]
pub struct PackageUniverse {
    ids: Vec<BinaryId>,
    index: HashMap<BinaryId, BinaryIdx>,
    essential: Vec<bool>,
    relations: Vec<Relations>,
}

impl PackageUniverse {
    /// An empty universe, useful for tests that only exercise code paths
    /// that never dereference a real [`BinaryIdx`].
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            index: HashMap::new(),
            essential: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn idx(&self, id: &BinaryId) -> Option<BinaryIdx> {
        self.index.get(id).copied()
    }

    pub fn id(&self, idx: BinaryIdx) -> &BinaryId {
        &self.ids[idx as usize]
    }

    pub fn is_essential(&self, idx: BinaryIdx) -> bool {
        self.essential[idx as usize]
    }

    pub fn relations(&self, idx: BinaryIdx) -> &Relations {
        &self.relations[idx as usize]
    }

    pub fn is_broken(&self, idx: BinaryIdx) -> bool {
        self.relations[idx as usize].broken
    }

    pub fn all_indices(&self) -> impl Iterator<Item = BinaryIdx> {
        0..self.ids.len() as BinaryIdx
    }

    /// Build the universe from every suite (target plus source suites) over
    /// the given set of concrete architectures. See §4.A for the algorithm.
    pub fn build(suites: &[Suite], architectures: &[Architecture]) -> Result<Self> {
        let mut ids: Vec<BinaryId> = Vec::new();
        let mut index: HashMap<BinaryId, BinaryIdx> = HashMap::new();
        let mut essential: Vec<bool> = Vec::new();
        // Raw (unresolved) per-binary data, aligned with `ids`.
        let mut raw_depends: Vec<Vec<Vec<RelationTerm>>> = Vec::new();
        let mut raw_conflicts: Vec<Vec<RelationTerm>> = Vec::new();

        let mut per_arch: HashMap<Architecture, ArchIndex> = HashMap::new();

        // Step 1+2: register every binary, re-keying `all` to every concrete arch.
        for suite in suites {
            for (&arch, binaries) in &suite.binaries {
                let target_archs: Vec<Architecture> = if arch == Architecture::All {
                    architectures.to_vec()
                } else {
                    vec![arch]
                };
                for pkg in binaries.values() {
                    for &concrete_arch in &target_archs {
                        let id = BinaryId::new(pkg.id.name.clone(), pkg.id.version.clone(), concrete_arch);
                        let idx = match index.get(&id) {
                            Some(&idx) => {
                                // Identity mismatch: same (name, version, arch) must agree
                                // on essential-ness and relation fields across suites.
                                if essential[idx as usize] != pkg.essential {
                                    return Err(Error::DataInconsistency(format!(
                                        "{id}: conflicting essential-flag across suites"
                                    )));
                                }
                                idx
                            }
                            None => {
                                let idx = ids.len() as BinaryIdx;
                                ids.push(id.clone());
                                essential.push(pkg.essential);
                                raw_depends.push(pkg.depends.clone());
                                raw_conflicts.push(pkg.conflicts.clone());
                                index.insert(id, idx);
                                idx
                            }
                        };
                        let arch_index = per_arch.entry(concrete_arch).or_default();
                        arch_index
                            .by_name
                            .entry(pkg.id.name.clone())
                            .or_default()
                            .push(idx);
                        for (pname, pversion) in &pkg.provides {
                            arch_index
                                .provides
                                .entry(pname.clone())
                                .or_default()
                                .push((idx, pversion.clone()));
                        }
                    }
                }
            }
        }

        let resolve_term = |arch_index: &ArchIndex, term: &RelationTerm| -> Vec<BinaryIdx> {
            let mut out: Vec<BinaryIdx> = Vec::new();
            if let Some(candidates) = arch_index.by_name.get(&term.name) {
                for &idx in candidates {
                    let ok = match &term.constraint {
                        None => true,
                        Some((c, v)) => version_satisfies(&ids[idx as usize].version, *c, v),
                    };
                    if ok {
                        out.push(idx);
                    }
                }
            }
            if let Some(providers) = arch_index.provides.get(&term.name) {
                for (idx, pversion) in providers {
                    let ok = match (&term.constraint, pversion) {
                        (None, _) => true,
                        (Some((VersionConstraint::Eq, v)), Some(pv)) => pv == v,
                        _ => false,
                    };
                    if ok {
                        out.push(*idx);
                    }
                }
            }
            out.sort_unstable();
            out.dedup();
            out
        };

        // Clause interning tables (§9 hash-consing design note).
        let mut clause_table: HashMap<Vec<BinaryIdx>, Rc<[BinaryIdx]>> = HashMap::new();
        let mut intern_clause = |mut members: Vec<BinaryIdx>| -> Rc<[BinaryIdx]> {
            members.sort_unstable();
            members.dedup();
            clause_table
                .entry(members.clone())
                .or_insert_with(|| Rc::from(members.into_boxed_slice()))
                .clone()
        };

        let mut depends_sets: Vec<Vec<(Option<PackageName>, Vec<BinaryIdx>)>> = Vec::with_capacity(ids.len());
        let mut negative_sets: Vec<Vec<BinaryIdx>> = Vec::with_capacity(ids.len());

        for (i, id) in ids.iter().enumerate() {
            let empty_index = ArchIndex::default();
            let arch_index = per_arch.get(&id.architecture).unwrap_or(&empty_index);

            let mut clauses: Vec<(Option<PackageName>, Vec<BinaryIdx>)> = Vec::new();
            for clause in &raw_depends[i] {
                let mut solvers: Vec<BinaryIdx> = Vec::new();
                for term in clause {
                    solvers.extend(resolve_term(arch_index, term));
                }
                solvers.sort_unstable();
                solvers.dedup();
                let name = if clause.len() == 1 {
                    Some(clause[0].name.clone())
                } else {
                    None
                };
                clauses.push((name, solvers));
            }
            depends_sets.push(clauses);

            let mut negs: Vec<BinaryIdx> = Vec::new();
            for term in &raw_conflicts[i] {
                negs.extend(resolve_term(arch_index, term));
            }
            negs.retain(|&idx| idx as usize != i);
            negs.sort_unstable();
            negs.dedup();
            negative_sets.push(negs);
        }

        // Step 4: collapse version-range clauses naming the same package.
        let mut collapsed_depends: Vec<Vec<Rc<[BinaryIdx]>>> = Vec::with_capacity(ids.len());
        for clauses in depends_sets {
            let mut by_name: HashMap<PackageName, Vec<BinaryIdx>> = HashMap::new();
            let mut disjunctions: Vec<Vec<BinaryIdx>> = Vec::new();
            for (name, solvers) in clauses {
                match name {
                    Some(name) => {
                        by_name
                            .entry(name)
                            .and_modify(|existing| {
                                existing.retain(|s| solvers.contains(s));
                            })
                            .or_insert(solvers);
                    }
                    None => disjunctions.push(solvers),
                }
            }
            let mut interned: Vec<Rc<[BinaryIdx]>> = by_name
                .into_values()
                .chain(disjunctions)
                .map(&mut intern_clause)
                .collect();
            interned.sort_by_key(|c| Rc::as_ptr(c) as usize);
            collapsed_depends.push(interned);
        }

        // Step 7: mark broken (empty clause) and propagate to fixpoint.
        let mut broken = vec![false; ids.len()];
        let mut worklist: Vec<BinaryIdx> = Vec::new();
        for (i, clauses) in collapsed_depends.iter().enumerate() {
            if clauses.iter().any(|c| c.is_empty()) {
                broken[i] = true;
                worklist.push(i as BinaryIdx);
            }
        }
        // Reverse deps are needed for propagation, build them now from the
        // not-yet-nulled depends sets.
        let mut reverse: Vec<HashSet<BinaryIdx>> = vec![HashSet::new(); ids.len()];
        for (i, clauses) in collapsed_depends.iter().enumerate() {
            for clause in clauses {
                for &solver in clause.iter() {
                    reverse[solver as usize].insert(i as BinaryIdx);
                }
            }
        }
        while let Some(b) = worklist.pop() {
            for &dependent in &reverse[b as usize].clone() {
                if broken[dependent as usize] {
                    continue;
                }
                let all_broken = collapsed_depends[dependent as usize]
                    .iter()
                    .any(|clause| !clause.is_empty() && clause.iter().all(|s| broken[*s as usize]));
                if all_broken {
                    broken[dependent as usize] = true;
                    worklist.push(dependent);
                }
            }
        }

        // Step 8: null relations of broken packages.
        let empty_clause = intern_clause(Vec::new());
        for i in 0..ids.len() {
            if broken[i] {
                collapsed_depends[i] = vec![empty_clause.clone()];
                negative_sets[i].clear();
            }
        }

        // Step 9: equivalence classes, hashing (depends identity, neg-deps, rdeps).
        let mut classes: HashMap<(Vec<usize>, Vec<BinaryIdx>, Vec<BinaryIdx>), Vec<BinaryIdx>> = HashMap::new();
        for i in 0..ids.len() {
            let depend_ids: Vec<usize> = collapsed_depends[i].iter().map(|c| Rc::as_ptr(c) as usize).collect();
            let negs = negative_sets[i].clone();
            let mut rdeps: Vec<BinaryIdx> = reverse[i].iter().copied().collect();
            rdeps.sort_unstable();
            classes.entry((depend_ids, negs, rdeps)).or_default().push(i as BinaryIdx);
        }
        let empty_equivalence: Rc<[BinaryIdx]> = Rc::from(Vec::new().into_boxed_slice());
        let mut equivalence: Vec<Rc<[BinaryIdx]>> = vec![empty_equivalence; ids.len()];
        for members in classes.into_values() {
            if members.len() > 1 {
                let members: Rc<[BinaryIdx]> = Rc::from(members.into_boxed_slice());
                for &m in members.iter() {
                    equivalence[m as usize] = members.clone();
                }
            }
        }

        let relations = (0..ids.len())
            .map(|i| Relations {
                depends: Rc::from(collapsed_depends[i].clone().into_boxed_slice()),
                negative_deps: Rc::from(negative_sets[i].clone().into_boxed_slice()),
                reverse_deps: Rc::new(reverse[i].clone()),
                equivalence_class: equivalence[i].clone(),
                broken: broken[i],
            })
            .collect_vec();

        Ok(Self {
            ids,
            index,
            essential,
            relations,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{BinaryPackage, MultiArch, SuiteClass};

    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }
    fn n(s: &str) -> PackageName {
        PackageName::try_from(s).unwrap()
    }

    fn simple_pkg(name: &str, version: &str, depends: Vec<Vec<RelationTerm>>) -> BinaryPackage {
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

    fn term(name: &str) -> RelationTerm {
        RelationTerm {
            name: n(name),
            constraint: None,
        }
    }

    #[test]
    fn unsatisfiable_clause_marks_broken() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(simple_pkg("a", "1", vec![vec![term("missing")]]));
        let universe = PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap();
        let idx = universe.idx(&BinaryId::new(n("a"), v("1"), Architecture::Amd64)).unwrap();
        assert!(universe.is_broken(idx));
    }

    #[test]
    fn satisfiable_clause_not_broken_and_rdeps_built() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(simple_pkg("a", "1", vec![vec![term("b")]]));
        suite.insert_binary(simple_pkg("b", "1", vec![]));
        let universe = PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap();
        let a = universe.idx(&BinaryId::new(n("a"), v("1"), Architecture::Amd64)).unwrap();
        let b = universe.idx(&BinaryId::new(n("b"), v("1"), Architecture::Amd64)).unwrap();
        assert!(!universe.is_broken(a));
        assert!(universe.relations(b).reverse_deps.contains(&a));
    }

    #[test]
    fn broken_propagates_transitively() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(simple_pkg("a", "1", vec![vec![term("b")]]));
        suite.insert_binary(simple_pkg("b", "1", vec![vec![term("missing")]]));
        let universe = PackageUniverse::build(&[suite], &[Architecture::Amd64]).unwrap();
        let a = universe.idx(&BinaryId::new(n("a"), v("1"), Architecture::Amd64)).unwrap();
        assert!(universe.is_broken(a));
    }

    #[test]
    fn all_arch_binary_is_rekeyed_per_architecture() {
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        suite.insert_binary(simple_pkg("a", "1", vec![]));
        let mut all_pkg = simple_pkg("doc", "1", vec![]);
        all_pkg.id.architecture = Architecture::All;
        suite.insert_binary(all_pkg);
        let universe = PackageUniverse::build(&[suite], &[Architecture::Amd64, Architecture::Arm64]).unwrap();
        assert!(universe.idx(&BinaryId::new(n("doc"), v("1"), Architecture::Amd64)).is_some());
        assert!(universe.idx(&BinaryId::new(n("doc"), v("1"), Architecture::Arm64)).is_some());
    }
}
