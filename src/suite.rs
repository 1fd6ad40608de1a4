// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Suites: immutable source-suite snapshots and the mutable target suite
//! state (component C). The target suite is the only one ever mutated, and
//! every mutation goes through [`TargetSuiteState`] so that the
//! installability tester's caches stay in sync (see [`crate::installability`]).

use std::collections::{HashMap, HashSet};

use assorted_debian_utils::{architectures::Architecture, package::PackageName, version::PackageVersion};

use crate::error::{Error, Result};
use crate::installability::InstallabilityTester;
use crate::model::{BinaryId, BinaryPackage, SourcePackage, SuiteClass};

/// A virtual-package provides table: `name -> providers`.
pub type ProvidesMap = HashMap<PackageName, HashSet<(PackageName, PackageVersion)>>;

/// An immutable (or, for the target, mutable-via-[`TargetSuiteState`]) suite
/// snapshot: sources, per-architecture binaries and provides.
#[derive(Debug, Clone)]
pub struct Suite {
    pub class: SuiteClass,
    pub name: String,
    pub short_name: String,
    pub sources: HashMap<PackageName, SourcePackage>,
    pub binaries: HashMap<Architecture, HashMap<PackageName, BinaryPackage>>,
    pub provides: HashMap<Architecture, ProvidesMap>,
}

impl Suite {
    pub fn new(class: SuiteClass, name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            class,
            name: name.into(),
            short_name: short_name.into(),
            sources: HashMap::new(),
            binaries: HashMap::new(),
            provides: HashMap::new(),
        }
    }

    pub fn binary(&self, arch: Architecture, name: &PackageName) -> Option<&BinaryPackage> {
        self.binaries.get(&arch).and_then(|m| m.get(name))
    }

    /// Every binary-id currently in this suite, across all architectures.
    pub fn all_binary_ids(&self) -> impl Iterator<Item = &BinaryId> + '_ {
        self.binaries.values().flat_map(|m| m.values().map(|b| &b.id))
    }

    pub fn insert_binary(&mut self, pkg: BinaryPackage) {
        let arch = pkg.id.architecture;
        for (name, version) in &pkg.provides {
            self.provides
                .entry(arch)
                .or_default()
                .entry(name.clone())
                .or_default()
                .insert((pkg.id.name.clone(), version.clone().unwrap_or_else(|| pkg.id.version.clone())));
        }
        self.binaries
            .entry(arch)
            .or_default()
            .insert(pkg.id.name.clone(), pkg);
    }
}

/// Thin holder around the target suite's current contents; delegates every
/// installability query to the tester and keeps its caches coherent with
/// whatever mutation is applied here (§4.C).
#[derive(Debug)]
pub struct TargetSuiteState {
    pub suite: Suite,
    pub tester: InstallabilityTester,
}

impl TargetSuiteState {
    /// Wrap an already-ingested target suite with a tester over the same
    /// universe, seeding the tester's present set from whatever `suite`
    /// already contains (ingestion populates `suite` directly, bypassing
    /// the single-binary mutation hooks below).
    pub fn new(suite: Suite, mut tester: InstallabilityTester) -> Self {
        for id in suite.all_binary_ids() {
            tester.add_binary(id);
        }
        Self { suite, tester }
    }

    /// Add a binary to the target, registering a source entry for it if one
    /// does not already exist (a fake source, per §4.A/§4.J, if no `Sources`
    /// record names it).
    pub fn add_binary(&mut self, pkg: BinaryPackage) {
        let arch = pkg.id.architecture;
        let id = pkg.id.clone();
        let essential = pkg.essential;
        self.suite.insert_binary(pkg);
        self.tester.add_binary(&id);
        if essential {
            self.tester.invalidate_pseudo_essential(arch);
        }
    }

    pub fn remove_binary(&mut self, id: &BinaryId) {
        let was_essential = self
            .suite
            .binary(id.architecture, &id.name)
            .is_some_and(|b| b.essential);
        if let Some(per_arch) = self.suite.binaries.get_mut(&id.architecture) {
            if let Some(pkg) = per_arch.remove(&id.name) {
                if let Some(provides) = self.suite.provides.get_mut(&id.architecture) {
                    for (name, _) in &pkg.provides {
                        if let Some(providers) = provides.get_mut(name) {
                            providers.retain(|(n, _)| n != &id.name);
                        }
                    }
                }
            }
        }
        self.tester.remove_binary(id);
        if was_essential {
            self.tester.invalidate_pseudo_essential(id.architecture);
        }
    }

    pub fn remove_source(&mut self, name: &PackageName) -> Option<SourcePackage> {
        self.suite.sources.remove(name)
    }

    pub fn add_source(&mut self, source: SourcePackage) {
        self.suite.sources.insert(source.name.clone(), source);
    }

    /// Invariant check run at the end of a migration pass: every binary in
    /// the target names a source in the target, and every binary referenced
    /// from a source is present in the target's per-arch binary map.
    pub fn check_invariants(&self) -> Result<()> {
        for per_arch in self.suite.binaries.values() {
            for pkg in per_arch.values() {
                if !self.suite.sources.contains_key(&pkg.source_name) {
                    return Err(Error::InvariantViolation(format!(
                        "binary {} names source {} which is not in the target",
                        pkg.id, pkg.source_name
                    )));
                }
            }
        }
        for source in self.suite.sources.values() {
            for id in &source.binaries {
                if self.suite.binary(id.architecture, &id.name).is_none() {
                    return Err(Error::InvariantViolation(format!(
                        "source {} references binary {} which is not in the target",
                        source.name, id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::installability::InstallabilityTester;
    use crate::model::MultiArch;
    use crate::universe::PackageUniverse;
    use std::rc::Rc;

    fn id(name: &str, version: &str, arch: Architecture) -> BinaryId {
        BinaryId::new(
            PackageName::try_from(name).unwrap(),
            PackageVersion::try_from(version).unwrap(),
            arch,
        )
    }

    fn pkg(name: &str, version: &str, arch: Architecture) -> BinaryPackage {
        BinaryPackage {
            id: id(name, version, arch),
            source_name: PackageName::try_from(name).unwrap(),
            source_version: PackageVersion::try_from(version).unwrap(),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        }
    }

    #[test]
    fn invariant_check_catches_orphan_binary() {
        let universe = Rc::new(PackageUniverse::empty());
        let tester = InstallabilityTester::new(universe);
        let mut target = TargetSuiteState::new(Suite::new(SuiteClass::Target, "testing", "t"), tester);
        target.add_binary(pkg("foo", "1", Architecture::Amd64));
        assert!(target.check_invariants().is_err());
    }

    #[test]
    fn invariant_check_passes_when_source_present() {
        let universe = Rc::new(PackageUniverse::empty());
        let tester = InstallabilityTester::new(universe);
        let mut target = TargetSuiteState::new(Suite::new(SuiteClass::Target, "testing", "t"), tester);
        target.add_binary(pkg("foo", "1", Architecture::Amd64));
        let mut source = SourcePackage::fake(
            PackageName::try_from("foo").unwrap(),
            PackageVersion::try_from("1").unwrap(),
        );
        source.binaries.push(id("foo", "1", Architecture::Amd64));
        target.add_source(source);
        assert!(target.check_invariants().is_ok());
    }
}
