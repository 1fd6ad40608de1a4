// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Excuse Builder (component D): compares a primary source suite
//! against the target and produces one [`Excuse`] per candidate, honouring
//! hint overrides before handing each excuse to the policy engine (§4.D).

use std::collections::{HashMap, HashSet};

use assorted_debian_utils::architectures::Architecture;
use assorted_debian_utils::excuses::Component;
use assorted_debian_utils::package::PackageName;
use assorted_debian_utils::version::PackageVersion;

use crate::model::{Hint, HintKind, RelationTerm, VersionConstraint};
use crate::policy::{self, Policy, PolicyContext, Verdict};
use crate::suite::Suite;
use crate::universe::version_satisfies;

/// A single migration candidate's excuse: either a whole-source migration
/// (`architecture: None`), a binary-only/binNMU excuse for one architecture,
/// or a removal (`is_removal`).
#[derive(Debug, Clone)]
pub struct Excuse {
    pub item_name: String,
    pub source: PackageName,
    pub old_version: PackageVersion,
    pub new_version: PackageVersion,
    pub is_removal: bool,
    pub architecture: Option<Architecture>,
    pub component: Option<Component>,
    pub depends_satisfied: bool,
    pub notes: Vec<String>,
    pub verdict: Verdict,
    pub invalidated_by_other_package: Option<bool>,
    pub missing_builds: Vec<Architecture>,
    /// Other candidate sources this excuse's installability depends on, and
    /// the architectures on which that dependency was observed (§3 "Excuse",
    /// §4.D step 4). Consumed by [`crate::invalidation`].
    pub dependencies: HashMap<PackageName, HashSet<Architecture>>,
}

impl Excuse {
    fn new(item_name: String, source: PackageName, old_version: PackageVersion, new_version: PackageVersion) -> Self {
        Self {
            item_name,
            source,
            old_version,
            new_version,
            is_removal: false,
            architecture: None,
            component: None,
            depends_satisfied: true,
            notes: Vec::new(),
            verdict: Verdict::Pass,
            invalidated_by_other_package: None,
            missing_builds: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    fn reject(&mut self, verdict: Verdict, note: impl Into<String>) {
        self.verdict = self.verdict.worst(verdict);
        self.notes.push(note.into());
    }
}

fn term_satisfied_in(term: &RelationTerm, suite: &Suite, arch: Architecture) -> bool {
    if let Some(pkg) = suite.binary(arch, &term.name) {
        let ok = match &term.constraint {
            None => true,
            Some((c, v)) => version_satisfies(&pkg.id.version, *c, v),
        };
        if ok {
            return true;
        }
    }
    if let Some(providers) = suite.provides.get(&arch).and_then(|p| p.get(&term.name)) {
        for (_, version) in providers {
            match &term.constraint {
                None => return true,
                Some((VersionConstraint::Eq, v)) => {
                    if version.as_ref() == Some(v) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }
    false
}

fn term_satisfied(term: &RelationTerm, target: &Suite, source: &Suite, arch: Architecture) -> bool {
    term_satisfied_in(term, target, arch) || term_satisfied_in(term, source, arch)
}

/// Produces excuses by diffing a primary source suite against the target.
pub struct ExcuseBuilder<'a> {
    target: &'a Suite,
    source: &'a Suite,
    policies: Vec<Box<dyn Policy>>,
}

impl<'a> ExcuseBuilder<'a> {
    pub fn new(target: &'a Suite, source: &'a Suite, policies: Vec<Box<dyn Policy>>) -> Self {
        Self { target, source, policies }
    }

    pub fn build_all(&self, hints: &[Hint], ctx: &PolicyContext, architectures: &[Architecture]) -> Vec<Excuse> {
        let mut excuses = Vec::new();

        // 1. Removal excuses: source disappeared upstream but is still in the target.
        for (name, target_src) in &self.target.sources {
            if !self.source.sources.contains_key(name) {
                excuses.push(self.removal_excuse(name, &target_src.version, hints));
            }
        }

        for (name, src) in &self.source.sources {
            match self.target.sources.get(name) {
                None => excuses.push(self.full_source_excuse(name, None, &src.version, hints, architectures)),
                Some(tgt) if src.version == tgt.version => {
                    excuses.extend(self.binary_only_excuses(name, &tgt.version, architectures));
                }
                Some(tgt) if src.version > tgt.version => {
                    excuses.push(self.full_source_excuse(name, Some(&tgt.version), &src.version, hints, architectures));
                }
                Some(tgt) => {
                    let mut excuse = Excuse::new(name.to_string(), name.clone(), tgt.version.clone(), src.version.clone());
                    excuse.reject(Verdict::RejectedPermanently, "source-suite version older than target (newerintesting)");
                    excuses.push(excuse);
                }
            }
        }

        for excuse in &mut excuses {
            self.scan_depends(excuse, architectures);
            let (verdict, _per_policy) = policy::run_policies(&self.policies, excuse, ctx);
            excuse.verdict = excuse.verdict.worst(verdict);
            self.apply_force_hint(excuse, hints);
        }

        excuses
    }

    fn removal_excuse(&self, name: &PackageName, target_version: &PackageVersion, hints: &[Hint]) -> Excuse {
        let mut excuse = Excuse::new(format!("-{name}"), name.clone(), target_version.clone(), target_version.clone());
        excuse.is_removal = true;
        let blocked = policy::hints_for(name, hints)
            .iter()
            .any(|h| matches!(h.kind, HintKind::Block | HintKind::BlockUdeb));
        if blocked {
            excuse.reject(Verdict::RejectedNeedsApproval, "blocked by block/block-udeb hint");
        }
        excuse
    }

    fn binary_only_excuses(&self, name: &PackageName, version: &PackageVersion, architectures: &[Architecture]) -> Vec<Excuse> {
        let mut out = Vec::new();
        for &arch in architectures {
            let target_bin = self.target.binary(arch, name);
            let source_bin = self.source.binary(arch, name);
            if let Some(source_bin) = source_bin {
                let is_newer = target_bin.is_none_or(|t| source_bin.id.version > t.id.version);
                let is_cruft = source_bin.source_name != *name || source_bin.source_version != *version;
                if is_newer || is_cruft {
                    if let Some(target_bin) = target_bin {
                        if source_bin.id.version < target_bin.id.version {
                            // Never downgrade a binary silently.
                            continue;
                        }
                    }
                    let mut excuse = Excuse::new(
                        format!("{name}/{arch}"),
                        name.clone(),
                        target_bin.map(|t| t.id.version.clone()).unwrap_or_else(|| version.clone()),
                        source_bin.id.version.clone(),
                    );
                    excuse.architecture = Some(arch);
                    if is_cruft {
                        excuse.notes.push("binary cruft: source-version mismatch".to_owned());
                    }
                    out.push(excuse);
                }
            }
        }
        out
    }

    fn full_source_excuse(
        &self,
        name: &PackageName,
        target_version: Option<&PackageVersion>,
        source_version: &PackageVersion,
        hints: &[Hint],
        architectures: &[Architecture],
    ) -> Excuse {
        let mut excuse = Excuse::new(
            name.to_string(),
            name.clone(),
            target_version.cloned().unwrap_or_else(|| source_version.clone()),
            source_version.clone(),
        );

        let mut missing = Vec::new();
        for &arch in architectures {
            if self.target.binary(arch, name).is_some() && self.source.binary(arch, name).is_none() {
                missing.push(arch);
            }
        }
        if !missing.is_empty() {
            excuse.missing_builds = missing;
            excuse.reject(Verdict::RejectedCannotDetermineIfPermanent, "missing builds on some architectures");
        }

        for hint in policy::hints_for(name, hints) {
            match hint.kind {
                HintKind::Remove => excuse.reject(Verdict::RejectedPermanently, "removed by hint"),
                HintKind::Block | HintKind::BlockAll => {
                    excuse.reject(Verdict::RejectedNeedsApproval, "blocked by hint");
                }
                HintKind::Unblock => {
                    let matches_version = hint.arguments.iter().any(|a| a.version == *source_version);
                    if matches_version && !excuse.verdict.is_pass() {
                        excuse.verdict = Verdict::PassHinted;
                    }
                }
                _ => {}
            }
        }

        excuse
    }

    fn apply_force_hint(&self, excuse: &mut Excuse, hints: &[Hint]) {
        let forced = policy::hints_for(&excuse.source, hints)
            .iter()
            .any(|h| h.kind == HintKind::Force);
        if forced && !excuse.verdict.is_pass() {
            excuse.verdict = Verdict::PassHinted;
        }
    }

    /// §4.D step 4: for every binary the source suite carries, check each
    /// depends clause has at least one solver in target ∪ source.
    fn scan_depends(&self, excuse: &mut Excuse, architectures: &[Architecture]) {
        let archs: Vec<Architecture> = match excuse.architecture {
            Some(arch) => vec![arch],
            None => architectures.to_vec(),
        };
        for arch in archs {
            let Some(pkg) = self.source.binary(arch, &excuse.source) else {
                continue;
            };
            for clause in &pkg.depends {
                let satisfied = clause.iter().any(|term| term_satisfied(term, self.target, self.source, arch));
                if !satisfied {
                    excuse.depends_satisfied = false;
                    excuse.notes.push(format!("unsatisfiable dependency on {arch}"));
                    excuse.verdict = excuse.verdict.worst(Verdict::RejectedCannotDetermineIfPermanent);
                    continue;
                }
                // Satisfied overall, but only via the source suite: this
                // excuse's installability rides on whatever candidate
                // supplies that term, so record the edge for invalidation.
                let satisfied_by_target = clause.iter().any(|term| term_satisfied_in(term, self.target, arch));
                if satisfied_by_target {
                    continue;
                }
                for term in clause {
                    if term_satisfied_in(term, self.source, arch) {
                        if let Some(provider) = self.source.binary(arch, &term.name) {
                            excuse.dependencies.entry(provider.source_name.clone()).or_default().insert(arch);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{BinaryPackage, MultiArch, SourcePackage, SuiteClass};
    use assorted_debian_utils::package::PackageName;

    fn n(s: &str) -> PackageName {
        PackageName::try_from(s).unwrap()
    }
    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn source_pkg(name: &str, version: &str) -> crate::model::SourcePackage {
        SourcePackage {
            name: n(name),
            version: v(version),
            section: "misc".to_owned(),
            maintainer: String::new(),
            is_fake: false,
            build_depends_arch: Vec::new(),
            build_depends_indep: Vec::new(),
            testsuite: Vec::new(),
            testsuite_triggers: Vec::new(),
            binaries: Vec::new(),
        }
    }

    fn empty_ctx<'a>(dates: &'a std::collections::HashMap<(PackageName, PackageVersion), chrono::DateTime<chrono::Utc>>, urgencies: &'a std::collections::HashMap<PackageName, String>, rc_bugs: &'a std::collections::HashMap<PackageName, std::collections::HashSet<u32>>) -> PolicyContext<'a> {
        PolicyContext {
            hints: &[],
            dates,
            urgencies,
            default_urgency: "medium",
            rc_bugs_target: rc_bugs,
            rc_bugs_source: rc_bugs,
            now: chrono::Utc::now(),
        }
    }

    #[test]
    fn new_source_gets_full_excuse() {
        let target = Suite::new(SuiteClass::Target, "testing", "t");
        let mut source = Suite::new(SuiteClass::PrimarySource, "unstable", "u");
        source.sources.insert(n("lightgreen"), source_pkg("lightgreen", "2.0"));
        let builder = ExcuseBuilder::new(&target, &source, Vec::new());
        let dates = std::collections::HashMap::new();
        let urgencies = std::collections::HashMap::new();
        let rc_bugs = std::collections::HashMap::new();
        let ctx = empty_ctx(&dates, &urgencies, &rc_bugs);
        let excuses = builder.build_all(&[], &ctx, &[Architecture::Amd64]);
        assert_eq!(excuses.len(), 1);
        assert_eq!(excuses[0].source, n("lightgreen"));
        assert!(!excuses[0].is_removal);
    }

    #[test]
    fn disappeared_source_gets_removal_excuse() {
        let mut target = Suite::new(SuiteClass::Target, "testing", "t");
        target.sources.insert(n("oldstuff"), source_pkg("oldstuff", "1.0"));
        let source = Suite::new(SuiteClass::PrimarySource, "unstable", "u");
        let builder = ExcuseBuilder::new(&target, &source, Vec::new());
        let dates = std::collections::HashMap::new();
        let urgencies = std::collections::HashMap::new();
        let rc_bugs = std::collections::HashMap::new();
        let ctx = empty_ctx(&dates, &urgencies, &rc_bugs);
        let excuses = builder.build_all(&[], &ctx, &[Architecture::Amd64]);
        assert_eq!(excuses.len(), 1);
        assert!(excuses[0].is_removal);
    }

    #[test]
    fn older_source_version_is_rejected_permanently() {
        let mut target = Suite::new(SuiteClass::Target, "testing", "t");
        target.sources.insert(n("foo"), source_pkg("foo", "2.0"));
        let mut source = Suite::new(SuiteClass::PrimarySource, "unstable", "u");
        source.sources.insert(n("foo"), source_pkg("foo", "1.0"));
        let builder = ExcuseBuilder::new(&target, &source, Vec::new());
        let dates = std::collections::HashMap::new();
        let urgencies = std::collections::HashMap::new();
        let rc_bugs = std::collections::HashMap::new();
        let ctx = empty_ctx(&dates, &urgencies, &rc_bugs);
        let excuses = builder.build_all(&[], &ctx, &[Architecture::Amd64]);
        assert_eq!(excuses[0].verdict, Verdict::RejectedPermanently);
    }

    #[test]
    fn binary_only_excuse_produced_for_newer_binary_same_source_version() {
        let mut target = Suite::new(SuiteClass::Target, "testing", "t");
        target.sources.insert(n("foo"), source_pkg("foo", "1.0"));
        target.insert_binary(BinaryPackage {
            id: crate::model::BinaryId::new(n("foo"), v("1.0"), Architecture::Amd64),
            source_name: n("foo"),
            source_version: v("1.0"),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        });
        let mut source = Suite::new(SuiteClass::PrimarySource, "unstable", "u");
        source.sources.insert(n("foo"), source_pkg("foo", "1.0"));
        source.insert_binary(BinaryPackage {
            id: crate::model::BinaryId::new(n("foo"), v("1.0+b1"), Architecture::Amd64),
            source_name: n("foo"),
            source_version: v("1.0"),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        });
        let builder = ExcuseBuilder::new(&target, &source, Vec::new());
        let dates = std::collections::HashMap::new();
        let urgencies = std::collections::HashMap::new();
        let rc_bugs = std::collections::HashMap::new();
        let ctx = empty_ctx(&dates, &urgencies, &rc_bugs);
        let excuses = builder.build_all(&[], &ctx, &[Architecture::Amd64]);
        assert_eq!(excuses.len(), 1);
        assert_eq!(excuses[0].architecture, Some(Architecture::Amd64));
    }
}
