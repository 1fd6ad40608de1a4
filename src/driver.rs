// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Migration Driver (component H): turns accepted excuses into groups,
//! orders them with the partial-order solver, and commits each group to the
//! target through a [`Transaction`], rejecting whatever would make
//! installability worse on an arch that doesn't tolerate regressions (§4.H).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use assorted_debian_utils::architectures::Architecture;
use assorted_debian_utils::package::PackageName;
use log::{debug, info, warn};

use crate::config::{ArchCategory, Config};
use crate::error::Result;
use crate::excuse::Excuse;
use crate::model::{BinaryId, Hint, HintKind, MigrationItem};
use crate::policy::hints_for;
use crate::solver::{self, Group};
use crate::suite::{Suite, TargetSuiteState};
use crate::transaction::Transaction;
use crate::universe::{BinaryIdx, PackageUniverse};

/// Outcome of a full driver run.
#[derive(Debug, Default)]
pub struct MigrationResult {
    pub accepted: Vec<MigrationItem>,
    pub rejected: Vec<(MigrationItem, String)>,
}

/// Per-architecture uninstallable-package-name counters, in the two
/// flavours the `nuninst` file carries (§6): `per_arch` counts only
/// binaries physically keyed to that concrete architecture, `per_arch_with_all`
/// folds in the architecture's re-keyed share of `Architecture::All` binaries.
pub struct Nuninst {
    pub per_arch: BTreeMap<Architecture, Vec<String>>,
    pub per_arch_with_all: BTreeMap<Architecture, Vec<String>>,
}

/// Recompute the `nuninst` counters for the current target suite state
/// (used for `--print-uninst`, the `nuninst` cache file, and delta
/// reporting against a previous run's cache).
pub fn compute_nuninst(target: &mut TargetSuiteState, architectures: &[Architecture]) -> Result<Nuninst> {
    let mut per_arch = BTreeMap::new();
    let mut per_arch_with_all = BTreeMap::new();

    for &arch in architectures {
        let mut broken = Vec::new();
        let ids: Vec<BinaryId> = target
            .suite
            .binaries
            .get(&arch)
            .map(|m| m.values().map(|p| p.id.clone()).collect())
            .unwrap_or_default();
        for id in &ids {
            if !target.tester.is_installable(id)? {
                broken.push(id.name.to_string());
            }
        }
        broken.sort();
        broken.dedup();

        let mut broken_with_all = broken.clone();
        let all_ids: Vec<BinaryId> = target
            .suite
            .binaries
            .get(&Architecture::All)
            .map(|m| {
                m.values()
                    .map(|p| BinaryId::new(p.id.name.clone(), p.id.version.clone(), arch))
                    .collect()
            })
            .unwrap_or_default();
        for id in &all_ids {
            if !target.tester.is_installable(id).unwrap_or(false) {
                broken_with_all.push(id.name.to_string());
            }
        }
        broken_with_all.sort();
        broken_with_all.dedup();

        per_arch.insert(arch, broken);
        per_arch_with_all.insert(arch, broken_with_all);
    }

    Ok(Nuninst { per_arch, per_arch_with_all })
}

fn item_key(item: &MigrationItem) -> String {
    format!("{}{}", if item.is_removal { "-" } else { "" }, item.uvname())
}

fn excuse_item(excuse: &Excuse, source_suite: &str) -> MigrationItem {
    MigrationItem {
        source_name: excuse.source.clone(),
        version: excuse.new_version.clone(),
        architecture: excuse.architecture,
        source_suite: source_suite.to_owned(),
        is_removal: excuse.is_removal,
    }
}

/// Build the add/remove [`Group`] for one accepted excuse (§4.G input).
/// Binaries that cannot be resolved in `universe` (should not happen for a
/// universe built from these two suites) are silently skipped rather than
/// failing the whole group.
fn group_for_excuse(excuse: &Excuse, target: &Suite, source: &Suite, universe: &PackageUniverse, architectures: &[Architecture]) -> Group {
    let archs: Vec<Architecture> = match excuse.architecture {
        Some(arch) => vec![arch],
        None => architectures.to_vec(),
    };
    let mut adds = HashSet::new();
    let mut removes = HashSet::new();

    if excuse.is_removal {
        for per_arch in target.binaries.values() {
            for pkg in per_arch.values() {
                if pkg.source_name == excuse.source {
                    if let Some(idx) = universe.idx(&pkg.id) {
                        removes.insert(idx);
                    }
                }
            }
        }
    } else {
        let relevant_archs: Vec<Architecture> = match excuse.architecture {
            Some(arch) => vec![arch, Architecture::All],
            None => architectures.iter().copied().chain(std::iter::once(Architecture::All)).collect(),
        };
        for &arch in &relevant_archs {
            if let Some(per_arch) = target.binaries.get(&arch) {
                for pkg in per_arch.values().filter(|b| b.source_name == excuse.source) {
                    if let Some(idx) = universe.idx(&pkg.id) {
                        removes.insert(idx);
                    }
                }
            }
        }
        for &arch in &relevant_archs {
            if let Some(per_arch) = source.binaries.get(&arch) {
                for pkg in per_arch.values() {
                    if pkg.source_name == excuse.source && pkg.source_version == excuse.new_version {
                        if let Some(idx) = universe.idx(&pkg.id) {
                            adds.insert(idx);
                        }
                    }
                }
            }
        }
    }

    Group {
        item: excuse_item(excuse, &source.short_name),
        adds,
        removes,
    }
}

/// Direct-affected binaries (§4.H): the group's own adds/removes, plus every
/// reverse-dependent of a removed binary, expanded to the transitive rdep
/// closure.
fn affected_closure(group: &Group, universe: &PackageUniverse) -> HashSet<BinaryIdx> {
    let mut seen: HashSet<BinaryIdx> = group.adds.iter().chain(group.removes.iter()).copied().collect();
    let mut frontier: Vec<BinaryIdx> = seen.iter().copied().collect();
    while let Some(idx) = frontier.pop() {
        for &r in universe.relations(idx).reverse_deps.iter() {
            if seen.insert(r) {
                frontier.push(r);
            }
        }
    }
    seen
}

/// Per-architecture uninstallability snapshot used for the regression check
/// (§4.H, §8 testable property 5): a raw broken-package count, plus the
/// subset of broken packages that are also in the `constraints.keep-installable`
/// set (§6 "constraints" input file, `present-and-installable` constraint kind).
#[derive(Debug, Default, Clone)]
struct ArchNuninst {
    count: usize,
    broken_keep: HashSet<PackageName>,
}

/// Count, per architecture, how many of `ids` (restricted to binaries
/// actually present in the target) are not installable, and which of those
/// are members of `keep_installable`.
fn count_uninstallable(
    txn: &mut Transaction,
    universe: &PackageUniverse,
    ids: &HashSet<BinaryIdx>,
    architectures: &[Architecture],
    keep_installable: &HashSet<PackageName>,
) -> Result<HashMap<Architecture, ArchNuninst>> {
    let mut counts: HashMap<Architecture, ArchNuninst> = architectures.iter().map(|&a| (a, ArchNuninst::default())).collect();
    for &idx in ids {
        let id = universe.id(idx);
        if !architectures.contains(&id.architecture) && id.architecture != Architecture::All {
            continue;
        }
        if txn.target().suite.binary(id.architecture, &id.name).map(|p| &p.id) != Some(id) {
            continue;
        }
        if !txn.is_installable(id)? {
            for &arch in architectures {
                if arch == id.architecture || id.architecture == Architecture::All {
                    let entry = counts.entry(arch).or_default();
                    entry.count += 1;
                    if keep_installable.contains(&id.name) {
                        entry.broken_keep.insert(id.name.clone());
                    }
                }
            }
        }
    }
    Ok(counts)
}

/// Whether a regression from `before` to `after` on `arch` is acceptable
/// (§4.H, §8 testable property 5). A `keep_installable` package that was
/// installable before and is broken after always blocks, regardless of the
/// raw count or the architecture's category — that is the entire point of
/// naming it in `constraints`. Otherwise, the architecture's category
/// decides whether a rise in the raw count is tolerated.
fn regression_acceptable(arch: Architecture, before: &ArchNuninst, after: &ArchNuninst, config: &Config) -> bool {
    if !after.broken_keep.is_subset(&before.broken_keep) {
        return false;
    }
    if after.count <= before.count {
        return true;
    }
    match config.category_for(arch) {
        ArchCategory::Break | ArchCategory::OutOfSync | ArchCategory::New => true,
        ArchCategory::Standard | ArchCategory::NoBreakAll => false,
    }
}

struct Attempt<'a> {
    target: &'a mut TargetSuiteState,
    source: &'a Suite,
    universe: &'a PackageUniverse,
    config: &'a Config,
    architectures: Vec<Architecture>,
    keep_installable: &'a HashSet<PackageName>,
}

impl Attempt<'_> {
    /// Try committing `groups` atomically. Returns `Ok(())` on acceptance
    /// (already committed) or `Err(reason)` after rolling back.
    fn try_groups(&mut self, groups: &[&Group], force: bool) -> std::result::Result<(), String> {
        let mut affected = HashSet::new();
        for g in groups {
            affected.extend(affected_closure(g, self.universe));
        }

        let mut txn = Transaction::new(self.target);
        let before = count_uninstallable(&mut txn, self.universe, &affected, &self.architectures, self.keep_installable).map_err(|e| e.to_string())?;

        for g in groups {
            for &idx in &g.removes {
                let id = self.universe.id(idx).clone();
                txn.remove_binary(&id);
            }
            for &idx in &g.adds {
                let id = self.universe.id(idx);
                if let Some(pkg) = self.source.binaries.get(&id.architecture).and_then(|m| m.get(&id.name)) {
                    txn.add_binary(pkg.clone());
                }
            }
        }

        if !force {
            let after = count_uninstallable(&mut txn, self.universe, &affected, &self.architectures, self.keep_installable).map_err(|e| e.to_string())?;
            let default = ArchNuninst::default();
            for &arch in &self.architectures {
                let b = before.get(&arch).unwrap_or(&default);
                let a = after.get(&arch).unwrap_or(&default);
                if !regression_acceptable(arch, b, a, self.config) {
                    return Err(format!("installability regression on {arch} ({} -> {}, keep-installable broken: {})", b.count, a.count, a.broken_keep.len()));
                }
            }
        }

        txn.commit();
        Ok(())
    }
}

/// Run the batch driver over every excuse whose policy verdict already
/// passed (candidates), honouring `easy`/`hint`/`force-hint` overrides from
/// `hints` before falling through to the ordered SCC schedule (§4.H).
pub fn run(
    target: &mut TargetSuiteState,
    source: &Suite,
    universe: &Rc<PackageUniverse>,
    excuses: &[Excuse],
    hints: &[Hint],
    config: &Config,
    architectures: &[Architecture],
    keep_installable: &HashSet<PackageName>,
) -> Result<MigrationResult> {
    let mut result = MigrationResult::default();
    let mut handled: HashSet<String> = HashSet::new();

    let candidates: Vec<&Excuse> = excuses.iter().filter(|e| e.verdict.is_pass()).collect();
    let groups: HashMap<String, Group> = candidates
        .iter()
        .map(|e| (e.item_name.clone(), group_for_excuse(e, &target.suite, source, universe, architectures)))
        .collect();

    let mut attempt = Attempt {
        target,
        source,
        universe: universe.as_ref(),
        config,
        architectures: architectures.to_vec(),
        keep_installable,
    };

    // force-hint: commit unconditionally, first, regardless of regressions.
    let force_hint_items: Vec<String> = hints
        .iter()
        .filter(|h| h.active && h.kind == HintKind::ForceHint)
        .flat_map(|h| h.arguments.iter().map(item_key))
        .collect();
    for name in &force_hint_items {
        if let Some(group) = groups.get(name) {
            if attempt.try_groups(&[group], true).is_ok() {
                info!("force-hint: committed {name} unconditionally");
                result.accepted.push(group.item.clone());
                handled.insert(name.clone());
            }
        }
    }

    // easy/hint: an explicit named set tried atomically, without recursion.
    for hint in hints.iter().filter(|h| h.active && matches!(h.kind, HintKind::Easy | HintKind::Hint)) {
        let names: Vec<String> = hint.arguments.iter().map(item_key).collect();
        if names.iter().any(|n| handled.contains(n)) {
            continue;
        }
        let members: Vec<&Group> = names.iter().filter_map(|n| groups.get(n)).collect();
        if members.len() != names.len() {
            debug!("{} hint from {} names an item with no excuse, skipping", hint.kind, hint.user);
            continue;
        }
        match attempt.try_groups(&members, false) {
            Ok(()) => {
                info!("{} hint from {}: committed {} item(s)", hint.kind, hint.user, members.len());
                for g in &members {
                    result.accepted.push(g.item.clone());
                }
                handled.extend(names);
            }
            Err(reason) => {
                warn!("{} hint from {} rejected: {reason}", hint.kind, hint.user);
            }
        }
    }

    // Standard batch: order the remainder with the partial-order solver.
    let remaining: Vec<&Excuse> = candidates.iter().filter(|e| !handled.contains(&e.item_name)).copied().collect();
    let remaining_groups: Vec<Group> = remaining.iter().map(|e| groups[&e.item_name].clone()).collect();
    let present: HashSet<BinaryIdx> = attempt.target.suite.all_binary_ids().filter_map(|id| universe.idx(id)).collect();
    let edges = solver::build_constraints(&remaining_groups, universe, &present);
    let sccs = solver::tarjan_scc(&edges);
    let schedule = solver::linearize(&remaining_groups, &edges, sccs);

    let mut rescheduled: Vec<usize> = Vec::new();
    for scc in &schedule {
        let members: Vec<&Group> = scc.members.iter().map(|&i| &remaining_groups[i]).collect();
        match attempt.try_groups(&members, false) {
            Ok(()) => {
                for g in &members {
                    result.accepted.push(g.item.clone());
                }
            }
            Err(reason) if members.len() > 1 => {
                debug!("SCC of {} items rejected ({reason}), retrying as singletons", members.len());
                rescheduled.extend(scc.members.iter().copied());
            }
            Err(reason) => {
                result.rejected.push((remaining_groups[scc.members[0]].item.clone(), reason));
            }
        }
    }

    // Retry loop: singletons freed from a rejected SCC get one pass each;
    // an accept can't free further candidates here since edges among
    // singletons were already respected by the schedule order, so a single
    // pass suffices.
    for idx in rescheduled {
        let group = &remaining_groups[idx];
        match attempt.try_groups(&[group], false) {
            Ok(()) => result.accepted.push(group.item.clone()),
            Err(reason) => result.rejected.push((group.item.clone(), reason)),
        }
    }

    smooth_update_pass(&mut attempt, source, config)?;

    postcondition_check(attempt.target, universe, architectures)?;

    Ok(result)
}

/// Final pass (§4.H): binaries whose source is gone from every source suite
/// and which nothing in the target still depends on are dropped, the
/// smooth-update leftovers of a superseded library — but only for packages
/// named in `config.smooth_updates`, and only in a suite that participates
/// in smooth updates at all (§3.1, §6).
fn smooth_update_pass(attempt: &mut Attempt, source: &Suite, config: &Config) -> Result<()> {
    if !attempt.target.suite.class.participates_in_smooth_updates() {
        return Ok(());
    }
    let stale: Vec<crate::model::BinaryId> = attempt
        .target
        .suite
        .all_binary_ids()
        .filter(|id| {
            if !config.smooth_updates.contains(&id.name) {
                return false;
            }
            let still_sourced = attempt
                .target
                .suite
                .binary(id.architecture, &id.name)
                .is_some_and(|pkg| source.sources.contains_key(&pkg.source_name));
            !still_sourced
                && attempt
                    .universe
                    .idx(id)
                    .is_some_and(|idx| attempt.universe.relations(idx).reverse_deps.is_empty())
        })
        .cloned()
        .collect();
    if stale.is_empty() {
        return Ok(());
    }
    let mut txn = Transaction::new(attempt.target);
    for id in &stale {
        txn.remove_binary(id);
    }
    txn.commit();
    info!("smooth update: dropped {} leftover binaries", stale.len());
    Ok(())
}

/// Recompute installability from scratch (a fresh [`InstallabilityTester`]
/// over the same universe, seeded only with what is actually present in the
/// target now) and assert it matches what the incrementally-maintained
/// tester already believes, on every binary of every requested architecture
/// (§4.H "post-condition check", testable property 4).
fn postcondition_check(target: &mut TargetSuiteState, universe: &Rc<PackageUniverse>, architectures: &[Architecture]) -> Result<()> {
    let mut fresh = crate::installability::InstallabilityTester::new(universe.clone());
    for id in target.suite.all_binary_ids() {
        fresh.add_binary(id);
    }

    for &arch in architectures {
        let ids: Vec<_> = target
            .suite
            .binaries
            .get(&arch)
            .map(|m| m.values().map(|p| p.id.clone()).collect())
            .unwrap_or_default();
        for id in ids {
            let cached = target.tester.is_installable(&id)?;
            let recomputed = fresh.is_installable(&id)?;
            if cached != recomputed {
                return Err(crate::error::Error::InvariantViolation(format!(
                    "installability of {id} does not match a from-scratch recomputation ({cached} vs {recomputed})"
                )));
            }
        }
    }
    Ok(())
}
