// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Excuse Invalidation (component I): propagates "cannot migrate" across
//! candidate→candidate dependency edges until fixpoint (§4.I).

use std::collections::{HashMap, HashSet};

use crate::excuse::Excuse;
use crate::policy::Verdict;

/// Run the candidates in `excuses` to a fixpoint: any candidate that depends
/// (via [`Excuse::dependencies`]) on a source that is not (and never becomes)
/// a valid candidate is marked invalid, with a propagation verdict that
/// distinguishes "blocked" dependents from merely "waiting" ones.
///
/// `forced` names excuses that a `force-hint`/`force-badtest`-style override
/// has exempted from propagation; they keep whatever verdict the policy
/// engine already gave them.
pub fn invalidate(excuses: &mut [Excuse], forced: &HashSet<String>) {
    // name -> indices of excuses whose dependencies map mentions it.
    let mut dependents: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, excuse) in excuses.iter().enumerate() {
        for name in excuse.dependencies.keys() {
            dependents.entry(name.to_string()).or_default().push(i);
        }
    }

    let is_valid = |e: &Excuse| e.verdict.is_pass();

    let mut unconsidered: Vec<usize> = (0..excuses.len()).filter(|&i| !is_valid(&excuses[i])).collect();
    let mut queued: HashSet<usize> = unconsidered.iter().copied().collect();

    while let Some(blocker_idx) = unconsidered.pop() {
        queued.remove(&blocker_idx);
        let blocker_source = excuses[blocker_idx].source.to_string();
        let blocker_was_valid_before_block = excuses[blocker_idx].verdict == Verdict::RejectedWaitingForAnotherItem;

        let Some(dep_list) = dependents.get(&blocker_source).cloned() else {
            continue;
        };
        for dep_idx in dep_list {
            if dep_idx == blocker_idx {
                continue;
            }
            if forced.contains(&excuses[dep_idx].item_name) {
                continue;
            }
            if !is_valid(&excuses[dep_idx]) {
                // Already invalid; nothing new to propagate from this edge.
                continue;
            }

            let verdict = if blocker_was_valid_before_block {
                Verdict::RejectedWaitingForAnotherItem
            } else {
                Verdict::RejectedBlockedByAnotherItem
            };
            excuses[dep_idx].verdict = excuses[dep_idx].verdict.worst(verdict);
            excuses[dep_idx]
                .notes
                .push(format!("Impossible dependency: {} (not considered)", blocker_source));
            if queued.insert(dep_idx) {
                unconsidered.push(dep_idx);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assorted_debian_utils::architectures::Architecture;
    use assorted_debian_utils::package::PackageName;
    use assorted_debian_utils::version::PackageVersion;

    fn n(s: &str) -> PackageName {
        PackageName::try_from(s).unwrap()
    }
    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn excuse(name: &str, verdict: Verdict) -> Excuse {
        Excuse {
            item_name: name.to_owned(),
            source: n(name),
            old_version: v("0"),
            new_version: v("1"),
            is_removal: false,
            architecture: None,
            component: None,
            depends_satisfied: true,
            notes: Vec::new(),
            verdict,
            invalidated_by_other_package: None,
            missing_builds: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    #[test]
    fn dependent_on_blocked_source_is_marked_blocked() {
        let mut excuses = vec![
            excuse("blocker", Verdict::RejectedBlockedByAnotherItem),
            excuse("dependent", Verdict::Pass),
        ];
        excuses[1].dependencies.insert(n("blocker"), HashSet::from([Architecture::Amd64]));
        invalidate(&mut excuses, &HashSet::new());
        assert_eq!(excuses[1].verdict, Verdict::RejectedBlockedByAnotherItem);
        assert!(excuses[1].notes.iter().any(|note| note.contains("blocker")));
    }

    #[test]
    fn dependent_on_merely_waiting_source_is_marked_waiting() {
        let mut excuses = vec![
            excuse("blocker", Verdict::RejectedWaitingForAnotherItem),
            excuse("dependent", Verdict::Pass),
        ];
        excuses[1].dependencies.insert(n("blocker"), HashSet::from([Architecture::Amd64]));
        invalidate(&mut excuses, &HashSet::new());
        assert_eq!(excuses[1].verdict, Verdict::RejectedWaitingForAnotherItem);
    }

    #[test]
    fn forced_excuse_is_exempt_from_propagation() {
        let mut excuses = vec![
            excuse("blocker", Verdict::RejectedBlockedByAnotherItem),
            excuse("dependent", Verdict::Pass),
        ];
        excuses[1].dependencies.insert(n("blocker"), HashSet::from([Architecture::Amd64]));
        let forced = HashSet::from(["dependent".to_owned()]);
        invalidate(&mut excuses, &forced);
        assert_eq!(excuses[1].verdict, Verdict::Pass);
    }

    #[test]
    fn valid_dependency_does_not_propagate() {
        let mut excuses = vec![excuse("blocker", Verdict::Pass), excuse("dependent", Verdict::Pass)];
        excuses[1].dependencies.insert(n("blocker"), HashSet::from([Architecture::Amd64]));
        invalidate(&mut excuses, &HashSet::new());
        assert_eq!(excuses[1].verdict, Verdict::Pass);
    }
}
