// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Policy Engine (component E): a small `Policy` trait plus the
//! concrete policies this expansion implements for real (age/urgency and
//! RC-bug deltas) and the pass-through policies that speak the same
//! protocol without a real verdict behind them (§4.D/§4.E, §1 Non-goals).

use std::collections::{HashMap, HashSet};

use assorted_debian_utils::package::PackageName;
use assorted_debian_utils::version::PackageVersion;
use chrono::{DateTime, Utc};

use crate::excuse::Excuse;
use crate::model::{Hint, HintKind};

pub use assorted_debian_utils::excuses::Verdict;

/// Ambient data every policy may consult, threaded through by the excuse
/// builder rather than owned by any one policy.
pub struct PolicyContext<'a> {
    pub hints: &'a [Hint],
    pub dates: &'a HashMap<(PackageName, PackageVersion), DateTime<Utc>>,
    pub urgencies: &'a HashMap<PackageName, String>,
    pub default_urgency: &'a str,
    pub rc_bugs_target: &'a HashMap<PackageName, HashSet<u32>>,
    pub rc_bugs_source: &'a HashMap<PackageName, HashSet<u32>>,
    pub now: DateTime<Utc>,
}

/// Hints whose first argument names `source` (matching against migration
/// item arguments, the way upstream keys per-source hint application).
pub fn hints_for<'h>(source: &PackageName, hints: &'h [Hint]) -> Vec<&'h Hint> {
    hints
        .iter()
        .filter(|h| h.active && h.arguments.iter().any(|arg| &arg.source_name == source))
        .collect()
}

/// A single verdict-producing check run over an [`Excuse`] (§4.E).
pub trait Policy {
    /// Short name used as the `policy_info` key in rendered excuses.
    fn name(&self) -> &'static str;

    fn evaluate(&self, excuse: &Excuse, ctx: &PolicyContext) -> Verdict;
}

/// Urgency keyword to minimum-age-in-days, falling back to the configured
/// default urgency's requirement when a source has none recorded.
fn urgency_requirement(urgency: &str) -> u32 {
    match urgency {
        "low" => 10,
        "medium" => 5,
        "high" => 2,
        "emergency" | "critical" => 0,
        _ => 5,
    }
}

/// Age/urgency policy: a source must have sat in the primary source suite
/// for at least its urgency's minimum number of days.
pub struct AgePolicy;

impl Policy for AgePolicy {
    fn name(&self) -> &'static str {
        "age"
    }

    fn evaluate(&self, excuse: &Excuse, ctx: &PolicyContext) -> Verdict {
        if excuse.is_removal || excuse.architecture.is_some() {
            return Verdict::NotApplicable;
        }
        let urgency = ctx
            .urgencies
            .get(&excuse.source)
            .map(String::as_str)
            .unwrap_or(ctx.default_urgency);
        let mut requirement = urgency_requirement(urgency);

        // `urgent` and `age-days` both collapse the age gate for this
        // source; the exact day-count carried by `age-days` lines is a
        // hint-file parsing detail outside this policy's concern.
        for hint in hints_for(&excuse.source, ctx.hints) {
            if matches!(hint.kind, HintKind::Urgent | HintKind::AgeDays) {
                requirement = 0;
            }
        }

        let current_age = ctx
            .dates
            .get(&(excuse.source.clone(), excuse.new_version.clone()))
            .map(|seen| (ctx.now - *seen).num_days().max(0) as u32)
            .unwrap_or(0);

        if current_age >= requirement {
            Verdict::Pass
        } else {
            Verdict::RejectedTemporarily
        }
    }
}

/// RC-bug delta policy: reject sources that introduce RC bugs the target
/// version did not already carry.
pub struct RcBugsPolicy;

impl Policy for RcBugsPolicy {
    fn name(&self) -> &'static str {
        "rc-bugs"
    }

    fn evaluate(&self, excuse: &Excuse, ctx: &PolicyContext) -> Verdict {
        if excuse.is_removal || excuse.architecture.is_some() {
            return Verdict::NotApplicable;
        }
        let forced = hints_for(&excuse.source, ctx.hints)
            .iter()
            .any(|h| h.kind == HintKind::IgnoreRcBugs);

        let target_bugs = ctx.rc_bugs_target.get(&excuse.source);
        let source_bugs = ctx.rc_bugs_source.get(&excuse.source);
        let introduced = match source_bugs {
            None => 0,
            Some(bugs) => bugs
                .iter()
                .filter(|b| !target_bugs.is_some_and(|t| t.contains(b)))
                .count(),
        };

        if introduced == 0 {
            Verdict::Pass
        } else if forced {
            Verdict::PassHinted
        } else {
            Verdict::RejectedPermanently
        }
    }
}

/// Placeholder for the real autopkgtest protocol: a `force-skiptest` or
/// `force-badtest` hint is the only way this ever leaves `NotApplicable`.
/// Running actual test results against this source is out of scope.
pub struct AutopkgtestPolicy;

impl Policy for AutopkgtestPolicy {
    fn name(&self) -> &'static str {
        "autopkgtest"
    }

    fn evaluate(&self, excuse: &Excuse, ctx: &PolicyContext) -> Verdict {
        let forced = hints_for(&excuse.source, ctx.hints)
            .iter()
            .any(|h| matches!(h.kind, HintKind::ForceSkiptest | HintKind::ForceBadtest));
        if forced {
            Verdict::PassHinted
        } else {
            Verdict::NotApplicable
        }
    }
}

/// Placeholder for the piuparts protocol: `ignore-piuparts` is the only
/// override. Real piuparts-log evaluation is out of scope.
pub struct PiupartsPolicy;

impl Policy for PiupartsPolicy {
    fn name(&self) -> &'static str {
        "piuparts"
    }

    fn evaluate(&self, excuse: &Excuse, ctx: &PolicyContext) -> Verdict {
        let forced = hints_for(&excuse.source, ctx.hints)
            .iter()
            .any(|h| h.kind == HintKind::IgnorePiuparts);
        if forced {
            Verdict::PassHinted
        } else {
            Verdict::NotApplicable
        }
    }
}

/// Placeholder for a deeper build-dependency satisfiability protocol beyond
/// the depends-scan the excuse builder already runs. No hint forces it;
/// kept only so the policy slot exists for a future real implementation.
pub struct BuildDependsPolicy;

impl Policy for BuildDependsPolicy {
    fn name(&self) -> &'static str {
        "build-depends"
    }

    fn evaluate(&self, _excuse: &Excuse, _ctx: &PolicyContext) -> Verdict {
        Verdict::NotApplicable
    }
}

/// Run every policy over an excuse, merging to the worst verdict (§4.D.5).
/// The `force` hint's ability to downgrade an overall rejection to
/// `PASS_HINTED` is applied once, at the excuse-builder level, rather than
/// per policy here.
pub fn run_policies(policies: &[Box<dyn Policy>], excuse: &Excuse, ctx: &PolicyContext) -> (Verdict, HashMap<String, Verdict>) {
    let mut worst = excuse.verdict;
    let mut per_policy = HashMap::new();
    for policy in policies {
        let verdict = policy.evaluate(excuse, ctx);
        per_policy.insert(policy.name().to_owned(), verdict);
        worst = worst.worst(verdict);
    }
    (worst, per_policy)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::MigrationItem;

    fn source(name: &str) -> PackageName {
        PackageName::try_from(name).unwrap()
    }
    fn version(v: &str) -> PackageVersion {
        PackageVersion::try_from(v).unwrap()
    }

    fn base_excuse(name: &str) -> Excuse {
        Excuse {
            item_name: name.to_owned(),
            source: source(name),
            old_version: version("1"),
            new_version: version("2"),
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

    #[test]
    fn age_policy_rejects_young_upload() {
        let excuse = base_excuse("lightgreen");
        let dates = HashMap::new();
        let urgencies = HashMap::new();
        let rc_bugs = HashMap::new();
        let ctx = PolicyContext {
            hints: &[],
            dates: &dates,
            urgencies: &urgencies,
            default_urgency: "medium",
            rc_bugs_target: &rc_bugs,
            rc_bugs_source: &rc_bugs,
            now: Utc::now(),
        };
        assert_eq!(AgePolicy.evaluate(&excuse, &ctx), Verdict::RejectedTemporarily);
    }

    #[test]
    fn urgent_hint_waives_age_requirement() {
        let excuse = base_excuse("lightgreen");
        let dates = HashMap::new();
        let urgencies = HashMap::new();
        let rc_bugs = HashMap::new();
        let hints = vec![Hint {
            kind: HintKind::Urgent,
            user: "releaseteam".to_owned(),
            arguments: vec![MigrationItem::parse("lightgreen", &version("2"), "unstable").unwrap()],
            active: true,
        }];
        let ctx = PolicyContext {
            hints: &hints,
            dates: &dates,
            urgencies: &urgencies,
            default_urgency: "medium",
            rc_bugs_target: &rc_bugs,
            rc_bugs_source: &rc_bugs,
            now: Utc::now(),
        };
        assert_eq!(AgePolicy.evaluate(&excuse, &ctx), Verdict::Pass);
    }

    #[test]
    fn rc_bugs_policy_rejects_new_bug() {
        let excuse = base_excuse("lightgreen");
        let dates = HashMap::new();
        let urgencies = HashMap::new();
        let mut rc_bugs_source = HashMap::new();
        rc_bugs_source.insert(source("lightgreen"), HashSet::from([123]));
        let rc_bugs_target = HashMap::new();
        let ctx = PolicyContext {
            hints: &[],
            dates: &dates,
            urgencies: &urgencies,
            default_urgency: "medium",
            rc_bugs_target: &rc_bugs_target,
            rc_bugs_source: &rc_bugs_source,
            now: Utc::now(),
        };
        assert_eq!(RcBugsPolicy.evaluate(&excuse, &ctx), Verdict::RejectedPermanently);
    }

    #[test]
    fn ignore_rc_bugs_hint_passes_hinted() {
        let excuse = base_excuse("lightgreen");
        let dates = HashMap::new();
        let urgencies = HashMap::new();
        let mut rc_bugs_source = HashMap::new();
        rc_bugs_source.insert(source("lightgreen"), HashSet::from([123]));
        let rc_bugs_target = HashMap::new();
        let hints = vec![Hint {
            kind: HintKind::IgnoreRcBugs,
            user: "releaseteam".to_owned(),
            arguments: vec![MigrationItem::parse("lightgreen", &version("2"), "unstable").unwrap()],
            active: true,
        }];
        let ctx = PolicyContext {
            hints: &hints,
            dates: &dates,
            urgencies: &urgencies,
            default_urgency: "medium",
            rc_bugs_target: &rc_bugs_target,
            rc_bugs_source: &rc_bugs_source,
            now: Utc::now(),
        };
        assert_eq!(RcBugsPolicy.evaluate(&excuse, &ctx), Verdict::PassHinted);
    }

    #[test]
    fn autopkgtest_stub_is_not_applicable_without_hint() {
        let excuse = base_excuse("lightgreen");
        let dates = HashMap::new();
        let urgencies = HashMap::new();
        let rc_bugs = HashMap::new();
        let ctx = PolicyContext {
            hints: &[],
            dates: &dates,
            urgencies: &urgencies,
            default_urgency: "medium",
            rc_bugs_target: &rc_bugs,
            rc_bugs_source: &rc_bugs,
            now: Utc::now(),
        };
        assert_eq!(AutopkgtestPolicy.evaluate(&excuse, &ctx), Verdict::NotApplicable);
    }
}
