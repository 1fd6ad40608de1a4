// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core data model shared by every component: package identities, the raw
//! (pre-resolution) package records read off the archive, migration items
//! and hints.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use assorted_debian_utils::{
    architectures::Architecture,
    package::PackageName,
    version::PackageVersion,
};
use serde::{Deserialize, Serialize};

/// Identity of a binary package: unique across the whole universe.
///
/// `architecture = all` packages never appear here: they are re-keyed to
/// every concrete architecture of the suites they occur in during universe
/// construction (see [`crate::universe`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryId {
    pub name: PackageName,
    pub version: PackageVersion,
    pub architecture: Architecture,
}

impl BinaryId {
    pub fn new(name: PackageName, version: PackageVersion, architecture: Architecture) -> Self {
        Self {
            name,
            version,
            architecture,
        }
    }
}

impl Display for BinaryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.name, self.architecture, self.version)
    }
}

/// `Multi-Arch` field of a binary package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiArch {
    No,
    Same,
    Foreign,
    Allowed,
}

impl Default for MultiArch {
    fn default() -> Self {
        MultiArch::No
    }
}

/// One disjunction of a relation field, e.g. `foo (>= 1) | bar`: each entry
/// names a package together with an optional version constraint. Resolved
/// against the suites during universe construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTerm {
    pub name: PackageName,
    pub constraint: Option<(VersionConstraint, PackageVersion)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionConstraint {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// A raw (unresolved) binary package record as read from a `Packages` file.
#[derive(Debug, Clone)]
pub struct BinaryPackage {
    pub id: BinaryId,
    pub source_name: PackageName,
    pub source_version: PackageVersion,
    pub section: String,
    pub multi_arch: MultiArch,
    /// Conjunction of disjunctions (`Pre-Depends` already merged in).
    pub depends: Vec<Vec<RelationTerm>>,
    /// Disjunction of negative relations (`Breaks` already merged in).
    pub conflicts: Vec<RelationTerm>,
    pub provides: Vec<(PackageName, Option<PackageVersion>)>,
    pub essential: bool,
}

/// A raw (unresolved) source package record as read from a `Sources` file.
#[derive(Debug, Clone)]
pub struct SourcePackage {
    pub name: PackageName,
    pub version: PackageVersion,
    pub section: String,
    pub maintainer: String,
    pub is_fake: bool,
    pub build_depends_arch: Vec<Vec<RelationTerm>>,
    pub build_depends_indep: Vec<Vec<RelationTerm>>,
    pub testsuite: Vec<String>,
    pub testsuite_triggers: Vec<PackageName>,
    pub binaries: Vec<BinaryId>,
}

impl SourcePackage {
    pub fn fake(name: PackageName, version: PackageVersion) -> Self {
        Self {
            name,
            version,
            section: String::from("faux"),
            maintainer: String::new(),
            is_fake: true,
            build_depends_arch: Vec::new(),
            build_depends_indep: Vec::new(),
            testsuite: Vec::new(),
            testsuite_triggers: Vec::new(),
            binaries: Vec::new(),
        }
    }
}

/// Which role a suite plays: only the target suite is ever mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteClass {
    Target,
    PrimarySource,
    AdditionalSource,
}

impl SuiteClass {
    /// Whether candidates from this suite class require explicit approval
    /// before migrating (e.g. proposed-updates-like additional suites).
    pub fn needs_approval(self) -> bool {
        matches!(self, SuiteClass::AdditionalSource)
    }

    /// Whether binaries from this suite class participate in smooth updates.
    pub fn participates_in_smooth_updates(self) -> bool {
        matches!(self, SuiteClass::Target)
    }
}

/// A single pending migration: either a full source migration, a binNMU
/// (`name/arch`), or a removal (`-name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationItem {
    pub source_name: PackageName,
    pub version: PackageVersion,
    /// `None` means the "source" pseudo-architecture: the item affects every
    /// architecture, as opposed to a single binNMU architecture.
    pub architecture: Option<Architecture>,
    pub source_suite: String,
    pub is_removal: bool,
}

impl MigrationItem {
    pub fn uvname(&self) -> String {
        match &self.architecture {
            Some(arch) => format!("{}/{}", self.source_name, arch),
            None => self.source_name.to_string(),
        }
    }
}

impl Display for MigrationItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_removal {
            write!(f, "-")?;
        }
        write!(f, "{}", self.source_name)?;
        if let Some(arch) = &self.architecture {
            write!(f, "/{}", arch)?;
        }
        if self.source_suite != "unstable" {
            write!(f, "_{}", self.source_suite)?;
        }
        Ok(())
    }
}

/// Error returned while parsing a `[-]name[/arch_or_version][_suite]` reference.
#[derive(Debug, thiserror::Error)]
#[error("invalid migration item reference: {0}")]
pub struct MigrationItemParseError(pub String);

impl MigrationItem {
    /// Canonicalise a textual reference, consulting the known architecture
    /// list to disambiguate `pkg/amd64` (a binNMU) from `pkg/1.2` (a version
    /// pin that does not change the parsed architecture).
    pub fn parse(s: &str, known_version: &PackageVersion, default_suite: &str) -> Result<Self, MigrationItemParseError> {
        let (is_removal, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (rest, suite) = match rest.rsplit_once('_') {
            Some((head, suite)) => (head, suite.to_owned()),
            None => (rest, default_suite.to_owned()),
        };
        let (name_part, arch) = match rest.split_once('/') {
            Some((name, maybe_arch)) => match Architecture::try_from(maybe_arch) {
                Ok(arch) => (name, Some(arch)),
                // "pkg/1.2" form: not a known architecture, so it must be a
                // version qualifier; we only care about the name here.
                Err(_) => (name, None),
            },
            None => (rest, None),
        };
        let name = PackageName::try_from(name_part)
            .map_err(|_| MigrationItemParseError(s.to_owned()))?;
        Ok(Self {
            source_name: name,
            version: known_version.clone(),
            architecture: arch,
            source_suite: suite,
            is_removal,
        })
    }
}

/// The kinds of human-authored hints understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintKind {
    Easy,
    Hint,
    ForceHint,
    Remove,
    Block,
    BlockUdeb,
    Unblock,
    UnblockUdeb,
    BlockAll,
    Force,
    Urgent,
    AgeDays,
    Approve,
    IgnorePiuparts,
    IgnoreRcBugs,
    ForceSkiptest,
    ForceBadtest,
    Remark,
}

impl Display for HintKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            HintKind::Easy => "easy",
            HintKind::Hint => "hint",
            HintKind::ForceHint => "force-hint",
            HintKind::Remove => "remove",
            HintKind::Block => "block",
            HintKind::BlockUdeb => "block-udeb",
            HintKind::Unblock => "unblock",
            HintKind::UnblockUdeb => "unblock-udeb",
            HintKind::BlockAll => "block-all",
            HintKind::Force => "force",
            HintKind::Urgent => "urgent",
            HintKind::AgeDays => "age-days",
            HintKind::Approve => "approve",
            HintKind::IgnorePiuparts => "ignore-piuparts",
            HintKind::IgnoreRcBugs => "ignore-rc-bugs",
            HintKind::ForceSkiptest => "force-skiptest",
            HintKind::ForceBadtest => "force-badtest",
            HintKind::Remark => "remark",
        };
        write!(f, "{s}")
    }
}

impl FromStr for HintKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "easy" => HintKind::Easy,
            "hint" => HintKind::Hint,
            "force-hint" => HintKind::ForceHint,
            "remove" => HintKind::Remove,
            "block" => HintKind::Block,
            "block-udeb" => HintKind::BlockUdeb,
            "unblock" => HintKind::Unblock,
            "unblock-udeb" => HintKind::UnblockUdeb,
            "block-all" => HintKind::BlockAll,
            "force" => HintKind::Force,
            "urgent" => HintKind::Urgent,
            "age-days" => HintKind::AgeDays,
            "approve" => HintKind::Approve,
            "ignore-piuparts" => HintKind::IgnorePiuparts,
            "ignore-rc-bugs" => HintKind::IgnoreRcBugs,
            "force-skiptest" => HintKind::ForceSkiptest,
            "force-badtest" => HintKind::ForceBadtest,
            "remark" => HintKind::Remark,
            _ => return Err(()),
        })
    }
}

/// The literal wildcard token upstream calls `HINTS_ALL`: grants every hint
/// kind to a user when present in their permission set.
pub const HINTS_ALL: &str = "ALL";

#[derive(Debug, Clone)]
pub struct Hint {
    pub kind: HintKind,
    pub user: String,
    pub arguments: Vec<MigrationItem>,
    pub active: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    #[test]
    fn parse_plain_source() {
        let item = MigrationItem::parse("lightgreen", &v("1.0-1"), "unstable").unwrap();
        assert_eq!(item.source_name, "lightgreen");
        assert_eq!(item.architecture, None);
        assert!(!item.is_removal);
    }

    #[test]
    fn parse_removal() {
        let item = MigrationItem::parse("-lightgreen", &v("1.0-1"), "unstable").unwrap();
        assert!(item.is_removal);
    }

    #[test]
    fn parse_binnmu() {
        let item = MigrationItem::parse("lightgreen/amd64", &v("1.0-1"), "unstable").unwrap();
        assert_eq!(item.architecture, Some(Architecture::Amd64));
    }

    #[test]
    fn parse_version_qualifier_is_not_an_arch() {
        let item = MigrationItem::parse("lightgreen/1.2", &v("1.0-1"), "unstable").unwrap();
        assert_eq!(item.architecture, None);
    }

    #[test]
    fn parse_explicit_suite() {
        let item = MigrationItem::parse("lightgreen_tpu", &v("1.0-1"), "unstable").unwrap();
        assert_eq!(item.source_suite, "tpu");
    }

    #[test]
    fn display_roundtrips_plain() {
        let item = MigrationItem::parse("lightgreen", &v("1.0-1"), "unstable").unwrap();
        assert_eq!(item.to_string(), "lightgreen");
    }
}
