// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Archive ingestion (§4.J): reads `Sources`, `Packages_<arch>` (optionally
//! `.gz`/`.xz` compressed) and the small side-files (`BugsV`, `Dates`,
//! `Urgency`, `faux-packages`, `constraints`) into this crate's model types,
//! using the same RFC822-paragraph reader this toolchain already uses for
//! `.buildinfo`/`Release` files. `faux-packages` entries are synthesised
//! directly into a [`Suite`] as a fake source plus one binary per listed
//! architecture; `constraints` entries of kind `present-and-installable`
//! become the keep-installable set the driver checks on every migration.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use assorted_debian_utils::architectures::Architecture;
use assorted_debian_utils::package::PackageName;
use assorted_debian_utils::version::PackageVersion;
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use serde::Deserialize;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};
use crate::model::{
    BinaryId, BinaryPackage, MultiArch as ModelMultiArch, RelationTerm, SourcePackage, VersionConstraint,
};
use crate::suite::Suite;

/// Open a `Packages`/`Sources` file, transparently decompressing `.gz`/`.xz`
/// suffixes.
fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Ok(Box::new(GzDecoder::new(file))),
        Some("xz") => Ok(Box::new(XzDecoder::new(file))),
        _ => Ok(Box::new(file)),
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    let mut reader = open_reader(path)?;
    let mut data = String::new();
    reader.read_to_string(&mut data)?;
    Ok(data)
}

/// Resolve `<dir>/<base_name>`, trying the plain file first and then the
/// `.gz`/`.xz` compressed variants (§4.J, §6 "Input files").
pub fn find_control_file(dir: &Path, base_name: &str) -> Option<std::path::PathBuf> {
    for candidate in [base_name.to_owned(), format!("{base_name}.gz"), format!("{base_name}.xz")] {
        let path = dir.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

/// Split a Debian relation field (`foo (>= 1.2), bar | baz (= 1.0)`) into its
/// conjunction of disjunctions.
pub fn parse_relation_field(field: &str) -> Result<Vec<Vec<RelationTerm>>> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_disjunction)
        .collect()
}

fn parse_disjunction(clause: &str) -> Result<Vec<RelationTerm>> {
    clause.split('|').map(str::trim).map(parse_term).collect()
}

fn parse_term(term: &str) -> Result<RelationTerm> {
    // Multi-arch qualifiers (`foo:any`) and build-profile/arch restrictions
    // (`<!nocheck>`, `[amd64]`) never affect who can satisfy the relation
    // for this engine's purposes, so they are stripped outright.
    let term = term.split('<').next().unwrap_or(term).trim();
    let term = term.split('[').next().unwrap_or(term).trim();
    let (name_part, constraint) = match term.split_once('(') {
        Some((name, rest)) => {
            let rest = rest.trim_end_matches(')').trim();
            let (op, rest) = split_operator(rest)
                .ok_or_else(|| Error::DataInconsistency(format!("unknown relation operator in '{term}'")))?;
            let version = PackageVersion::try_from(rest.trim())
                .map_err(|_| Error::DataInconsistency(format!("invalid version in '{term}'")))?;
            (name, Some((op, version)))
        }
        None => (term, None),
    };
    let name_part = name_part.split(':').next().unwrap_or(name_part).trim();
    let name = PackageName::try_from(name_part)
        .map_err(|_| Error::DataInconsistency(format!("invalid package name '{name_part}'")))?;
    Ok(RelationTerm { name, constraint })
}

fn split_operator(s: &str) -> Option<(VersionConstraint, &str)> {
    for (prefix, op) in [
        ("<<", VersionConstraint::Lt),
        ("<=", VersionConstraint::Le),
        (">>", VersionConstraint::Gt),
        (">=", VersionConstraint::Ge),
        ("=", VersionConstraint::Eq),
        ("<", VersionConstraint::Lt),
        (">", VersionConstraint::Gt),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return Some((op, rest));
        }
    }
    None
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawBinary {
    package: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
    architecture: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    multi_arch: Option<String>,
    #[serde(default)]
    pre_depends: Option<String>,
    #[serde(default)]
    depends: Option<String>,
    #[serde(default)]
    conflicts: Option<String>,
    #[serde(default)]
    breaks: Option<String>,
    #[serde(default)]
    provides: Option<String>,
    #[serde(default)]
    essential: Option<String>,
}

fn parse_multi_arch(s: Option<&str>) -> ModelMultiArch {
    match s.map(str::to_ascii_lowercase).as_deref() {
        Some("same") => ModelMultiArch::Same,
        Some("foreign") => ModelMultiArch::Foreign,
        Some("allowed") => ModelMultiArch::Allowed,
        _ => ModelMultiArch::No,
    }
}

fn parse_provides(s: Option<&str>) -> Result<Vec<(PackageName, Option<PackageVersion>)>> {
    let Some(s) = s else { return Ok(Vec::new()) };
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (name_part, version) = match entry.split_once('(') {
                Some((name, rest)) => {
                    let rest = rest.trim_end_matches(')').trim();
                    let (_, rest) = split_operator(rest)
                        .ok_or_else(|| Error::DataInconsistency(format!("unknown Provides operator in '{entry}'")))?;
                    let version = PackageVersion::try_from(rest.trim())
                        .map_err(|_| Error::DataInconsistency(format!("invalid Provides version in '{entry}'")))?;
                    (name, Some(version))
                }
                None => (entry, None),
            };
            let name = PackageName::try_from(name_part.trim())
                .map_err(|_| Error::DataInconsistency(format!("invalid Provides name '{name_part}'")))?;
            Ok((name, version))
        })
        .collect()
}

/// Parse a single `Packages` (or `Packages_<arch>`) file into `suite`. The
/// file is expected to contain binaries for one architecture only.
pub fn ingest_packages(suite: &mut Suite, path: &Path) -> Result<()> {
    let data = read_to_string(path)?;
    let entries: Vec<RawBinary> = rfc822_like::from_str(&data)?;
    for entry in entries {
        let package = PackageName::try_from(entry.package.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid package name '{}'", entry.package)))?;
        let version = PackageVersion::try_from(entry.version.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid version '{}'", entry.version)))?;
        let architecture = Architecture::try_from(entry.architecture.as_str())
            .map_err(|_| Error::DataInconsistency(format!("unknown architecture '{}'", entry.architecture)))?;

        // Pre-Depends is merged into Depends (§4.J); clauses are kept in
        // file order, Pre-Depends first.
        let mut depends = Vec::new();
        if let Some(pre) = &entry.pre_depends {
            depends.extend(parse_relation_field(pre)?);
        }
        if let Some(dep) = &entry.depends {
            depends.extend(parse_relation_field(dep)?);
        }

        // Breaks is merged into Conflicts (§4.J).
        let mut conflicts = Vec::new();
        if let Some(c) = &entry.conflicts {
            conflicts.extend(parse_disjunctions_flat(c)?);
        }
        if let Some(b) = &entry.breaks {
            conflicts.extend(parse_disjunctions_flat(b)?);
        }

        let (source_name, source_version) = match &entry.source {
            Some(field) => {
                // "name (version)" or bare "name"; bare name means the
                // source shares the binary's own version.
                match field.split_once('(') {
                    Some((name, rest)) => {
                        let v = rest.trim_end_matches(')').trim();
                        let sv = PackageVersion::try_from(v)
                            .map_err(|_| Error::DataInconsistency(format!("invalid source version '{v}'")))?;
                        let n = PackageName::try_from(name.trim())
                            .map_err(|_| Error::DataInconsistency(format!("invalid source name '{name}'")))?;
                        (n, sv)
                    }
                    None => {
                        let n = PackageName::try_from(field.trim())
                            .map_err(|_| Error::DataInconsistency(format!("invalid source name '{field}'")))?;
                        (n, version.clone())
                    }
                }
            }
            None => (package.clone(), version.clone()),
        };

        let pkg = BinaryPackage {
            id: crate::model::BinaryId::new(package, version, architecture),
            source_name,
            source_version,
            section: entry.section.unwrap_or_else(|| "misc".to_owned()),
            multi_arch: parse_multi_arch(entry.multi_arch.as_deref()),
            depends,
            conflicts,
            provides: parse_provides(entry.provides.as_deref())?,
            essential: matches!(entry.essential.as_deref(), Some("yes")),
        };
        suite.insert_binary(pkg);
    }
    Ok(())
}

/// Conflicts/Breaks are a flat disjunction list, not a CNF: each entry is
/// its own one-term "clause" joined by `|` only within a single entry (in
/// practice Debian policy never emits `|` inside Conflicts, but nothing
/// here assumes it doesn't).
fn parse_disjunctions_flat(field: &str) -> Result<Vec<RelationTerm>> {
    Ok(parse_relation_field(field)?.into_iter().flatten().collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSource {
    package: String,
    version: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    maintainer: Option<String>,
    #[serde(default)]
    build_depends: Option<String>,
    #[serde(default)]
    build_depends_arch: Option<String>,
    #[serde(default)]
    build_depends_indep: Option<String>,
    #[serde(default)]
    testsuite: Option<String>,
    #[serde(default)]
    testsuite_triggers: Option<String>,
    #[serde(default)]
    extra_source_only: Option<String>,
}

/// Parse a `Sources` file into `suite`. `Extra-Source-Only: yes` entries are
/// dropped (§4.J, §6).
pub fn ingest_sources(suite: &mut Suite, path: &Path) -> Result<()> {
    let data = read_to_string(path)?;
    let entries: Vec<RawSource> = rfc822_like::from_str(&data)?;
    for entry in entries {
        if matches!(entry.extra_source_only.as_deref(), Some("yes")) {
            continue;
        }
        let name = PackageName::try_from(entry.package.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid package name '{}'", entry.package)))?;
        let version = PackageVersion::try_from(entry.version.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid version '{}'", entry.version)))?;

        let mut build_depends_arch = Vec::new();
        if let Some(bd) = &entry.build_depends {
            build_depends_arch.extend(parse_relation_field(bd)?);
        }
        if let Some(bda) = &entry.build_depends_arch {
            build_depends_arch.extend(parse_relation_field(bda)?);
        }
        let build_depends_indep = match &entry.build_depends_indep {
            Some(bdi) => parse_relation_field(bdi)?,
            None => Vec::new(),
        };

        let testsuite = entry
            .testsuite
            .as_deref()
            .map(|s| s.split(',').map(|t| t.trim().to_owned()).collect())
            .unwrap_or_default();
        let testsuite_triggers = match &entry.testsuite_triggers {
            Some(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| PackageName::try_from(s).map_err(|_| Error::DataInconsistency(format!("invalid testsuite trigger '{s}'"))))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        suite.sources.insert(
            name.clone(),
            SourcePackage {
                name,
                version,
                section: entry.section.unwrap_or_else(|| "misc".to_owned()),
                maintainer: entry.maintainer.unwrap_or_default(),
                is_fake: false,
                build_depends_arch,
                build_depends_indep,
                testsuite,
                testsuite_triggers,
                binaries: Vec::new(),
            },
        );
    }
    Ok(())
}

/// After ingesting `Sources` and every `Packages_<arch>` for a suite,
/// backfill `SourcePackage::binaries` and synthesise a fake source for any
/// binary whose `Source` field names nothing in `Sources` (§4.A, §4.J).
pub fn link_binaries_to_sources(suite: &mut Suite) {
    let mut per_source: HashMap<PackageName, Vec<crate::model::BinaryId>> = HashMap::new();
    let mut missing: HashMap<PackageName, PackageVersion> = HashMap::new();
    for per_arch in suite.binaries.values() {
        for pkg in per_arch.values() {
            per_source
                .entry(pkg.source_name.clone())
                .or_default()
                .push(pkg.id.clone());
            if !suite.sources.contains_key(&pkg.source_name) {
                missing
                    .entry(pkg.source_name.clone())
                    .or_insert_with(|| pkg.source_version.clone());
            }
        }
    }
    for (name, version) in missing {
        suite.sources.insert(name.clone(), SourcePackage::fake(name, version));
    }
    for (name, ids) in per_source {
        if let Some(src) = suite.sources.get_mut(&name) {
            src.binaries = ids;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFauxPackage {
    package: String,
    version: String,
    #[serde(default)]
    architecture: Option<String>,
}

/// Parse a `faux-packages` tag-file, synthesising a fake source plus one
/// binary per listed architecture directly into `suite` (§4.J, §6). A
/// missing or `all` `Architecture` field expands to every architecture in
/// `architectures`. Must run before [`link_binaries_to_sources`] so the
/// usual source/binary backfill picks up the synthesised entries too.
pub fn ingest_faux_packages(suite: &mut Suite, path: &Path, architectures: &[Architecture]) -> Result<()> {
    let data = read_to_string(path)?;
    let entries: Vec<RawFauxPackage> = rfc822_like::from_str(&data)?;
    for entry in entries {
        let name = PackageName::try_from(entry.package.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid faux package name '{}'", entry.package)))?;
        let version = PackageVersion::try_from(entry.version.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid faux package version '{}'", entry.version)))?;
        let archs: Vec<Architecture> = match entry.architecture.as_deref() {
            None | Some("all") => architectures.to_vec(),
            Some(list) => list
                .split_whitespace()
                .map(|a| {
                    Architecture::try_from(a)
                        .map_err(|_| Error::DataInconsistency(format!("unknown architecture '{a}' in faux-packages")))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        suite
            .sources
            .entry(name.clone())
            .or_insert_with(|| SourcePackage::fake(name.clone(), version.clone()));
        for arch in archs {
            suite.insert_binary(BinaryPackage {
                id: BinaryId::new(name.clone(), version.clone(), arch),
                source_name: name.clone(),
                source_version: version.clone(),
                section: "faux".to_owned(),
                multi_arch: ModelMultiArch::No,
                depends: Vec::new(),
                conflicts: Vec::new(),
                provides: Vec::new(),
                essential: false,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConstraint {
    package: String,
    constraint: String,
}

/// Parse a `constraints` tag-file into the keep-installable set (§6, §8
/// testable property 5): the only constraint kind implemented is
/// `present-and-installable`, so every other `Constraint` value is ignored.
pub fn read_constraints(path: &Path) -> Result<std::collections::HashSet<PackageName>> {
    let data = read_to_string(path)?;
    let entries: Vec<RawConstraint> = rfc822_like::from_str(&data)?;
    let mut keep_installable = std::collections::HashSet::new();
    for entry in entries {
        if entry.constraint.trim() != "present-and-installable" {
            continue;
        }
        let name = PackageName::try_from(entry.package.as_str())
            .map_err(|_| Error::DataInconsistency(format!("invalid package name '{}' in constraints", entry.package)))?;
        keep_installable.insert(name);
    }
    Ok(keep_installable)
}

/// `BugsV`: whitespace-separated `<source> <bug-id>[ <bug-id>...]` or one
/// bug per line depending on generator; this reads either, one record per
/// `(source, bug-id)` pair.
pub fn read_bugs(path: &Path) -> Result<HashMap<PackageName, std::collections::HashSet<u32>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out: HashMap<PackageName, std::collections::HashSet<u32>> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(source) = parts.next() else { continue };
        let Ok(name) = PackageName::try_from(source) else { continue };
        for bug in parts {
            if let Ok(id) = bug.parse::<u32>() {
                out.entry(name.clone()).or_default().insert(id);
            }
        }
    }
    Ok(out)
}

/// `Dates`: `<source> <version> <epoch-days>`.
pub fn read_dates(path: &Path) -> Result<HashMap<(PackageName, PackageVersion), DateTime<Utc>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let (Some(source), Some(version), Some(days)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(name), Ok(version), Ok(days)) = (
            PackageName::try_from(source),
            PackageVersion::try_from(version),
            days.parse::<i64>(),
        ) else {
            continue;
        };
        if let Some(date) = Utc.timestamp_opt(days * 86400, 0).single() {
            out.insert((name, version), date);
        }
    }
    Ok(out)
}

/// `Urgency`: `<source> <version> <urgency>`, keeping only the newest
/// version's urgency per source as the record is keyed by source alone
/// downstream.
pub fn read_urgencies(path: &Path) -> Result<HashMap<PackageName, String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out: HashMap<PackageName, (PackageVersion, String)> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let (Some(source), Some(version), Some(urgency)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(name), Ok(version)) = (PackageName::try_from(source), PackageVersion::try_from(version)) else {
            continue;
        };
        out.entry(name)
            .and_modify(|(existing_version, existing_urgency)| {
                if version > *existing_version {
                    *existing_version = version.clone();
                    *existing_urgency = urgency.to_owned();
                }
            })
            .or_insert((version, urgency.to_owned()));
    }
    Ok(out.into_iter().map(|(k, (_, u))| (k, u)).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SuiteClass;

    #[test]
    fn parses_simple_relation_field() {
        let parsed = parse_relation_field("foo (>= 1.2), bar | baz").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].len(), 1);
        assert_eq!(parsed[0][0].name, PackageName::try_from("foo").unwrap());
        assert_eq!(parsed[1].len(), 2);
    }

    #[test]
    fn strips_architecture_and_profile_restrictions() {
        let parsed = parse_relation_field("foo:any [amd64] <!nocheck>").unwrap();
        assert_eq!(parsed[0][0].name, PackageName::try_from("foo").unwrap());
    }

    #[test]
    fn ingest_packages_merges_predepends_and_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        std::fs::write(
            &path,
            "Package: foo\nVersion: 1.0\nArchitecture: amd64\nPre-Depends: libc6\nDepends: bar\nBreaks: old-foo\n\n",
        )
        .unwrap();
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        ingest_packages(&mut suite, &path).unwrap();
        let pkg = suite.binary(Architecture::Amd64, &PackageName::try_from("foo").unwrap()).unwrap();
        assert_eq!(pkg.depends.len(), 2);
        assert_eq!(pkg.conflicts.len(), 1);
    }

    #[test]
    fn missing_source_gets_fake_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Packages");
        std::fs::write(&path, "Package: orphan\nVersion: 1.0\nArchitecture: amd64\n\n").unwrap();
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        ingest_packages(&mut suite, &path).unwrap();
        link_binaries_to_sources(&mut suite);
        let src = suite.sources.get(&PackageName::try_from("orphan").unwrap()).unwrap();
        assert!(src.is_fake);
    }

    #[test]
    fn faux_package_expands_to_every_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faux-packages");
        std::fs::write(&path, "Package: faux-essential\nVersion: 1\n\n").unwrap();
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        ingest_faux_packages(&mut suite, &path, &[Architecture::Amd64, Architecture::Arm64]).unwrap();
        let name = PackageName::try_from("faux-essential").unwrap();
        assert!(suite.binary(Architecture::Amd64, &name).is_some());
        assert!(suite.binary(Architecture::Arm64, &name).is_some());
        assert!(suite.sources.get(&name).unwrap().is_fake);
    }

    #[test]
    fn faux_package_respects_explicit_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faux-packages");
        std::fs::write(&path, "Package: faux-only-amd64\nVersion: 1\nArchitecture: amd64\n\n").unwrap();
        let mut suite = Suite::new(SuiteClass::Target, "testing", "t");
        ingest_faux_packages(&mut suite, &path, &[Architecture::Amd64, Architecture::Arm64]).unwrap();
        let name = PackageName::try_from("faux-only-amd64").unwrap();
        assert!(suite.binary(Architecture::Amd64, &name).is_some());
        assert!(suite.binary(Architecture::Arm64, &name).is_none());
    }

    #[test]
    fn constraints_keeps_only_present_and_installable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constraints");
        std::fs::write(
            &path,
            "Package: libc6\nConstraint: present-and-installable\n\nPackage: ignored-pkg\nConstraint: something-else\n\n",
        )
        .unwrap();
        let keep_installable = read_constraints(&path).unwrap();
        assert!(keep_installable.contains(&PackageName::try_from("libc6").unwrap()));
        assert!(!keep_installable.contains(&PackageName::try_from("ignored-pkg").unwrap()));
    }
}
