// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Output rendering (§4.L): `HeidiResult`/`HeidiResultDelta`, `excuses.yaml`
//! (sharing the shape [`assorted_debian_utils::excuses`] already reads back
//! downstream), a minimal `excuses.html`, and the `nuninst` counters file.

use std::collections::BTreeMap;
use std::io::Write;

use assorted_debian_utils::architectures::Architecture;
use assorted_debian_utils::excuses::{Excuses, ExcusesItem, MissingBuilds, PolicyInfo, UnspecfiedPolicyInfo};
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::excuse::Excuse;
use crate::model::MigrationItem;
use crate::suite::Suite;

/// One accepted migration item, in acceptance order: `[-]<name> <ver>[ <arch>]`
/// (§6), distinct from [`MigrationItem`]'s `Display` (which renders the
/// `[-]name[/arch][_suite]` reference form used in hints and `--actions`).
pub fn write_heidi_delta(mut out: impl Write, accepted: &[MigrationItem]) -> Result<()> {
    for item in accepted {
        write!(out, "{}{}", if item.is_removal { "-" } else { "" }, item.source_name)?;
        write!(out, " {}", item.version)?;
        if let Some(arch) = &item.architecture {
            write!(out, " {arch}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// `faux` (and `*/faux`) sections are never written to `HeidiResult` (§6).
fn is_faux_section(section: &str) -> bool {
    section == "faux" || section.ends_with("/faux")
}

/// `HeidiResult`: every binary (sorted by arch then name), then every
/// source, sorted by name; `faux` sections skipped throughout (§6).
pub fn write_heidi_result(mut out: impl Write, target: &Suite) -> Result<()> {
    let mut archs: Vec<&Architecture> = target.binaries.keys().collect();
    archs.sort_by_key(|a| a.to_string());
    for arch in archs {
        let mut names: Vec<_> = target.binaries[arch].values().collect();
        names.sort_by(|a, b| a.id.name.cmp(&b.id.name));
        for pkg in names {
            if is_faux_section(&pkg.section) {
                continue;
            }
            writeln!(out, "{} {} {} {}", pkg.id.name, pkg.id.version, pkg.id.architecture, pkg.section)?;
        }
    }
    let mut sources: Vec<_> = target.sources.values().collect();
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    for src in sources {
        if is_faux_section(&src.section) {
            continue;
        }
        writeln!(out, "{} {} source {}", src.name, src.version, src.section)?;
    }
    Ok(())
}

fn to_excuses_item(excuse: &Excuse, is_candidate: bool) -> ExcusesItem {
    let mut extras = std::collections::HashMap::new();
    extras.insert(
        "depends".to_owned(),
        UnspecfiedPolicyInfo {
            verdict: if excuse.depends_satisfied {
                assorted_debian_utils::excuses::Verdict::Pass
            } else {
                assorted_debian_utils::excuses::Verdict::RejectedCannotDetermineIfPermanent
            },
        },
    );
    ExcusesItem {
        is_candidate,
        new_version: if excuse.is_removal { "-".to_owned() } else { excuse.new_version.to_string() },
        old_version: excuse.old_version.to_string(),
        item_name: excuse.item_name.clone(),
        source: excuse.source.to_string(),
        invalidated_by_other_package: excuse.invalidated_by_other_package,
        component: excuse.component,
        missing_builds: (!excuse.missing_builds.is_empty()).then(|| MissingBuilds {
            on_architectures: excuse.missing_builds.clone(),
        }),
        policy_info: Some(PolicyInfo {
            age: None,
            builtonbuildd: None,
            extras,
        }),
    }
}

/// `excuses.yaml`: the full excuse set, round-trippable through
/// [`assorted_debian_utils::excuses::from_reader`].
pub fn write_excuses_yaml(mut out: impl Write, excuses: &[Excuse], accepted: &[String], generated: DateTime<Utc>) -> Result<()> {
    let accepted: std::collections::HashSet<&str> = accepted.iter().map(String::as_str).collect();
    let doc = Excuses {
        generated_date: generated,
        sources: excuses
            .iter()
            .map(|e| to_excuses_item(e, accepted.contains(e.item_name.as_str())))
            .collect(),
    };
    serde_yaml::to_writer(&mut out, &doc)?;
    Ok(())
}

/// A minimal HTML rendering for human consumption; the YAML file remains
/// the machine/authoritative source of truth (§6).
pub fn write_excuses_html(mut out: impl Write, excuses: &[Excuse]) -> Result<()> {
    writeln!(out, "<!DOCTYPE html><html><body><table>")?;
    writeln!(out, "<tr><th>item</th><th>old</th><th>new</th><th>verdict</th><th>notes</th></tr>")?;
    for excuse in excuses {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:?}</td><td>{}</td></tr>",
            excuse.item_name,
            excuse.old_version,
            if excuse.is_removal { "-".to_owned() } else { excuse.new_version.to_string() },
            excuse.verdict,
            excuse.notes.join("; "),
        )?;
    }
    writeln!(out, "</table></body></html>")?;
    Ok(())
}

/// `nuninst` counters: per-arch broken-package-name lists, plus an
/// `<arch>+all:` variant that also folds in `Architecture::All` breakage
/// (§6).
pub fn write_nuninst(
    mut out: impl Write,
    built_on: &str,
    last_update: DateTime<Utc>,
    per_arch: &BTreeMap<Architecture, Vec<String>>,
    per_arch_with_all: &BTreeMap<Architecture, Vec<String>>,
) -> Result<()> {
    writeln!(out, "Built on: {built_on}")?;
    writeln!(out, "Last update: {}", last_update.format("%Y-%m-%d %H:%M:%S"))?;
    for (arch, names) in per_arch {
        writeln!(out, "{arch}: {}", names.join(" "))?;
    }
    for (arch, names) in per_arch_with_all {
        writeln!(out, "{arch}+all: {}", names.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{BinaryPackage, MultiArch, SourcePackage, SuiteClass};
    use assorted_debian_utils::package::PackageName;
    use assorted_debian_utils::version::PackageVersion;

    fn n(s: &str) -> PackageName {
        PackageName::try_from(s).unwrap()
    }
    fn v(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    #[test]
    fn heidi_result_skips_faux_sections() {
        let mut target = Suite::new(SuiteClass::Target, "testing", "t");
        target.insert_binary(BinaryPackage {
            id: crate::model::BinaryId::new(n("real"), v("1"), Architecture::Amd64),
            source_name: n("real"),
            source_version: v("1"),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        });
        target.insert_binary(BinaryPackage {
            id: crate::model::BinaryId::new(n("fakepkg"), v("1"), Architecture::Amd64),
            source_name: n("fakepkg"),
            source_version: v("1"),
            section: "faux".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        });
        target.sources.insert(n("real"), SourcePackage::fake(n("real"), v("1")));
        let mut buf = Vec::new();
        write_heidi_result(&mut buf, &target).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("real 1 amd64 misc"));
        assert!(!text.contains("fakepkg"));
    }

    #[test]
    fn heidi_delta_one_line_per_item() {
        let items = vec![
            MigrationItem::parse("foo", &v("1"), "unstable").unwrap(),
            MigrationItem::parse("-bar", &v("1"), "unstable").unwrap(),
        ];
        let mut buf = Vec::new();
        write_heidi_delta(&mut buf, &items).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "foo 1");
        assert_eq!(lines[1], "-bar 1");
    }
}
