// Copyright 2021-2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Run configuration: architecture categories, smooth-update settings, age
//! thresholds and hint permissions, loaded from an RFC822-like control file
//! and overridable from the command line.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use assorted_debian_utils::architectures::Architecture;
use assorted_debian_utils::package::PackageName;
use indicatif::ProgressStyle;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{HintKind, HINTS_ALL};

const PROGRESS_CHARS: &str = "█  ";

pub(crate) fn default_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar().progress_chars(PROGRESS_CHARS)
}

/// Raw on-disk representation of the config file, deserialized via
/// `rfc822-like` the same way the archive control files are.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConfig {
    architectures: String,
    #[serde(default)]
    nobreakall_arches: String,
    #[serde(default)]
    outofsync_arches: String,
    #[serde(default)]
    break_arches: String,
    #[serde(default)]
    new_arches: String,
    #[serde(default)]
    smooth_updates: String,
    #[serde(default)]
    default_urgency: Option<String>,
    /// Per-user hint permission lines, keyed `Hints-<user>: <kinds...>`
    /// (mirroring the `#[serde(flatten)]` catch-all already used by
    /// [`assorted_debian_utils::excuses::PolicyInfo`] for unknown fields).
    #[serde(default, flatten)]
    extra: HashMap<String, String>,
}

/// Per-architecture acceptance category: see the driver for how each
/// category changes acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchCategory {
    /// A regular release architecture: uninstallability regressions block.
    Standard,
    /// `nobreakall`: like standard but `Architecture::All` binaries on this
    /// arch are held to the same strict standard as normal binaries.
    NoBreakAll,
    /// `outofsync`: regressions are tolerated (the arch's buildds lag).
    OutOfSync,
    /// `break`: regressions are tolerated and never block other items.
    Break,
    /// `new`: the architecture is being bootstrapped, uninstallability is
    /// informational only.
    New,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub architectures: Vec<Architecture>,
    pub nobreakall_arches: Vec<Architecture>,
    pub outofsync_arches: Vec<Architecture>,
    pub break_arches: Vec<Architecture>,
    pub new_arches: Vec<Architecture>,
    /// Packages that participate in the smooth-update leftover removal pass
    /// (§4.H, §6), not a global on/off switch.
    pub smooth_updates: Vec<PackageName>,
    pub default_urgency: String,
    /// user -> set of permitted hint kind names (or the `ALL` wildcard).
    pub hint_permissions: HashMap<String, Vec<String>>,
}

impl Config {
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        Self::from_str(&data)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_str(&data)
    }

    fn from_str(data: &str) -> Result<Self> {
        let raw: RawConfig = rfc822_like::from_str(data)?;
        let parse_archs = |s: &str| -> Result<Vec<Architecture>> {
            s.split_whitespace()
                .map(|a| {
                    Architecture::try_from(a)
                        .map_err(|_| Error::Config(format!("unknown architecture '{a}'")))
                })
                .collect()
        };
        let mut hint_permissions: HashMap<String, Vec<String>> = HashMap::new();
        for (key, kinds) in &raw.extra {
            if let Some(user) = key.strip_prefix("Hints-") {
                hint_permissions.insert(user.to_owned(), kinds.split_whitespace().map(str::to_owned).collect());
            }
        }
        Ok(Self {
            architectures: parse_archs(&raw.architectures)?,
            nobreakall_arches: parse_archs(&raw.nobreakall_arches)?,
            outofsync_arches: parse_archs(&raw.outofsync_arches)?,
            break_arches: parse_archs(&raw.break_arches)?,
            new_arches: parse_archs(&raw.new_arches)?,
            smooth_updates: raw
                .smooth_updates
                .split_whitespace()
                .map(|p| PackageName::try_from(p).map_err(|_| Error::Config(format!("invalid package name '{p}' in Smooth-Updates"))))
                .collect::<Result<Vec<_>>>()?,
            default_urgency: raw.default_urgency.unwrap_or_else(|| "medium".to_owned()),
            hint_permissions,
        })
    }

    pub fn category_for(&self, arch: Architecture) -> ArchCategory {
        if self.new_arches.contains(&arch) {
            ArchCategory::New
        } else if self.break_arches.contains(&arch) {
            ArchCategory::Break
        } else if self.outofsync_arches.contains(&arch) {
            ArchCategory::OutOfSync
        } else if self.nobreakall_arches.contains(&arch) {
            ArchCategory::NoBreakAll
        } else {
            ArchCategory::Standard
        }
    }

    /// Whether `user` is permitted to use the given hint kind, honoring the
    /// `ALL` wildcard token.
    pub fn hint_allowed(&self, user: &str, kind: HintKind) -> bool {
        match self.hint_permissions.get(user) {
            Some(kinds) => {
                kinds.iter().any(|k| k == HINTS_ALL) || kinds.iter().any(|k| k == &kind.to_string())
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "\
Architectures: amd64 arm64 i386
Nobreakall-Arches: i386
Outofsync-Arches:
Break-Arches:
New-Arches:
Smooth-Updates: libfoo2 libbar1
";

    #[test]
    fn parses_architectures() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(
            config.architectures,
            vec![Architecture::Amd64, Architecture::Arm64, Architecture::I386]
        );
        assert_eq!(config.category_for(Architecture::I386), ArchCategory::NoBreakAll);
        assert_eq!(config.category_for(Architecture::Amd64), ArchCategory::Standard);
        assert_eq!(
            config.smooth_updates,
            vec![PackageName::try_from("libfoo2").unwrap(), PackageName::try_from("libbar1").unwrap()]
        );
    }

    #[test]
    fn smooth_updates_defaults_to_empty() {
        let data = "Architectures: amd64\n";
        let config = Config::from_str(data).unwrap();
        assert!(config.smooth_updates.is_empty());
    }

    #[test]
    fn hint_permission_wildcard() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        config
            .hint_permissions
            .insert("releaseteam".to_owned(), vec![HINTS_ALL.to_owned()]);
        assert!(config.hint_allowed("releaseteam", HintKind::Block));
        assert!(!config.hint_allowed("randomdd", HintKind::Block));
    }

    #[test]
    fn hints_prefixed_fields_are_parsed_as_permissions() {
        let data = format!("{SAMPLE}Hints-releaseteam: block unblock force\nHints-randomdd: easy\n");
        let config = Config::from_str(&data).unwrap();
        assert!(config.hint_allowed("releaseteam", HintKind::Block));
        assert!(config.hint_allowed("releaseteam", HintKind::Force));
        assert!(!config.hint_allowed("releaseteam", HintKind::Remove));
        assert!(config.hint_allowed("randomdd", HintKind::Easy));
        assert!(!config.hint_allowed("randomdd", HintKind::Block));
    }
}
