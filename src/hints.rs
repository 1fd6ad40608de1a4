// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hint parsing (§4.K): reads `Hints/<user>` line by line. Permission
//! failures and unparseable lines are warnings (§7), never fatal.

use std::fs;
use std::path::Path;

use assorted_debian_utils::version::PackageVersion;
use log::warn;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Hint, HintKind, MigrationItem};

/// Parse every hint line in `body`, attributing it to `user`. Lines the
/// user isn't permitted to use are dropped with a warning rather than
/// failing the run (§7 "hint parse/permission error").
pub fn parse_hint_file(user: &str, body: &str, config: &Config, default_suite: &str) -> Vec<Hint> {
    let mut hints = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "finished" {
            break;
        }
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else { continue };
        let Ok(kind) = command.parse::<HintKind>() else {
            warn!("{user}: unrecognised hint command '{command}'");
            continue;
        };
        if !config.hint_allowed(user, kind) {
            warn!("{user} is not permitted to use the '{kind}' hint");
            continue;
        }
        let mut arguments = Vec::new();
        let mut malformed = false;
        for arg in parts {
            // A bare version placeholder: the real archive version is
            // resolved later by whoever consumes the hint against the
            // current source-suite contents; here we only need a
            // placeholder that round-trips through `Display`.
            let placeholder = PackageVersion::try_from("0").unwrap_or_else(|_| unreachable!());
            match MigrationItem::parse(arg, &placeholder, default_suite) {
                Ok(item) => arguments.push(item),
                Err(_) => {
                    warn!("{user}: cannot parse hint argument '{arg}' on line '{line}'");
                    malformed = true;
                }
            }
        }
        if malformed && arguments.is_empty() {
            continue;
        }
        hints.push(Hint {
            kind,
            user: user.to_owned(),
            arguments,
            active: true,
        });
    }
    hints
}

/// Read every file directly under `hints_dir`, one per user (the filename
/// is the username).
pub fn read_hints_dir(hints_dir: &Path, config: &Config, default_suite: &str) -> Result<Vec<Hint>> {
    let mut hints = Vec::new();
    for entry in fs::read_dir(hints_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let user = entry.file_name().to_string_lossy().into_owned();
        let body = fs::read_to_string(entry.path())?;
        hints.extend(parse_hint_file(&user, &body, config, default_suite));
    }
    Ok(hints)
}

/// Parse the semicolon-separated `--hints` CLI string (`easy foo; block bar`)
/// as if it were a single hint file authored by `user`.
pub fn parse_cli_hints(user: &str, spec: &str, config: &Config, default_suite: &str) -> Vec<Hint> {
    let body = spec.replace(';', "\n");
    parse_hint_file(user, &body, config, default_suite)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_with(user: &str, kinds: &[&str]) -> Config {
        Config {
            architectures: Vec::new(),
            nobreakall_arches: Vec::new(),
            outofsync_arches: Vec::new(),
            break_arches: Vec::new(),
            new_arches: Vec::new(),
            smooth_updates: Vec::new(),
            default_urgency: "medium".to_owned(),
            hint_permissions: HashMap::from([(user.to_owned(), kinds.iter().map(|s| s.to_string()).collect())]),
        }
    }

    #[test]
    fn parses_block_hint() {
        let config = config_with("releaseteam", &["block"]);
        let hints = parse_hint_file("releaseteam", "block foo\n", &config, "unstable");
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].kind, HintKind::Block);
        assert_eq!(hints[0].arguments[0].source_name, "foo");
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let config = config_with("releaseteam", &["ALL"]);
        let hints = parse_hint_file("releaseteam", "# comment\n\nblock foo\n", &config, "unstable");
        assert_eq!(hints.len(), 1);
    }

    #[test]
    fn finished_stops_parsing() {
        let config = config_with("releaseteam", &["ALL"]);
        let hints = parse_hint_file("releaseteam", "block foo\nfinished\nblock bar\n", &config, "unstable");
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].arguments[0].source_name, "foo");
    }

    #[test]
    fn unpermitted_command_is_dropped_not_fatal() {
        let config = config_with("randomdd", &["easy"]);
        let hints = parse_hint_file("randomdd", "block foo\n", &config, "unstable");
        assert!(hints.is_empty());
    }
}
