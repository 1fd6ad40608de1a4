// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error taxonomy for the migration engine.

use crate::model::BinaryId;

/// Errors that can terminate a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file or CLI arguments are malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The archive data read from disk is internally inconsistent (e.g. a
    /// source lists a binary that does not exist in any `Packages` file).
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// A binary referenced during universe construction or testing is not
    /// known.
    #[error("unknown package: {0}")]
    UnknownPackage(Box<BinaryId>),

    /// A migration was attempted that would violate a structural invariant
    /// of the target suite (e.g. leaving a dangling dependency).
    #[error("migration constraint violation: {0}")]
    ConstraintViolation(String),

    /// An internal invariant that should always hold was found violated;
    /// these indicate a bug rather than bad input.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse control file: {0}")]
    Rfc822(#[from] rfc822_like::de::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal problems encountered while parsing hint files: these are
/// logged as warnings and the offending line is skipped, never abort a run.
#[derive(Debug, thiserror::Error)]
pub enum HintWarning {
    #[error("{user} is not permitted to use the '{kind}' hint")]
    PermissionDenied { user: String, kind: String },

    #[error("cannot parse hint line: {0}")]
    Malformed(String),
}
