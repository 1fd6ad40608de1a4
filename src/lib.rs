// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! # britney: a migration engine for Debian-style release suites
//!
//! This crate consists of the following modules, one per component of the
//! migration engine:
//! * [model]: core data types (package identities, migration items, hints)
//! * [ingest]: archive ingestion (`Sources`/`Packages`/side-files)
//! * [universe]: the Package Universe builder
//! * [installability]: the Installability Tester
//! * [suite]: suite snapshots and the mutable Target Suite State
//! * [transaction]: the RAII Migration Transaction
//! * [excuse]: the Excuse Builder
//! * [policy]: the Policy Engine
//! * [invalidation]: Excuse Invalidation
//! * [solver]: the partial-order solver (constraint graph, SCCs, scheduling)
//! * [driver]: the Migration Driver tying the above together
//! * [output]: `HeidiResult`/`excuses.yaml`/`excuses.html`/`nuninst` rendering
//! * [hints]: hint file and `--hints` CLI parsing
//! * [config]: run configuration
//! * [error]: the error taxonomy
//! * [cli]: the command-line surface

#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod excuse;
pub mod hints;
pub mod ingest;
pub mod installability;
pub mod invalidation;
pub mod model;
pub mod output;
pub mod policy;
pub mod solver;
pub mod suite;
pub mod transaction;
pub mod universe;
