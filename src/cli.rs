// Copyright 2021-2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::Parser;

/// Computes which source package upgrades may migrate into a release suite.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct BritneyOptions {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,

    /// Path to the run's configuration file.
    #[clap(short, long)]
    pub config: PathBuf,

    /// Restrict the run to these architectures (default: all configured).
    #[clap(long, value_delimiter = ',')]
    pub architectures: Vec<String>,

    /// Restrict the run to these migration items (default: every candidate
    /// with a passing verdict); accepts the same `[-]name[/arch]` syntax as
    /// hint file arguments.
    #[clap(long, value_delimiter = ',')]
    pub actions: Vec<String>,

    /// Directory containing the `Sources`, `Packages_<arch>` and `Release`
    /// control files for each suite, laid out as `<suite>/Sources` etc.
    #[clap(long)]
    pub control_files: PathBuf,

    /// Semicolon-separated command-line hints (e.g. `"easy foo; block bar"`),
    /// applied as if authored by a `cmdline` user in addition to whatever
    /// `Hints/<user>` files `--control-files` carries.
    #[clap(long)]
    pub hints: Option<String>,

    /// Drop into an interactive hint tester instead of running a migration.
    #[clap(long)]
    pub hint_tester: bool,

    /// Compute and print excuses, but do not commit any migration or write
    /// output files.
    #[clap(long)]
    pub dry_run: bool,

    /// Skip the partial-order migration phase entirely; only compute and
    /// emit excuses.
    #[clap(long)]
    pub no_compute_migrations: bool,

    /// Path to a cache file with the previous run's uninstallability counts,
    /// used to report deltas.
    #[clap(long)]
    pub nuninst_cache: Option<PathBuf>,

    /// Print a summary of uninstallable packages per architecture to stdout.
    #[clap(long)]
    pub print_uninst: bool,

    /// Output directory for `Heidi` results, `excuses.yaml`/`.html` and the
    /// uninstallability cache.
    #[clap(short, long)]
    pub output_dir: PathBuf,

    /// Name of the target suite: labels output files and is the default
    /// suite for bare migration item references.
    #[clap(long, default_value = "testing")]
    pub series: String,
}
