// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::rc::Rc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};

use britney::cli::BritneyOptions;
use britney::config::Config;
use britney::driver;
use britney::excuse::ExcuseBuilder;
use britney::hints;
use britney::ingest;
use britney::installability::InstallabilityTester;
use britney::invalidation;
use britney::model::SuiteClass;
use britney::output;
use britney::policy::{AgePolicy, AutopkgtestPolicy, BuildDependsPolicy, PiupartsPolicy, PolicyContext, RcBugsPolicy};
use britney::suite::{Suite, TargetSuiteState};
use britney::universe::PackageUniverse;

/// The conventional name of the primary source suite directory underneath
/// `--control-files`, matching the Debian archive layout this engine was
/// built against (`<series>` holds the target, `unstable` the candidates).
const PRIMARY_SOURCE_DIR: &str = "unstable";

/// Read one suite's `Sources`/`Packages_<arch>`/`Release` control files from
/// `<control_files>/<dir_name>` (§6 "Input files"), folding in `faux_packages`
/// (if any `faux-packages` file is present under `control_files`) before
/// backfilling missing source/binary links.
fn load_suite(
    control_files: &std::path::Path,
    dir_name: &str,
    class: SuiteClass,
    architectures: &[assorted_debian_utils::architectures::Architecture],
    faux_packages: Option<&std::path::Path>,
) -> Result<Suite> {
    let dir = control_files.join(dir_name);
    let mut suite = Suite::new(class, dir_name, dir_name);

    if let Some(path) = ingest::find_control_file(&dir, "Sources") {
        ingest::ingest_sources(&mut suite, &path).with_context(|| format!("reading {}", path.display()))?;
    }
    for &arch in architectures {
        if let Some(path) = ingest::find_control_file(&dir, &format!("Packages_{arch}")) {
            ingest::ingest_packages(&mut suite, &path).with_context(|| format!("reading {}", path.display()))?;
        }
    }
    // `all` binaries live in their own Packages file, not under a concrete arch.
    if let Some(path) = ingest::find_control_file(&dir, "Packages_all") {
        ingest::ingest_packages(&mut suite, &path).with_context(|| format!("reading {}", path.display()))?;
    }
    if let Some(path) = faux_packages {
        ingest::ingest_faux_packages(&mut suite, path, architectures).with_context(|| format!("reading {}", path.display()))?;
    }
    ingest::link_binaries_to_sources(&mut suite);
    Ok(suite)
}

fn init_logging(opts: &BritneyOptions) -> Result<()> {
    let debug_env = std::env::var("BRITNEY_DEBUG").as_deref() == Ok("1");
    let mut level = opts.verbose.log_level_filter();
    if debug_env && level < log::LevelFilter::Debug {
        level = log::LevelFilter::Debug;
    }
    stderrlog::new()
        .module(module_path!())
        .module("britney")
        .verbosity(level)
        .init()?;
    Ok(())
}

/// The interactive hint-tester REPL (§6): each line is parsed as a hint
/// command the same way `--hints`/`Hints/<user>` lines are, and echoed back
/// with the resulting verdict against the already-loaded excuse set. `quit`
/// or EOF ends the session.
fn run_hint_tester(excuses: &[britney::excuse::Excuse], config: &Config, default_suite: &str) -> Result<()> {
    println!("britney hint-tester: enter hint lines, 'quit' to exit.");
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    loop {
        print!("> ");
        out.flush()?;
        let mut line = String::new();
        if BufReader::new(stdin.lock()).read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "finished" {
            break;
        }
        let parsed = hints::parse_cli_hints("tester", line, config, default_suite);
        for hint in &parsed {
            for arg in &hint.arguments {
                if let Some(excuse) = excuses.iter().find(|e| e.source == arg.source_name) {
                    println!("{} {}: verdict {:?}", hint.kind, arg.source_name, excuse.verdict);
                } else {
                    println!("{} {}: no excuse on record", hint.kind, arg.source_name);
                }
            }
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let opts = BritneyOptions::parse();
    init_logging(&opts)?;

    let config = Config::from_path(&opts.config).context("loading configuration")?;
    let architectures = if opts.architectures.is_empty() {
        config.architectures.clone()
    } else {
        opts.architectures
            .iter()
            .map(|a| {
                assorted_debian_utils::architectures::Architecture::try_from(a.as_str())
                    .map_err(|_| anyhow::anyhow!("unknown architecture '{a}'"))
            })
            .collect::<Result<Vec<_>>>()?
    };

    info!("loading target suite '{}' and source suite '{PRIMARY_SOURCE_DIR}'", opts.series);
    let faux_packages = ingest::find_control_file(&opts.control_files, "faux-packages");
    let target_suite = load_suite(&opts.control_files, &opts.series, SuiteClass::Target, &architectures, faux_packages.as_deref())?;
    let source_suite = load_suite(&opts.control_files, PRIMARY_SOURCE_DIR, SuiteClass::PrimarySource, &architectures, faux_packages.as_deref())?;

    let keep_installable = ingest::find_control_file(&opts.control_files, "constraints")
        .map(|p| ingest::read_constraints(&p))
        .transpose()?
        .unwrap_or_default();

    let universe = Rc::new(
        PackageUniverse::build(&[target_suite.clone(), source_suite.clone()], &architectures)
            .context("building package universe")?,
    );
    let tester = InstallabilityTester::new(universe.clone());
    let mut target = TargetSuiteState::new(target_suite, tester);

    let hints_dir = opts.control_files.join("Hints");
    let mut all_hints = if hints_dir.is_dir() {
        hints::read_hints_dir(&hints_dir, &config, &opts.series).context("reading hint files")?
    } else {
        Vec::new()
    };
    if let Some(spec) = &opts.hints {
        all_hints.extend(hints::parse_cli_hints("cmdline", spec, &config, &opts.series));
    }

    let rc_bugs_target = ingest::find_control_file(&opts.control_files.join(&opts.series), "BugsV")
        .map(|p| ingest::read_bugs(&p))
        .transpose()?
        .unwrap_or_default();
    let rc_bugs_source = ingest::find_control_file(&opts.control_files.join(PRIMARY_SOURCE_DIR), "BugsV")
        .map(|p| ingest::read_bugs(&p))
        .transpose()?
        .unwrap_or_default();
    let dates = ingest::find_control_file(&opts.control_files.join(PRIMARY_SOURCE_DIR), "Dates")
        .map(|p| ingest::read_dates(&p))
        .transpose()?
        .unwrap_or_default();
    let urgencies = ingest::find_control_file(&opts.control_files.join(PRIMARY_SOURCE_DIR), "Urgency")
        .map(|p| ingest::read_urgencies(&p))
        .transpose()?
        .unwrap_or_default();

    let policies: Vec<Box<dyn britney::policy::Policy>> = vec![
        Box::new(AgePolicy),
        Box::new(RcBugsPolicy),
        Box::new(AutopkgtestPolicy),
        Box::new(PiupartsPolicy),
        Box::new(BuildDependsPolicy),
    ];
    let ctx = PolicyContext {
        hints: &all_hints,
        dates: &dates,
        urgencies: &urgencies,
        default_urgency: config.default_urgency.as_str(),
        rc_bugs_target: &rc_bugs_target,
        rc_bugs_source: &rc_bugs_source,
        now: Utc::now(),
    };

    let builder = ExcuseBuilder::new(&target.suite, &source_suite, policies);
    let mut excuses = builder.build_all(&all_hints, &ctx, &architectures);

    // `--actions`: restrict the run to exactly these items (§6), rejecting
    // every other otherwise-passing candidate so the batch below only ever
    // schedules the named set.
    if !opts.actions.is_empty() {
        let placeholder = assorted_debian_utils::version::PackageVersion::try_from("0").unwrap();
        let wanted: std::collections::HashSet<String> = opts
            .actions
            .iter()
            .filter_map(|a| britney::model::MigrationItem::parse(a, &placeholder, &opts.series).ok())
            .map(|item| format!("{}{}", if item.is_removal { "-" } else { "" }, item.uvname()))
            .collect();
        for excuse in &mut excuses {
            if !wanted.contains(&excuse.item_name) && excuse.verdict.is_pass() {
                excuse.verdict = britney::policy::Verdict::RejectedTemporarily;
                excuse.notes.push("excluded by --actions restriction".to_owned());
            }
        }
    }

    let forced: std::collections::HashSet<String> = all_hints
        .iter()
        .filter(|h| h.active && matches!(h.kind, britney::model::HintKind::ForceHint | britney::model::HintKind::Force))
        .flat_map(|h| h.arguments.iter().map(|a| a.source_name.to_string()))
        .collect();
    invalidation::invalidate(&mut excuses, &forced);

    if opts.hint_tester {
        return run_hint_tester(&excuses, &config, &opts.series);
    }

    if opts.print_uninst {
        let nuninst = driver::compute_nuninst(&mut target, &architectures)?;
        for (arch, broken) in &nuninst.per_arch {
            println!("{arch}: {} broken package(s)", broken.len());
        }
        return Ok(());
    }

    let mut result = driver::MigrationResult::default();
    if !opts.no_compute_migrations {
        result = driver::run(&mut target, &source_suite, &universe, &excuses, &all_hints, &config, &architectures, &keep_installable)
            .context("running migration driver")?;
        target.check_invariants().context("post-migration invariant check")?;
    }

    for (item, reason) in &result.rejected {
        warn!("{item} rejected: {reason}");
    }

    if opts.dry_run {
        info!("dry run: {} item(s) would have migrated, nothing written", result.accepted.len());
        return Ok(());
    }

    std::fs::create_dir_all(&opts.output_dir)?;
    let accepted_names: Vec<String> = result
        .accepted
        .iter()
        .map(|i| format!("{}{}", if i.is_removal { "-" } else { "" }, i.source_name))
        .collect();

    {
        let f = File::create(opts.output_dir.join("HeidiResult"))?;
        output::write_heidi_result(f, &target.suite)?;
    }
    {
        let f = File::create(opts.output_dir.join("HeidiResultDelta"))?;
        output::write_heidi_delta(f, &result.accepted)?;
    }
    {
        let f = File::create(opts.output_dir.join("excuses.yaml"))?;
        output::write_excuses_yaml(f, &excuses, &accepted_names, Utc::now())?;
    }
    {
        let f = File::create(opts.output_dir.join("excuses.html"))?;
        output::write_excuses_html(f, &excuses)?;
    }
    {
        let nuninst = driver::compute_nuninst(&mut target, &architectures)?;
        let f = File::create(opts.output_dir.join("nuninst"))?;
        output::write_nuninst(f, &opts.series, Utc::now(), &nuninst.per_arch, &nuninst.per_arch_with_all)?;
    }

    if let Some(cache_path) = &opts.nuninst_cache {
        std::fs::copy(opts.output_dir.join("nuninst"), cache_path).ok();
    }

    info!("migration complete: {} accepted, {} rejected", result.accepted.len(), result.rejected.len());
    Ok(())
}

fn main() -> Result<()> {
    run()
}
