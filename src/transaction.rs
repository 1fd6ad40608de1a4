// Copyright 2025 Sebastian Ramacher
// SPDX-License-Identifier: GPL-3.0-or-later

//! The Migration Transaction (component F): a scope-bound guard around
//! [`TargetSuiteState`] that journals every mutation and replays it in
//! reverse on drop unless explicitly committed (§4.F).
//!
//! A transaction borrows the target state for its whole scope, so "nesting"
//! (e.g. an SCC attempt that falls back to per-singleton retries) is done by
//! opening transactions one after another against the same target, never by
//! holding two live at once: each attempt either commits before the next one
//! opens, or drops (and rolls back) first.

use assorted_debian_utils::package::PackageName;

use crate::model::{BinaryId, BinaryPackage, SourcePackage};
use crate::suite::TargetSuiteState;

/// One journaled mutation, in the order needed to undo it.
enum JournalEntry {
    /// A source was replaced or removed; restore `previous` (`None` meant it
    /// did not exist before).
    Source {
        name: PackageName,
        previous: Option<SourcePackage>,
    },
    /// A binary was added; removing it undoes the mutation.
    BinaryAdded { id: BinaryId },
    /// A binary was removed or replaced; restore `previous`.
    BinaryRemoved {
        previous: BinaryPackage,
    },
}

/// A migration attempt scoped to a single transaction. Rolls itself back on
/// drop unless [`Transaction::commit`] was called (§4.F "RAII rollback").
pub struct Transaction<'a> {
    target: &'a mut TargetSuiteState,
    journal: Vec<JournalEntry>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(target: &'a mut TargetSuiteState) -> Self {
        Self {
            target,
            journal: Vec::new(),
            committed: false,
        }
    }

    pub fn target(&self) -> &TargetSuiteState {
        self.target
    }

    /// Installability check against the state as mutated so far in this
    /// transaction, for the driver's post-mutation recheck.
    pub fn is_installable(&mut self, id: &BinaryId) -> crate::error::Result<bool> {
        self.target.tester.is_installable(id)
    }

    /// Add (or replace) a binary, journaling whatever it displaces.
    pub fn add_binary(&mut self, pkg: BinaryPackage) {
        let id = pkg.id.clone();
        let previous = self.target.suite.binary(id.architecture, &id.name).cloned();
        self.target.add_binary(pkg);
        match previous {
            Some(previous) => self.journal.push(JournalEntry::BinaryRemoved { previous }),
            None => self.journal.push(JournalEntry::BinaryAdded { id }),
        }
    }

    pub fn remove_binary(&mut self, id: &BinaryId) {
        if let Some(previous) = self.target.suite.binary(id.architecture, &id.name).cloned() {
            self.target.remove_binary(id);
            self.journal.push(JournalEntry::BinaryRemoved { previous });
        }
    }

    pub fn add_source(&mut self, source: SourcePackage) {
        let name = source.name.clone();
        let previous = self.target.suite.sources.get(&name).cloned();
        self.target.add_source(source);
        self.journal.push(JournalEntry::Source { name, previous });
    }

    pub fn remove_source(&mut self, name: &PackageName) {
        let previous = self.target.remove_source(name);
        self.journal.push(JournalEntry::Source {
            name: name.clone(),
            previous,
        });
    }

    /// Commit: the mutations stay applied and no rollback happens on drop.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Roll back this transaction's own journal, in the mandated order:
    /// 1. restore sources, 2. remove added binaries, 3. restore removed
    /// binaries, 4. (provides maps follow automatically from 2/3 since
    /// [`TargetSuiteState`] keeps them in lockstep).
    fn rollback(&mut self) {
        let mut sources = Vec::new();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for entry in self.journal.drain(..).rev() {
            match entry {
                JournalEntry::Source { name, previous } => sources.push((name, previous)),
                JournalEntry::BinaryAdded { id } => added.push(id),
                JournalEntry::BinaryRemoved { previous } => removed.push(previous),
            }
        }
        for (name, previous) in sources {
            match previous {
                Some(source) => self.target.add_source(source),
                None => {
                    self.target.remove_source(&name);
                }
            }
        }
        for id in added {
            self.target.remove_binary(&id);
        }
        for pkg in removed {
            self.target.add_binary(pkg);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::installability::InstallabilityTester;
    use crate::model::{MultiArch, SuiteClass};
    use crate::suite::Suite;
    use crate::universe::PackageUniverse;
    use assorted_debian_utils::{architectures::Architecture, package::PackageName, version::PackageVersion};
    use std::rc::Rc;

    fn id(name: &str, version: &str) -> BinaryId {
        BinaryId::new(
            PackageName::try_from(name).unwrap(),
            PackageVersion::try_from(version).unwrap(),
            Architecture::Amd64,
        )
    }

    fn pkg(name: &str, version: &str) -> BinaryPackage {
        BinaryPackage {
            id: id(name, version),
            source_name: PackageName::try_from(name).unwrap(),
            source_version: PackageVersion::try_from(version).unwrap(),
            section: "misc".to_owned(),
            multi_arch: MultiArch::No,
            depends: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            essential: false,
        }
    }

    fn fresh_target() -> TargetSuiteState {
        let universe = Rc::new(PackageUniverse::empty());
        let tester = InstallabilityTester::new(universe);
        TargetSuiteState::new(Suite::new(SuiteClass::Target, "testing", "t"), tester)
    }

    #[test]
    fn dropped_without_commit_rolls_back_added_binary() {
        let mut target = fresh_target();
        {
            let mut txn = Transaction::new(&mut target);
            txn.add_binary(pkg("foo", "1"));
            assert!(target_has(&txn, "foo"));
        }
        assert!(target.suite.binary(Architecture::Amd64, &PackageName::try_from("foo").unwrap()).is_none());
    }

    #[test]
    fn committed_transaction_keeps_mutation() {
        let mut target = fresh_target();
        {
            let mut txn = Transaction::new(&mut target);
            txn.add_binary(pkg("foo", "1"));
            txn.commit();
        }
        assert!(target.suite.binary(Architecture::Amd64, &PackageName::try_from("foo").unwrap()).is_some());
    }

    #[test]
    fn rollback_restores_replaced_binary() {
        let mut target = fresh_target();
        target.add_binary(pkg("foo", "1"));
        {
            let mut txn = Transaction::new(&mut target);
            txn.add_binary(pkg("foo", "2"));
        }
        let restored = target
            .suite
            .binary(Architecture::Amd64, &PackageName::try_from("foo").unwrap())
            .unwrap();
        assert_eq!(restored.id.version, PackageVersion::try_from("1").unwrap());
    }

    fn target_has(txn: &Transaction, name: &str) -> bool {
        txn.target()
            .suite
            .binary(Architecture::Amd64, &PackageName::try_from(name).unwrap())
            .is_some()
    }
}
