//! The resolved action plan the solver (C5) hands to the file-apply
//! engine (C6): an ordered list of [`Operation`]s plus the skip-remove and
//! skip-add path sets the file-conflict check (spec §4.5) populates.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::list::OrderedList;
use crate::package::Package;

/// What kind of transaction is being resolved (spec §3).
///
/// Controls Phase A's target-resolution source (local cache for `Remove`,
/// sync caches otherwise) and Phase C's recursive dependency walk (only
/// `Sync` pulls in un-requested dependencies).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransactionKind {
    /// Install one or more packages from an on-disk archive, no
    /// dependency resolution beyond what's already satisfied.
    Add,
    /// Remove one or more installed packages.
    Remove,
    /// Upgrade one or more already-installed packages in place.
    Upgrade,
    /// Install or upgrade from sync databases, recursively pulling in
    /// unsatisfied dependencies (spec §4.5 Phase C).
    Sync,
}

impl TransactionKind {
    /// Whether this kind searches the local database (as opposed to sync
    /// databases) when resolving a bare-name target.
    pub fn targets_local(self) -> bool {
        matches!(self, TransactionKind::Remove)
    }

    /// Whether this kind recursively resolves unsatisfied dependencies
    /// (spec §4.5 Phase C).
    pub fn resolves_deps(self) -> bool {
        matches!(self, TransactionKind::Sync)
    }
}

/// A single resolved unit of work against the local database (spec §3).
#[derive(Debug, Clone)]
pub enum Operation {
    /// Install a package with no local predecessor.
    InstallNew(Package),
    /// Upgrade `old` in place to `new`.
    UpgradeOver {
        /// The candidate package being installed.
        new: Package,
        /// The currently-installed package it replaces.
        old: Package,
    },
    /// Install `new`, removing every package in `replaced` as part of the
    /// same transaction (spec §4.5 Phase B/D).
    ReplaceWith {
        /// The candidate package being installed.
        new: Package,
        /// Installed packages obsoleted by `new`.
        replaced: Vec<Package>,
    },
    /// Remove `old` with no corresponding install.
    RemoveOnly(Package),
}

impl Operation {
    /// The package being installed by this operation, if any.
    pub fn incoming(&self) -> Option<&Package> {
        match self {
            Operation::InstallNew(p)
            | Operation::UpgradeOver { new: p, .. }
            | Operation::ReplaceWith { new: p, .. } => Some(p),
            Operation::RemoveOnly(_) => None,
        }
    }

    /// Every installed package this operation removes, whether as an
    /// upgrade's predecessor, a replacement, or a plain removal.
    pub fn outgoing(&self) -> Vec<&Package> {
        match self {
            Operation::InstallNew(_) => Vec::new(),
            Operation::UpgradeOver { old, .. } => vec![old],
            Operation::ReplaceWith { replaced, .. } => replaced.iter().collect(),
            Operation::RemoveOnly(old) => vec![old],
        }
    }

    /// The name this operation is keyed by for ordering and reporting
    /// purposes: the incoming package's name if there is one, else the
    /// sole outgoing package's name.
    pub fn name(&self) -> &str {
        match self.incoming() {
            Some(p) => p.name.as_str(),
            None => match self {
                Operation::RemoveOnly(old) => old.name.as_str(),
                _ => unreachable!("non-RemoveOnly operations always have an incoming package"),
            },
        }
    }
}

/// The solver's output: an ordered action plan (spec §4.5 Phase E) plus
/// the path sets the file-apply engine must treat specially.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Resolved operations, topologically ordered.
    pub operations: OrderedList<Operation>,
    /// Paths the remove phase must not delete even though their owning
    /// package is being removed (spec §4.5, file-conflict resolution).
    pub skip_remove: HashSet<PathBuf>,
    /// Paths the add phase must extract alongside rather than overwrite
    /// (spec §4.5, file-conflict resolution).
    pub skip_add: HashSet<PathBuf>,
}

impl Plan {
    /// An empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every package about to be installed, upgraded to, or kept via a
    /// replacement (`incoming` set, spec §4.5 Phase D).
    pub fn packages(&self) -> Vec<&Package> {
        self.operations.iter().filter_map(Operation::incoming).collect()
    }

    /// Every installed package this plan removes (as an upgrade
    /// predecessor, a replacement target, or a plain removal).
    pub fn replaced(&self) -> Vec<&Package> {
        self.operations.iter().flat_map(Operation::outgoing).collect()
    }

    /// Whether the plan has no operations at all.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Fold `old` into the operation keyed by `winner_name`, converting an
    /// `InstallNew`/`UpgradeOver` entry into `ReplaceWith` as needed (spec
    /// §4.5 Phase B/D: replacement election and conflict-resolved-by-replace
    /// both end up here).
    pub fn absorb(&mut self, winner_name: &str, old: Package) {
        for op in self.operations.iter_mut() {
            if op.name() != winner_name {
                continue;
            }
            take_and_absorb(op, old);
            return;
        }
    }

    /// Names of every installed package already absorbed into some
    /// operation's `replaced`/`old` set.
    pub fn absorbed_names(&self) -> HashSet<String> {
        self.replaced().into_iter().map(|p| p.name.to_string()).collect()
    }
}

fn take_and_absorb(op: &mut Operation, old: Package) {
    let placeholder = Operation::RemoveOnly(old.clone());
    let current = std::mem::replace(op, placeholder);
    *op = match current {
        Operation::InstallNew(new) => Operation::ReplaceWith {
            new,
            replaced: vec![old],
        },
        Operation::UpgradeOver { new, old: prior } => Operation::ReplaceWith {
            new,
            replaced: vec![prior, old],
        },
        Operation::ReplaceWith { new, mut replaced } => {
            replaced.push(old);
            Operation::ReplaceWith { new, replaced }
        }
        Operation::RemoveOnly(_) => unreachable!("absorb is only called against an incoming operation"),
    };
}
