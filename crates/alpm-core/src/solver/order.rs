//! Phase E — topological ordering (spec §4.5).
//!
//! A repeated-scan topological sort rather than a DFS-based one: each pass
//! peels off every operation whose predecessors (within this same plan)
//! are already ordered, which keeps ties in their original relative order
//! — a property a DFS postorder doesn't give for free and the file-apply
//! engine's progress reporting benefits from (stable target numbering
//! across otherwise-equivalent runs).

use std::collections::HashSet;

use tracing::warn;

use crate::db::LocalDatabase;
use crate::list::OrderedList;
use crate::plan::{Operation, Plan};

/// Order an Add/Upgrade/Sync plan so each operation's `depends` (as far
/// as they resolve to another operation in this same plan) precede it.
pub(super) fn order_install(plan: &mut Plan) {
    let ops: Vec<Operation> = std::mem::take(&mut plan.operations).into_iter().collect();
    let names: HashSet<String> = ops.iter().map(|op| op.name().to_string()).collect();

    plan.operations = topo_sort(ops, |op| {
        op.incoming()
            .map(|p| {
                p.depends
                    .iter()
                    .map(|d| d.name.to_string())
                    .filter(|n| names.contains(n))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    });
}

/// Order a Remove plan so every package's in-plan dependers (other
/// packages in the plan whose `depends` it satisfies) precede it: a
/// dependent must be removed before what it depends on.
pub(super) fn order_remove(plan: &mut Plan, local: &LocalDatabase) {
    let _ = local; // reverse-dependency scope is the plan itself, spec §4.5
    let ops: Vec<Operation> = std::mem::take(&mut plan.operations).into_iter().collect();
    let names: HashSet<String> = ops.iter().map(|op| op.name().to_string()).collect();

    let depends_of: Vec<(String, Vec<alpm_types::Dependency>)> = ops
        .iter()
        .filter_map(|op| op.outgoing().into_iter().next().map(|p| (p.name.to_string(), p.depends.clone())))
        .collect();

    plan.operations = topo_sort(ops, |op| {
        let Some(target) = op.outgoing().into_iter().next() else {
            return Vec::new();
        };
        depends_of
            .iter()
            .filter(|(depender_name, deps)| {
                depender_name.as_str() != target.name.as_str()
                    && names.contains(depender_name.as_str())
                    && deps
                        .iter()
                        .any(|d| d.is_satisfied_by(target.name.as_str(), &target.version, &target.provides))
            })
            .map(|(n, _)| n.clone())
            .collect()
    });
}

fn topo_sort(mut remaining: Vec<Operation>, predecessors: impl Fn(&Operation) -> Vec<String>) -> OrderedList<Operation> {
    let bound = (remaining.len() as f64).sqrt().ceil() as usize + 4;
    let mut ordered: Vec<Operation> = Vec::with_capacity(remaining.len());
    let mut ordered_names: HashSet<String> = HashSet::new();
    let mut pass = 0usize;

    while !remaining.is_empty() {
        pass += 1;
        if pass > bound {
            warn!(bound, remaining = remaining.len(), "ordering exceeded its iteration bound, possible cycle");
            ordered.extend(remaining);
            break;
        }

        let mut ready = Vec::new();
        let mut not_ready = Vec::new();
        for op in remaining {
            let preds = predecessors(&op);
            if preds.iter().all(|p| ordered_names.contains(p)) {
                ready.push(op);
            } else {
                not_ready.push(op);
            }
        }

        if ready.is_empty() {
            warn!("ordering made no progress in a pass, breaking a cycle by insertion order");
            ordered.extend(not_ready);
            break;
        }

        for op in &ready {
            ordered_names.insert(op.name().to_string());
        }
        ordered.extend(ready);
        remaining = not_ready;
    }

    ordered.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Origin, Sections};
    use alpm_types::{Dependency, PackageName, Version};
    use std::str::FromStr;

    fn pkg_with_deps(name: &str, deps: &[&str]) -> crate::package::Package {
        let mut pkg = crate::package::Package::skeleton(
            PackageName::new(name).unwrap(),
            Version::new("1.0-1"),
            Origin::SyncDatabase,
        );
        pkg.depends = deps.iter().map(|d| Dependency::from_str(d).unwrap()).collect();
        pkg.loaded = Sections::ALL;
        pkg
    }

    #[test]
    fn install_order_places_dependencies_first() {
        let mut plan = Plan::new();
        plan.operations.add(Operation::InstallNew(pkg_with_deps("app", &["lib"])));
        plan.operations.add(Operation::InstallNew(pkg_with_deps("lib", &[])));

        order_install(&mut plan);

        let names: Vec<&str> = plan.operations.iter().map(Operation::name).collect();
        assert_eq!(names, vec!["lib", "app"]);
    }

    #[test]
    fn remove_order_places_dependers_first() {
        let dir = tempfile::tempdir().unwrap();
        let local = crate::db::LocalDatabase::open(dir.path()).unwrap();

        let mut plan = Plan::new();
        plan.operations.add(Operation::RemoveOnly(pkg_with_deps("lib", &[])));
        plan.operations.add(Operation::RemoveOnly(pkg_with_deps("app", &["lib"])));

        order_remove(&mut plan, &local);

        let names: Vec<&str> = plan.operations.iter().map(Operation::name).collect();
        assert_eq!(names, vec!["app", "lib"]);
    }
}
