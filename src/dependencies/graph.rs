//! Layered topological sort.

use std::collections::{BTreeMap, BTreeSet};

use crate::dependencies::DependencyError;
use crate::model::InstanceId;

/// Group `nodes` into start layers.
///
/// `edges` are `(dependent, dependency)` pairs; edges touching a node outside
/// `nodes` are ignored. Layer 0 holds nodes with no dependency in the set,
/// layer k nodes whose dependencies all sit in layers 0..k.
pub fn layered_order(
    nodes: &[InstanceId],
    edges: &[(InstanceId, InstanceId)],
) -> Result<Vec<Vec<InstanceId>>, DependencyError> {
    let mut pending: BTreeMap<&InstanceId, usize> = nodes.iter().map(|n| (n, 0)).collect();
    let mut dependents: BTreeMap<&InstanceId, BTreeSet<&InstanceId>> = BTreeMap::new();

    let unique_edges: BTreeSet<(&InstanceId, &InstanceId)> = edges
        .iter()
        .filter(|(from, to)| {
            from != to && pending.contains_key(from) && pending.contains_key(to)
        })
        .map(|(from, to)| (from, to))
        .collect();

    for (from, to) in unique_edges {
        if let Some(count) = pending.get_mut(from) {
            *count += 1;
        }
        dependents.entry(to).or_default().insert(from);
    }

    let mut layers = Vec::new();
    let mut ready: Vec<&InstanceId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    while !ready.is_empty() {
        for id in &ready {
            pending.remove(*id);
        }

        let mut next = BTreeSet::new();
        for id in &ready {
            for dependent in dependents.get(*id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(*dependent) {
                    *count -= 1;
                    if *count == 0 {
                        next.insert(*dependent);
                    }
                }
            }
        }

        layers.push(ready.into_iter().cloned().collect());
        ready = next.into_iter().collect();
    }

    if !pending.is_empty() {
        return Err(DependencyError::Cycle {
            unresolved: pending.into_keys().cloned().collect(),
        });
    }

    Ok(layers)
}
