//! Kahn-style topological layering of the captured dependency graph.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::key::Key;

/// Computes startup layers for `participants` over the captured
/// `parent -> children` edges.
///
/// Edges touching keys outside the participant set are ignored, and
/// duplicate edges between the same pair count once. Layer 0 holds every
/// participant with no outstanding needs; each following layer holds the
/// keys whose children have all been placed. Members of a layer are sorted
/// for deterministic output; the engine treats their order as unobservable.
pub(crate) fn layer_keys(
    participants: &[Key],
    edges: &HashMap<Key, Vec<Key>>,
) -> Result<Vec<Vec<Key>>> {
    let members: HashSet<Key> = participants.iter().copied().collect();

    // needs[parent] = number of distinct participant children not yet placed
    let mut needs: HashMap<Key, usize> = members.iter().map(|k| (*k, 0)).collect();
    let mut dependents: HashMap<Key, Vec<Key>> = HashMap::new();
    let mut seen: HashSet<(Key, Key)> = HashSet::new();

    for (parent, children) in edges {
        if !members.contains(parent) {
            continue;
        }
        for child in children {
            if !members.contains(child) || !seen.insert((*parent, *child)) {
                continue;
            }
            if let Some(n) = needs.get_mut(parent) {
                *n += 1;
            }
            dependents.entry(*child).or_default().push(*parent);
        }
    }

    let mut ready: Vec<Key> = needs
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut placed = 0usize;
    let mut layers: Vec<Vec<Key>> = Vec::new();

    while !ready.is_empty() {
        ready.sort();
        let mut next = Vec::new();
        for key in &ready {
            for parent in dependents.get(key).into_iter().flatten() {
                if let Some(n) = needs.get_mut(parent) {
                    *n -= 1;
                    if *n == 0 {
                        next.push(*parent);
                    }
                }
            }
        }
        placed += ready.len();
        layers.push(std::mem::replace(&mut ready, next));
    }

    if placed < members.len() {
        let mut stuck: Vec<Key> = needs
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(k, _)| k)
            .collect();
        stuck.sort();
        return Err(Error::cycle(stuck.first().into_iter()));
    }

    Ok(layers)
}
