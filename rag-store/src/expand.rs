//! Neighbour expansion: grows a retrieved chunk with the adjacent chunks of
//! its document section, nearest first, until a token budget is spent.

use std::collections::{BTreeMap, BTreeSet};

use crate::{record::RetrievedChunk, split::approx_tokens};

/// Returns `hit` with its text replaced by the concatenation of itself and
/// the neighbours that fit in `budget` tokens, in document order.
///
/// Neighbours are taken alternately after and before the hit (`+1, -1, +2,
/// -2, ...`); the first one that would overflow the budget stops the growth.
/// A hit without an index, or one missing from `siblings`, comes back as is.
pub fn expand_chunk(hit: &RetrievedChunk, siblings: &[RetrievedChunk], budget: usize) -> RetrievedChunk {
    let Some(at) = hit.index else {
        return hit.clone();
    };
    let by_index: BTreeMap<i64, &RetrievedChunk> = siblings
        .iter()
        .filter_map(|c| c.index.map(|i| (i, c)))
        .collect();
    let (Some(&lo), Some(&hi)) = (by_index.keys().next(), by_index.keys().next_back()) else {
        return hit.clone();
    };
    if !by_index.contains_key(&at) {
        return hit.clone();
    }

    let mut used = approx_tokens(&hit.text);
    let mut picked = BTreeSet::from([at]);
    'grow: for step in 1.. {
        let mut in_range = false;
        for candidate in [at + step, at - step] {
            if candidate < lo || candidate > hi {
                continue;
            }
            in_range = true;
            let Some(chunk) = by_index.get(&candidate) else {
                continue;
            };
            let len = approx_tokens(&chunk.text);
            if used + len > budget {
                break 'grow;
            }
            used += len;
            picked.insert(candidate);
        }
        if !in_range {
            break;
        }
    }

    let text = picked
        .iter()
        .filter_map(|i| by_index.get(i))
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    RetrievedChunk {
        text,
        ..hit.clone()
    }
}
