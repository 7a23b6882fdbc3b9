//! Merging several endpoints' article lists into one timeline view.

use std::collections::HashSet;

use crate::article::ArticleId;
use crate::store::ArticleStore;

/// Merge per-endpoint id lists into one de-duplicated list.
///
/// Each list keeps its own order. When every article involved carries a
/// creation timestamp the lists are interleaved newest-first (ties go to the
/// earlier endpoint); otherwise they are concatenated in declaration order.
/// A duplicate id appears once, at the first position it is met.
pub fn merge_refs(lists: &[Vec<ArticleId>], store: &ArticleStore) -> Vec<ArticleId> {
    let timestamps: Option<Vec<Vec<u64>>> = lists
        .iter()
        .map(|list| {
            list.iter()
                .map(|id| store.get(id).and_then(|a| a.content().created_at))
                .collect::<Option<Vec<u64>>>()
        })
        .collect();

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut push = |id: &ArticleId| {
        if seen.insert(id.clone()) {
            merged.push(id.clone());
        }
    };

    match timestamps {
        Some(timestamps) if lists.len() > 1 => {
            let mut heads = vec![0usize; lists.len()];
            loop {
                let mut best: Option<(usize, u64)> = None;
                for (list_index, list) in lists.iter().enumerate() {
                    let head = heads[list_index];
                    if head >= list.len() {
                        continue;
                    }
                    let ts = timestamps[list_index][head];
                    if best.is_none_or(|(_, best_ts)| ts > best_ts) {
                        best = Some((list_index, ts));
                    }
                }
                let Some((list_index, _)) = best else {
                    break;
                };
                push(&lists[list_index][heads[list_index]]);
                heads[list_index] += 1;
            }
        }
        _ => {
            for id in lists.iter().flatten() {
                push(id);
            }
        }
    }

    merged
}
