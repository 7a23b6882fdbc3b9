use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::article::{Article, ArticleId};
use crate::store::ArticleStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMethod {
    Id,
    Date,
    Likes,
    Reposts,
}

impl SortMethod {
    pub fn direction_label(&self, reversed: bool) -> &'static str {
        match self {
            SortMethod::Date if reversed => "Reverse chronological",
            SortMethod::Date => "Chronological",
            _ if reversed => "Descending",
            _ => "Ascending",
        }
    }

    pub fn compare(&self, a: &ArticleId, b: &ArticleId, store: &ArticleStore) -> Ordering {
        match self {
            SortMethod::Id => compare_remote_ids(&a.id, &b.id),
            SortMethod::Date => {
                let key = |id: &ArticleId| {
                    store
                        .get(id)
                        .and_then(|a| a.content().created_at)
                        .unwrap_or(0)
                };
                key(a).cmp(&key(b))
            }
            SortMethod::Likes => count(store, a, |a| a.content().like_count)
                .cmp(&count(store, b, |a| a.content().like_count)),
            SortMethod::Reposts => count(store, a, |a| a.content().repost_count)
                .cmp(&count(store, b, |a| a.content().repost_count)),
        }
    }
}

impl fmt::Display for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortMethod::Id => f.write_str("Id"),
            SortMethod::Date => f.write_str("Date"),
            SortMethod::Likes => f.write_str("Likes"),
            SortMethod::Reposts => f.write_str("Reposts"),
        }
    }
}

/// A sort applied to a timeline's view after merging and filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub method: SortMethod,
    #[serde(default)]
    pub reversed: bool,
}

impl SortOption {
    /// Stable sort of `ids`.
    pub fn apply(&self, ids: &mut [ArticleId], store: &ArticleStore) {
        ids.sort_by(|a, b| {
            let ordering = self.method.compare(a, b, store);
            if self.reversed { ordering.reverse() } else { ordering }
        });
    }
}

fn count(store: &ArticleStore, id: &ArticleId, field: impl Fn(&Article) -> u32) -> u32 {
    store.actual_article(id).map(field).unwrap_or_default()
}

// Numeric ids (snowflakes) compare by value, anything else lexically.
fn compare_remote_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_compare_by_value() {
        assert_eq!(compare_remote_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_remote_ids("abc", "abd"), Ordering::Less);
        assert_eq!(compare_remote_ids("10", "10"), Ordering::Equal);
    }
}
