use serde::{Deserialize, Serialize};

use crate::article::{Article, ArticleId, ArticleRef};
use crate::store::ArticleStore;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Media,
    Animated,
    NotMarkedAsRead,
    NotHidden,
    Liked,
    Reposted,
    PlainArticle,
    Repost { by_username: Option<String> },
    Quote { by_username: Option<String> },
}

/// A predicate over articles, evaluated against the store at view time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Filter {
    pub kind: FilterKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub inverted: bool,
}

fn default_true() -> bool {
    true
}

impl Filter {
    pub fn new(kind: FilterKind) -> Self {
        Filter {
            kind,
            enabled: true,
            inverted: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    pub fn name(&self) -> &'static str {
        if self.inverted {
            match self.kind {
                FilterKind::Media => "Without Media",
                FilterKind::Animated => "Not Animated",
                FilterKind::NotMarkedAsRead => "Marked as read",
                FilterKind::NotHidden => "Hidden",
                FilterKind::Liked => "Not Liked",
                FilterKind::Reposted => "Not Reposted",
                FilterKind::PlainArticle => "Not a Plain Article",
                FilterKind::Repost { .. } => "Not a Repost",
                FilterKind::Quote { .. } => "Not a Quote",
            }
        } else {
            match self.kind {
                FilterKind::Media => "Has Media",
                FilterKind::Animated => "Animated",
                FilterKind::NotMarkedAsRead => "Not marked as read",
                FilterKind::NotHidden => "Not hidden",
                FilterKind::Liked => "Liked",
                FilterKind::Reposted => "Reposted",
                FilterKind::PlainArticle => "Plain Article",
                FilterKind::Repost { .. } => "Repost",
                FilterKind::Quote { .. } => "Has Quote",
            }
        }
    }

    /// Whether the article passes this filter. Disabled filters pass everything;
    /// ids missing from the store pass nothing.
    pub fn matches(&self, id: &ArticleId, store: &ArticleStore) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(article) = store.get(id) else {
            return false;
        };
        let actual = store.actual_article(id).unwrap_or(article);

        let result = match &self.kind {
            FilterKind::Media => with_referenced(article, store, |a| !a.content().media.is_empty()),
            FilterKind::Animated => with_referenced(article, store, |a| {
                a.content().media.iter().any(|m| m.is_animated())
            }),
            FilterKind::NotMarkedAsRead => !actual.marked_as_read(),
            FilterKind::NotHidden => !actual.hidden(),
            FilterKind::Liked => actual.liked(),
            FilterKind::Reposted => actual.reposted(),
            FilterKind::PlainArticle => article.content().reference.is_none(),
            FilterKind::Repost { by_username } => {
                matches!(article.content().reference, Some(ArticleRef::Repost(_)))
                    && by_author(article, by_username.as_deref())
            }
            FilterKind::Quote { by_username } => {
                matches!(article.content().reference, Some(ArticleRef::Quote(_)))
                    && by_author(article, by_username.as_deref())
            }
        };

        result != self.inverted
    }
}

/// Whether `id` passes every filter in `filters`.
pub fn passes_all(filters: &[Filter], id: &ArticleId, store: &ArticleStore) -> bool {
    filters.iter().all(|filter| filter.matches(id, store))
}

fn with_referenced(
    article: &Article,
    store: &ArticleStore,
    predicate: impl Fn(&Article) -> bool,
) -> bool {
    if predicate(article) {
        return true;
    }
    let referenced = match &article.content().reference {
        Some(ArticleRef::Repost(id)) | Some(ArticleRef::Quote(id)) => store.get(id),
        None => None,
    };
    referenced.is_some_and(predicate)
}

fn by_author(article: &Article, username: Option<&str>) -> bool {
    match username {
        Some(username) => article.content().author_username == username,
        None => true,
    }
}
