use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::article::{ActionKind, Article, ArticleId, FetchedArticle};
use crate::error::ActionError;

/// De-duplicated collection of every article any endpoint has fetched.
///
/// The store is the only owner of [`Article`] records. Everything else refers
/// to articles by [`ArticleId`]. Records are never evicted.
///
/// # Merge rule
///
/// Upserting an article that is already known replaces its content and keeps
/// its interaction state: a flag that is `true` locally stays `true`, a flag
/// with an action in flight is left alone entirely, and local marks
/// (`marked_as_read`, `hidden`) are never touched by a fetch.
#[derive(Debug, Default)]
pub struct ArticleStore {
    articles: HashMap<ArticleId, Article>,
}

impl ArticleStore {
    pub fn new() -> Self {
        ArticleStore::default()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn contains(&self, id: &ArticleId) -> bool {
        self.articles.contains_key(id)
    }

    /// Insert a fetched article, or merge it into the existing record.
    pub fn upsert(&mut self, fetched: FetchedArticle) -> &Article {
        match self.articles.entry(fetched.id.clone()) {
            Entry::Vacant(entry) => entry.insert(Article::from_fetched(fetched)),
            Entry::Occupied(entry) => {
                let article = entry.into_mut();
                article.content = fetched.content;
                for (kind, fetched_flag) in [
                    (ActionKind::Like, fetched.liked),
                    (ActionKind::Repost, fetched.reposted),
                ] {
                    if !article.is_pending(kind) {
                        let merged = article.flag(kind) || fetched_flag;
                        article.set_flag(kind, merged);
                    }
                }
                article
            }
        }
    }

    pub fn get(&self, id: &ArticleId) -> Option<&Article> {
        self.articles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.articles.values()
    }

    /// Resolve a repost to the article it reposts.
    ///
    /// Quotes and plain articles resolve to themselves. If the reposted
    /// article was never fetched, the repost itself is returned.
    pub fn actual_article(&self, id: &ArticleId) -> Option<&Article> {
        let article = self.articles.get(id)?;
        match article.reposted_article().and_then(|target| self.articles.get(target)) {
            Some(target) => Some(target),
            None => Some(article),
        }
    }

    /// Flip `kind`'s flag to `target` optimistically and mark the action pending.
    ///
    /// Returns the flag value from before the flip.
    pub fn set_action_pending(
        &mut self,
        id: &ArticleId,
        kind: ActionKind,
        target: bool,
    ) -> Result<bool, ActionError> {
        let article = self.articles.get_mut(id).ok_or(ActionError::ArticleNotFound)?;
        if article.is_pending(kind) {
            return Err(ActionError::AlreadyPending { kind });
        }
        let previous = article.flag(kind);
        article.pending.insert(kind, previous);
        article.set_flag(kind, target);
        Ok(previous)
    }

    /// Settle a pending action as confirmed by the service.
    pub fn confirm_action(
        &mut self,
        id: &ArticleId,
        kind: ActionKind,
        value: bool,
    ) -> Result<(), ActionError> {
        let article = self.articles.get_mut(id).ok_or(ActionError::ArticleNotFound)?;
        article.pending.remove(&kind);
        article.set_flag(kind, value);
        Ok(())
    }

    /// Settle a pending action as failed, restoring the pre-action flag.
    pub fn rollback_action(&mut self, id: &ArticleId, kind: ActionKind) -> Result<(), ActionError> {
        let article = self.articles.get_mut(id).ok_or(ActionError::ArticleNotFound)?;
        if let Some(previous) = article.pending.remove(&kind) {
            article.set_flag(kind, previous);
        }
        Ok(())
    }

    /// Toggle the local read mark. Returns the new value.
    pub fn toggle_marked_as_read(&mut self, id: &ArticleId) -> Option<bool> {
        let article = self.articles.get_mut(id)?;
        article.marked_as_read = !article.marked_as_read;
        Some(article.marked_as_read)
    }

    /// Toggle the local hidden mark. Returns the new value.
    pub fn toggle_hidden(&mut self, id: &ArticleId) -> Option<bool> {
        let article = self.articles.get_mut(id)?;
        article.hidden = !article.hidden;
        Some(article.hidden)
    }
}
