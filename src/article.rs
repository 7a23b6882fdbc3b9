use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an article: the service it came from plus that service's id.
///
/// Two fetches that yield the same `ArticleId` describe the same article, no
/// matter which endpoint or timeline fetched them.
///
/// # Examples
///
/// ```
/// use soshalthing::ArticleId;
///
/// let id = ArticleId::new("Twitter", "1228393702244134912");
/// assert_eq!(id.service, "Twitter");
/// assert_eq!(id.to_string(), "Twitter/1228393702244134912");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleId {
    pub service: String,
    pub id: String,
}

impl ArticleId {
    pub fn new(service: impl Into<String>, id: impl Into<String>) -> Self {
        ArticleId {
            service: service.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.id)
    }
}

/// A remote action a user can take on an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Like,
    Repost,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Like => f.write_str("Like"),
            ActionKind::Repost => f.write_str("Repost"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArticleMedia {
    Image(String),
    Video(String),
    VideoGif(String),
    Gif(String),
}

impl ArticleMedia {
    pub fn url(&self) -> &str {
        match self {
            ArticleMedia::Image(url)
            | ArticleMedia::Video(url)
            | ArticleMedia::VideoGif(url)
            | ArticleMedia::Gif(url) => url,
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, ArticleMedia::VideoGif(_) | ArticleMedia::Gif(_))
    }
}

/// Another article this one points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticleRef {
    Repost(ArticleId),
    Quote(ArticleId),
}

/// Display content of an article.
///
/// The engine only looks at `created_at`, the counts, `media` and `reference`
/// (for merging, sorting and filtering). Everything else is carried through
/// for the UI, and `raw` keeps whatever service-specific payload the adapter
/// wants to preserve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleContent {
    pub text: String,
    pub author_name: String,
    pub author_username: String,
    pub author_avatar_url: String,
    pub url: String,
    /// Creation time in milliseconds since the Unix epoch, when the service
    /// exposes one.
    pub created_at: Option<u64>,
    pub media: Vec<ArticleMedia>,
    pub like_count: u32,
    pub repost_count: u32,
    pub reference: Option<ArticleRef>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

/// An article as an adapter returns it, before it reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedArticle {
    pub id: ArticleId,
    pub content: ArticleContent,
    pub liked: bool,
    pub reposted: bool,
}

impl FetchedArticle {
    pub fn new(id: ArticleId, content: ArticleContent) -> Self {
        FetchedArticle {
            id,
            content,
            liked: false,
            reposted: false,
        }
    }

    pub fn with_liked(mut self, liked: bool) -> Self {
        self.liked = liked;
        self
    }

    pub fn with_reposted(mut self, reposted: bool) -> Self {
        self.reposted = reposted;
        self
    }
}

/// An article record owned by the [`ArticleStore`](crate::ArticleStore).
///
/// Timelines and endpoints never hold one of these; they hold the
/// [`ArticleId`] and look the record up, so a flag change is seen by every
/// timeline showing the article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub(crate) id: ArticleId,
    pub(crate) content: ArticleContent,
    pub(crate) liked: bool,
    pub(crate) reposted: bool,
    pub(crate) marked_as_read: bool,
    pub(crate) hidden: bool,
    /// In-flight actions, mapped to the flag value before the optimistic flip.
    pub(crate) pending: BTreeMap<ActionKind, bool>,
}

impl Article {
    pub(crate) fn from_fetched(fetched: FetchedArticle) -> Self {
        Article {
            id: fetched.id,
            content: fetched.content,
            liked: fetched.liked,
            reposted: fetched.reposted,
            marked_as_read: false,
            hidden: false,
            pending: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ArticleId {
        &self.id
    }

    pub fn content(&self) -> &ArticleContent {
        &self.content
    }

    pub fn liked(&self) -> bool {
        self.liked
    }

    pub fn reposted(&self) -> bool {
        self.reposted
    }

    pub fn marked_as_read(&self) -> bool {
        self.marked_as_read
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Current value of the flag an action kind drives.
    pub fn flag(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Like => self.liked,
            ActionKind::Repost => self.reposted,
        }
    }

    pub(crate) fn set_flag(&mut self, kind: ActionKind, value: bool) {
        match kind {
            ActionKind::Like => self.liked = value,
            ActionKind::Repost => self.reposted = value,
        }
    }

    /// Whether an action of this kind has been submitted but not yet settled.
    pub fn is_pending(&self, kind: ActionKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.pending.keys().copied()
    }

    /// The article a repost points at, if this is a repost.
    pub fn reposted_article(&self) -> Option<&ArticleId> {
        match &self.content.reference {
            Some(ArticleRef::Repost(id)) => Some(id),
            _ => None,
        }
    }
}
