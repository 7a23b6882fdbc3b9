//! The capability interface every social service implements.
//!
//! Core logic never branches on a service name. It looks the adapter up in a
//! [`ServiceRegistry`] and calls [`ServiceAdapter::fetch_page`] or
//! [`ServiceAdapter::perform_action`]. Adding a service means adding an
//! adapter, nothing else.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::article::{ActionKind, ArticleId, FetchedArticle};
use crate::endpoint::EndpointType;
use crate::error::{ActionError, ConfigError, FetchError};
use crate::ratelimit::RateLimit;

/// Which way a page request walks an endpoint's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Items newer than anything seen so far (start and refresh).
    Newer,
    /// The next page of older items (load more).
    Older,
}

/// Pagination position for older items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cursor {
    /// Nothing fetched yet.
    #[default]
    Start,
    /// Opaque, service-defined token for the next older page.
    Next(String),
    /// The service reported there is nothing older.
    End,
}

impl Cursor {
    pub fn is_end(&self) -> bool {
        matches!(self, Cursor::End)
    }

    pub(crate) fn token(&self) -> Option<String> {
        match self {
            Cursor::Next(token) => Some(token.clone()),
            Cursor::Start | Cursor::End => None,
        }
    }
}

/// A generic fetch request, translated by the adapter into protocol calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub endpoint_type: EndpointType,
    pub params: BTreeMap<String, String>,
    pub direction: Direction,
    /// `Newer`: the newest-position token from the previous page, if any.
    /// `Older`: the older cursor token.
    pub cursor: Option<String>,
}

/// One batch of articles returned by an adapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Articles in the order the endpoint shows them.
    pub articles: Vec<FetchedArticle>,
    /// Articles referenced by `articles` (reposted or quoted). Stored, not listed.
    pub included: Vec<FetchedArticle>,
    /// Where the next older page starts.
    pub older: Cursor,
    /// Token to ask for items newer than this page.
    pub newer: Option<String>,
    pub ratelimit: Option<RateLimit>,
}

impl Page {
    /// A final page: the cursor is set to [`Cursor::End`].
    pub fn new(articles: Vec<FetchedArticle>) -> Self {
        Page {
            articles,
            included: Vec::new(),
            older: Cursor::End,
            newer: None,
            ratelimit: None,
        }
    }

    pub fn with_older(mut self, token: impl Into<String>) -> Self {
        self.older = Cursor::Next(token.into());
        self
    }

    pub fn with_newer(mut self, token: impl Into<String>) -> Self {
        self.newer = Some(token.into());
        self
    }

    pub fn with_included(mut self, included: Vec<FetchedArticle>) -> Self {
        self.included = included;
        self
    }

    pub fn with_ratelimit(mut self, ratelimit: RateLimit) -> Self {
        self.ratelimit = Some(ratelimit);
        self
    }
}

/// A generic remote action request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub article: ArticleId,
    /// `true` for unlike / un-repost.
    pub undo: bool,
    pub params: BTreeMap<String, String>,
}

/// Per-service implementation of fetch and action operations.
///
/// Adapters perform I/O only. They never touch the article store; articles
/// flow back through the endpoint so identity de-duplication happens in one
/// place.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Service name, matching `ArticleId::service` and persisted configs.
    fn name(&self) -> &str;

    /// Endpoint types this service can serve, in a stable order.
    ///
    /// Legacy persisted configs refer to endpoint types by index into this list.
    fn endpoint_types(&self) -> Vec<EndpointType>;

    fn supports(&self, endpoint_type: EndpointType) -> bool {
        self.endpoint_types().contains(&endpoint_type)
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError>;

    async fn perform_action(&self, request: &ActionRequest) -> Result<(), ActionError>;
}

/// The set of registered adapters, keyed by service name.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    adapters: HashMap<String, Arc<dyn ServiceAdapter>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.adapters.keys().collect();
        names.sort();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry::default()
    }

    /// Register an adapter. A later registration under the same name wins.
    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            log::warn!("service '{name}' registered twice, keeping the latest");
        }
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(service).cloned()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.adapters.contains_key(service)
    }

    /// Resolve a legacy endpoint-type index against a service's catalogue.
    pub fn endpoint_type_at(
        &self,
        service: &str,
        index: usize,
    ) -> Result<EndpointType, ConfigError> {
        let adapter = self
            .adapters
            .get(service)
            .ok_or_else(|| ConfigError::UnknownService(service.to_string()))?;
        adapter
            .endpoint_types()
            .get(index)
            .copied()
            .ok_or_else(|| ConfigError::UnknownEndpointIndex {
                service: service.to_string(),
                index,
            })
    }
}
