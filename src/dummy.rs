//! A deterministic in-process service.
//!
//! Serves configured fixture pages instead of talking to a network, records
//! every request it receives, and can be told to fail. Used by the tests and
//! the demo, and handy as a template for real adapters.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::article::{ArticleContent, ArticleId, FetchedArticle};
use crate::endpoint::EndpointType;
use crate::error::{ActionError, FetchError};
use crate::ratelimit::RateLimit;
use crate::service::{ActionRequest, Direction, Page, PageQuery, ServiceAdapter};

pub const DUMMY_SERVICE: &str = "Dummy Service";

// Token of the newest position, handed out with the first page.
const NEWEST: &str = "newest";

#[derive(Debug, Default)]
struct DummyState {
    pages: HashMap<EndpointType, Vec<Vec<FetchedArticle>>>,
    newer: HashMap<EndpointType, VecDeque<Vec<FetchedArticle>>>,
    fetch_failures: HashMap<EndpointType, FetchError>,
    ratelimits: HashMap<EndpointType, RateLimit>,
    action_failure: Option<ActionError>,
    fetch_log: Vec<PageQuery>,
    action_log: Vec<ActionRequest>,
}

/// Fixture-backed [`ServiceAdapter`].
///
/// Pages are numbered per endpoint type. The first `Newer` request returns
/// page 0 with an older cursor of `"1"`; `Older` with cursor `n` returns page
/// `n`; the last page ends the cursor. Later `Newer` requests pop one queued
/// batch from [`push_newer`](DummyService::push_newer), or return nothing.
#[derive(Debug)]
pub struct DummyService {
    name: String,
    state: Mutex<DummyState>,
}

impl Default for DummyService {
    fn default() -> Self {
        DummyService::new()
    }
}

impl DummyService {
    /// A dummy service with one `Home` page holding a single article, id `"0"`.
    pub fn new() -> Self {
        let service = DummyService::named(DUMMY_SERVICE);
        let first = DummyService::article_for(DUMMY_SERVICE, "0", None);
        service.set_pages(EndpointType::Home, vec![vec![first]]);
        service
    }

    /// An empty dummy service registered under another name.
    pub fn named(name: impl Into<String>) -> Self {
        DummyService {
            name: name.into(),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Build a fixture article belonging to a service called `service`.
    pub fn article_for(service: &str, id: &str, created_at: Option<u64>) -> FetchedArticle {
        let content = ArticleContent {
            text: format!("Article {id}"),
            author_name: "Dummy".to_string(),
            author_username: "dummy".to_string(),
            url: format!("https://example.com/{id}"),
            created_at,
            ..ArticleContent::default()
        };
        FetchedArticle::new(ArticleId::new(service, id), content)
    }

    /// Build a fixture article belonging to this service.
    pub fn article(&self, id: &str, created_at: Option<u64>) -> FetchedArticle {
        DummyService::article_for(&self.name, id, created_at)
    }

    fn state(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace every page served for `endpoint_type`.
    pub fn set_pages(&self, endpoint_type: EndpointType, pages: Vec<Vec<FetchedArticle>>) {
        self.state().pages.insert(endpoint_type, pages);
    }

    /// Queue articles for the next `Newer` request after the first page.
    pub fn push_newer(&self, endpoint_type: EndpointType, articles: Vec<FetchedArticle>) {
        self.state()
            .newer
            .entry(endpoint_type)
            .or_default()
            .push_back(articles);
    }

    /// Make every fetch of `endpoint_type` fail, or succeed again with `None`.
    pub fn set_fetch_failure(&self, endpoint_type: EndpointType, error: Option<FetchError>) {
        let mut state = self.state();
        match error {
            Some(error) => state.fetch_failures.insert(endpoint_type, error),
            None => state.fetch_failures.remove(&endpoint_type),
        };
    }

    /// Report `ratelimit` with every page of `endpoint_type`.
    pub fn set_ratelimit(&self, endpoint_type: EndpointType, ratelimit: Option<RateLimit>) {
        let mut state = self.state();
        match ratelimit {
            Some(ratelimit) => state.ratelimits.insert(endpoint_type, ratelimit),
            None => state.ratelimits.remove(&endpoint_type),
        };
    }

    /// Make every action fail, or succeed again with `None`.
    pub fn set_action_failure(&self, error: Option<ActionError>) {
        self.state().action_failure = error;
    }

    pub fn fetch_log(&self) -> Vec<PageQuery> {
        self.state().fetch_log.clone()
    }

    pub fn action_log(&self) -> Vec<ActionRequest> {
        self.state().action_log.clone()
    }

    fn page(state: &DummyState, endpoint_type: EndpointType, index: usize) -> Page {
        let pages = state.pages.get(&endpoint_type).map(Vec::as_slice).unwrap_or_default();
        let articles = pages.get(index).cloned().unwrap_or_default();
        let page = Page::new(articles);
        if index + 1 < pages.len() {
            page.with_older((index + 1).to_string())
        } else {
            page
        }
    }
}

#[async_trait]
impl ServiceAdapter for DummyService {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint_types(&self) -> Vec<EndpointType> {
        vec![
            EndpointType::Home,
            EndpointType::UserTimeline,
            EndpointType::Search,
            EndpointType::SingleStatus,
        ]
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError> {
        let mut state = self.state();
        state.fetch_log.push(query.clone());
        if let Some(error) = state.fetch_failures.get(&query.endpoint_type) {
            return Err(error.clone());
        }

        let page = match (query.direction, query.cursor.as_deref()) {
            (Direction::Newer, None) | (Direction::Older, None) => {
                DummyService::page(&state, query.endpoint_type, 0).with_newer(NEWEST)
            }
            (Direction::Newer, Some(_)) => {
                let articles = state
                    .newer
                    .get_mut(&query.endpoint_type)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or_default();
                // The endpoint ignores `older` on refreshes.
                Page::new(articles)
            }
            (Direction::Older, Some(token)) => {
                let index = token
                    .parse::<usize>()
                    .map_err(|_| FetchError::InvalidResponse(format!("bad cursor '{token}'")))?;
                DummyService::page(&state, query.endpoint_type, index)
            }
        };

        Ok(match state.ratelimits.get(&query.endpoint_type) {
            Some(ratelimit) => page.with_ratelimit(*ratelimit),
            None => page,
        })
    }

    async fn perform_action(&self, request: &ActionRequest) -> Result<(), ActionError> {
        let mut state = self.state();
        state.action_log.push(request.clone());
        match &state.action_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
