use serde::{Deserialize, Serialize};
use std::fmt;

use crate::article::ArticleId;
use crate::config::EndpointConfig;
use crate::error::FetchError;
use crate::ratelimit::RateLimit;
use crate::service::{Cursor, Direction, Page, PageQuery, ServiceRegistry};
use crate::store::ArticleStore;

/// Kind of data source within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointType {
    Home,
    UserTimeline,
    List,
    Search,
    SingleStatus,
    Likes,
}

/// What asked an endpoint to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    Start,
    Refresh,
    LoadMore,
    /// Timed refresh of `auto_refresh` endpoints whose interval has elapsed.
    AutoRefresh,
}

impl LoadTrigger {
    fn direction(self) -> Direction {
        match self {
            LoadTrigger::Start | LoadTrigger::Refresh | LoadTrigger::AutoRefresh => {
                Direction::Newer
            }
            LoadTrigger::LoadMore => Direction::Older,
        }
    }
}

/// Identifier of an endpoint within its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub(crate) u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// Outcome of the most recent load of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointStatus {
    #[default]
    Idle,
    Ok,
    Failed(FetchError),
}

/// A load that has been issued but not yet fetched.
///
/// Produced by [`Endpoint::begin_load`]; carries everything the adapter call
/// needs so the fetch can run without borrowing the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub(crate) endpoint: EndpointId,
    pub(crate) service: String,
    pub(crate) trigger: LoadTrigger,
    pub(crate) seq: u64,
    pub(crate) query: PageQuery,
}

impl LoadTicket {
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn trigger(&self) -> LoadTrigger {
        self.trigger
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Run the adapter call. This is the only suspension point of a load.
    pub async fn fetch(self, services: &ServiceRegistry) -> FetchedTicket {
        let result = match services.get(&self.service) {
            None => Err(FetchError::UnknownService(self.service.clone())),
            Some(adapter) if !adapter.supports(self.query.endpoint_type) => {
                Err(FetchError::UnsupportedEndpoint {
                    service: self.service.clone(),
                    endpoint_type: self.query.endpoint_type,
                })
            }
            Some(adapter) => adapter.fetch_page(&self.query).await,
        };
        FetchedTicket {
            ticket: self,
            result,
        }
    }
}

/// A settled adapter call, ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTicket {
    pub ticket: LoadTicket,
    pub result: Result<Page, FetchError>,
}

/// What applying a fetched page did to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Page applied; these ids were not referenced by the endpoint before.
    Applied { added: Vec<ArticleId> },
    Failed(FetchError),
    /// A newer request in the same direction already applied.
    Discarded,
}

/// A configured, stateful data source.
///
/// Keeps the ordered ids it has fetched, its older-page cursor and its last
/// status. Loads are split into [`begin_load`](Endpoint::begin_load) and
/// [`apply`](Endpoint::apply) around the adapter call so that several
/// endpoints can fetch concurrently while every mutation stays synchronous.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    config: EndpointConfig,
    older: Cursor,
    newer: Option<String>,
    refs: Vec<ArticleId>,
    ratelimit: Option<RateLimit>,
    status: EndpointStatus,
    next_seq: u64,
    applied_newer: u64,
    applied_older: u64,
    last_newer: Option<u64>,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, config: EndpointConfig) -> Self {
        Endpoint {
            id,
            config,
            older: Cursor::Start,
            newer: None,
            refs: Vec::new(),
            ratelimit: None,
            status: EndpointStatus::Idle,
            next_seq: 0,
            applied_newer: 0,
            applied_older: 0,
            last_newer: None,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Article ids in endpoint order, newest first.
    pub fn refs(&self) -> &[ArticleId] {
        &self.refs
    }

    pub fn cursor(&self) -> &Cursor {
        &self.older
    }

    pub fn status(&self) -> &EndpointStatus {
        &self.status
    }

    pub fn ratelimit(&self) -> Option<&RateLimit> {
        self.ratelimit.as_ref()
    }

    /// Whether older pages may still exist.
    pub fn can_load_more(&self) -> bool {
        !self.older.is_end()
    }

    /// Whether a timed refresh is due at `now` (unix seconds). An endpoint
    /// that never loaded newer items is due right away.
    pub fn auto_refresh_due(&self, now: u64) -> bool {
        self.config.auto_refresh
            && self
                .last_newer
                .is_none_or(|last| now >= last.saturating_add(self.config.refresh_interval))
    }

    /// Issue a load for `trigger`, or `None` if this endpoint stays passive.
    ///
    /// Endpoints are passive on `Start` unless `on_start`, on `Refresh`
    /// unless `on_refresh`, on `LoadMore` once the cursor hit the end, and on
    /// `AutoRefresh` unless [`auto_refresh_due`](Self::auto_refresh_due).
    /// An exhausted rate limit also skips the load and records the error as
    /// the endpoint's status.
    pub fn begin_load(&mut self, trigger: LoadTrigger, now: u64) -> Option<LoadTicket> {
        let passive = match trigger {
            LoadTrigger::Start => !self.config.on_start,
            LoadTrigger::Refresh => !self.config.on_refresh,
            LoadTrigger::LoadMore => !self.can_load_more(),
            LoadTrigger::AutoRefresh => !self.auto_refresh_due(now),
        };
        if passive {
            log::trace!("{} is passive on {:?}", self.id, trigger);
            return None;
        }

        if let Some(ratelimit) = self.ratelimit.as_mut() {
            if !ratelimit.can_refresh(now) {
                log::warn!(
                    "can't load {} ({:?}): rate limited until {}",
                    self.id,
                    self.config.endpoint_type,
                    ratelimit.reset
                );
                self.status = EndpointStatus::Failed(FetchError::RateLimited {
                    reset: ratelimit.reset,
                });
                return None;
            }
        }

        let direction = trigger.direction();
        let cursor = match direction {
            Direction::Newer => {
                self.last_newer = Some(now);
                self.newer.clone()
            }
            Direction::Older => self.older.token(),
        };

        self.next_seq += 1;
        Some(LoadTicket {
            endpoint: self.id,
            service: self.config.service.clone(),
            trigger,
            seq: self.next_seq,
            query: PageQuery {
                endpoint_type: self.config.endpoint_type,
                params: self.config.params.clone(),
                direction,
                cursor,
            },
        })
    }

    /// Apply a settled fetch: upsert into the store and update refs and cursors.
    ///
    /// Results older than the last applied request in the same direction are
    /// discarded. Older pages are appended; newer pages are prepended, except
    /// on the very first load where they simply fill the list. Known ids are
    /// never duplicated.
    pub fn apply(&mut self, fetched: FetchedTicket, store: &mut ArticleStore) -> ApplyOutcome {
        let FetchedTicket { ticket, result } = fetched;
        let direction = ticket.query.direction;

        let applied = match direction {
            Direction::Newer => &mut self.applied_newer,
            Direction::Older => &mut self.applied_older,
        };
        if ticket.seq <= *applied {
            log::debug!(
                "discarding stale {:?} response #{} for {} (already applied #{})",
                ticket.trigger,
                ticket.seq,
                self.id,
                applied
            );
            return ApplyOutcome::Discarded;
        }
        *applied = ticket.seq;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                log::error!("{} ({:?}) failed: {err}", self.id, self.config.endpoint_type);
                self.status = EndpointStatus::Failed(err.clone());
                return ApplyOutcome::Failed(err);
            }
        };

        log::debug!(
            "{} articles for {} ({:?})",
            page.articles.len(),
            self.id,
            self.config.endpoint_type
        );

        if let Some(ratelimit) = page.ratelimit {
            self.ratelimit = Some(ratelimit);
        }
        for included in page.included {
            store.upsert(included);
        }

        let mut added = Vec::new();
        for article in page.articles {
            let id = store.upsert(article).id().clone();
            if !self.refs.contains(&id) && !added.contains(&id) {
                added.push(id);
            }
        }

        let first_load = matches!(self.older, Cursor::Start);
        match direction {
            Direction::Older => {
                self.refs.extend(added.iter().cloned());
                self.older = page.older;
            }
            Direction::Newer if first_load => {
                self.refs.extend(added.iter().cloned());
                self.older = page.older;
            }
            Direction::Newer => {
                let mut refs = added.clone();
                refs.append(&mut self.refs);
                self.refs = refs;
            }
        }
        if page.newer.is_some() {
            self.newer = page.newer;
        }

        self.status = EndpointStatus::Ok;
        ApplyOutcome::Applied { added }
    }
}
