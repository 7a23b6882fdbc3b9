use futures::future::join_all;
use serde_json::Value;
use std::fmt;

use crate::article::ArticleId;
use crate::config::{EndpointConfig, TimelineConfig, TimelineOptions};
use crate::endpoint::{
    ApplyOutcome, Endpoint, EndpointId, EndpointStatus, FetchedTicket, LoadTicket, LoadTrigger,
};
use crate::error::FetchError;
use crate::filter::passes_all;
use crate::merge::merge_refs;
use crate::ratelimit::now_secs;
use crate::service::ServiceRegistry;
use crate::store::ArticleStore;

/// Identifier of a timeline within its registry. Stable for the process
/// lifetime, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineId(pub(crate) u32);

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeline#{}", self.0)
    }
}

/// Loads issued for one trigger across a timeline's endpoints.
#[derive(Debug, Clone)]
pub struct LoadBatch {
    timeline: TimelineId,
    trigger: LoadTrigger,
    tickets: Vec<LoadTicket>,
}

impl LoadBatch {
    pub fn timeline(&self) -> TimelineId {
        self.timeline
    }

    pub fn trigger(&self) -> LoadTrigger {
        self.trigger
    }

    pub fn tickets(&self) -> &[LoadTicket] {
        &self.tickets
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Await every ticket concurrently. Results are kept in declaration
    /// order regardless of completion order.
    pub async fn fetch(self, services: &ServiceRegistry) -> SettledBatch {
        let fetches = self.tickets.into_iter().map(|ticket| ticket.fetch(services));
        let fetched = join_all(fetches).await;
        SettledBatch {
            timeline: self.timeline,
            trigger: self.trigger,
            fetched,
        }
    }
}

/// A batch whose adapter calls have all settled.
#[derive(Debug, Clone)]
pub struct SettledBatch {
    timeline: TimelineId,
    trigger: LoadTrigger,
    fetched: Vec<FetchedTicket>,
}

impl SettledBatch {
    pub fn timeline(&self) -> TimelineId {
        self.timeline
    }

    pub fn trigger(&self) -> LoadTrigger {
        self.trigger
    }
}

/// What applying a batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Endpoints whose page was applied.
    pub applied: usize,
    /// Endpoints whose fetch failed, with the error.
    pub failed: Vec<(EndpointId, FetchError)>,
    /// Responses dropped because a newer request already applied, or because
    /// their endpoint was removed in the meantime.
    pub discarded: usize,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A user-named aggregation of endpoints with one merged article view.
#[derive(Debug, Clone)]
pub struct Timeline {
    id: TimelineId,
    title: String,
    endpoints: Vec<Endpoint>,
    next_endpoint: u32,
    view: Vec<ArticleId>,
    options: TimelineOptions,
    detached: Vec<Value>,
}

impl Timeline {
    pub(crate) fn new(id: TimelineId, config: TimelineConfig) -> Self {
        let mut timeline = Timeline {
            id,
            title: config.title,
            endpoints: Vec::with_capacity(config.endpoints.len()),
            next_endpoint: 0,
            view: Vec::new(),
            options: config.options,
            detached: Vec::new(),
        };
        for endpoint in config.endpoints {
            timeline.add_endpoint(endpoint);
        }
        timeline
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id() == id)
    }

    /// The merged, filtered and sorted view.
    pub fn articles(&self) -> &[ArticleId] {
        &self.view
    }

    pub fn options(&self) -> &TimelineOptions {
        &self.options
    }

    pub(crate) fn set_options(&mut self, options: TimelineOptions) {
        self.options = options;
    }

    /// Persisted endpoint entries this session has no adapter for.
    pub fn detached_endpoints(&self) -> &[Value] {
        &self.detached
    }

    pub(crate) fn set_detached(&mut self, detached: Vec<Value>) {
        self.detached = detached;
    }

    /// Endpoints whose latest load failed.
    pub fn endpoint_errors(&self) -> Vec<(EndpointId, &FetchError)> {
        self.endpoints
            .iter()
            .filter_map(|e| match e.status() {
                EndpointStatus::Failed(err) => Some((e.id(), err)),
                EndpointStatus::Idle | EndpointStatus::Ok => None,
            })
            .collect()
    }

    /// Whether any endpoint may still have older pages.
    pub fn can_load_more(&self) -> bool {
        self.endpoints.iter().any(|e| e.can_load_more())
    }

    /// Snapshot of the persistable part of this timeline.
    pub fn to_config(&self) -> TimelineConfig {
        TimelineConfig {
            title: self.title.clone(),
            endpoints: self.endpoints.iter().map(|e| e.config().clone()).collect(),
            options: self.options.clone(),
        }
    }

    pub(crate) fn add_endpoint(&mut self, config: EndpointConfig) -> EndpointId {
        let id = EndpointId(self.next_endpoint);
        self.next_endpoint += 1;
        self.endpoints.push(Endpoint::new(id, config));
        id
    }

    /// Remove the endpoint at `index` in declaration order.
    ///
    /// Articles only that endpoint contributed leave the view; everything else
    /// keeps its position.
    pub(crate) fn remove_endpoint(&mut self, index: usize) -> Option<Endpoint> {
        if index >= self.endpoints.len() {
            return None;
        }
        let removed = self.endpoints.remove(index);
        let endpoints = &self.endpoints;
        self.view
            .retain(|id| endpoints.iter().any(|e| e.refs().contains(id)));
        Some(removed)
    }

    /// Issue loads for `trigger` on every endpoint that is not passive.
    pub fn begin(&mut self, trigger: LoadTrigger) -> LoadBatch {
        let now = now_secs();
        let tickets: Vec<LoadTicket> = self
            .endpoints
            .iter_mut()
            .filter_map(|endpoint| endpoint.begin_load(trigger, now))
            .collect();
        log::debug!(
            "{} ({}): {:?} issued {} of {} endpoints",
            self.id,
            self.title,
            trigger,
            tickets.len(),
            self.endpoints.len()
        );
        LoadBatch {
            timeline: self.id,
            trigger,
            tickets,
        }
    }

    pub fn begin_start(&mut self) -> LoadBatch {
        self.begin(LoadTrigger::Start)
    }

    pub fn begin_refresh(&mut self) -> LoadBatch {
        self.begin(LoadTrigger::Refresh)
    }

    pub fn begin_load_more(&mut self) -> LoadBatch {
        self.begin(LoadTrigger::LoadMore)
    }

    pub fn begin_auto_refresh(&mut self) -> LoadBatch {
        self.begin(LoadTrigger::AutoRefresh)
    }

    /// Apply every settled load in declaration order, then update the view once.
    ///
    /// `LoadMore` appends the newly fetched ids to the end of the view. Start
    /// and refresh recompute the whole view.
    pub fn apply_batch(&mut self, batch: SettledBatch, store: &mut ArticleStore) -> BatchReport {
        let mut report = BatchReport::default();
        if batch.timeline != self.id {
            log::warn!("{} ignoring a batch issued by {}", self.id, batch.timeline);
            report.discarded = batch.fetched.len();
            return report;
        }

        let mut appended = Vec::new();
        for fetched in batch.fetched {
            let endpoint_id = fetched.ticket.endpoint();
            let Some(endpoint) = self.endpoints.iter_mut().find(|e| e.id() == endpoint_id) else {
                log::debug!("{endpoint_id} was removed before its response arrived");
                report.discarded += 1;
                continue;
            };
            match endpoint.apply(fetched, store) {
                ApplyOutcome::Applied { added } => {
                    report.applied += 1;
                    appended.extend(
                        added
                            .into_iter()
                            .filter(|id| passes_all(&endpoint.config().filters, id, store)),
                    );
                }
                ApplyOutcome::Failed(err) => report.failed.push((endpoint_id, err)),
                ApplyOutcome::Discarded => report.discarded += 1,
            }
        }

        match batch.trigger {
            LoadTrigger::LoadMore => self.append(appended, store),
            LoadTrigger::Start | LoadTrigger::Refresh | LoadTrigger::AutoRefresh => {
                self.recompute(store)
            }
        }
        report
    }

    fn append(&mut self, ids: Vec<ArticleId>, store: &ArticleStore) {
        for id in ids {
            if !self.view.contains(&id) && passes_all(&self.options.filters, &id, store) {
                self.view.push(id);
            }
        }
        if let Some(sort) = &self.options.sort {
            sort.apply(&mut self.view, store);
        }
    }

    /// Rebuild the view from the endpoints' refs: endpoint filters, merge,
    /// timeline filters, then the optional sort.
    pub fn recompute(&mut self, store: &ArticleStore) {
        let lists: Vec<Vec<ArticleId>> = self
            .endpoints
            .iter()
            .map(|endpoint| {
                endpoint
                    .refs()
                    .iter()
                    .filter(|id| passes_all(&endpoint.config().filters, id, store))
                    .cloned()
                    .collect()
            })
            .collect();

        let mut view = merge_refs(&lists, store);
        view.retain(|id| passes_all(&self.options.filters, id, store));
        if let Some(sort) = &self.options.sort {
            sort.apply(&mut view, store);
        }
        self.view = view;
    }

    /// Load every `on_start` endpoint.
    pub async fn start(
        &mut self,
        services: &ServiceRegistry,
        store: &mut ArticleStore,
    ) -> BatchReport {
        let batch = self.begin_start();
        let settled = batch.fetch(services).await;
        self.apply_batch(settled, store)
    }

    /// Load newer items on every `on_refresh` endpoint.
    pub async fn refresh_all(
        &mut self,
        services: &ServiceRegistry,
        store: &mut ArticleStore,
    ) -> BatchReport {
        let batch = self.begin_refresh();
        let settled = batch.fetch(services).await;
        self.apply_batch(settled, store)
    }

    /// Load the next older page on every endpoint that has one.
    pub async fn load_more(
        &mut self,
        services: &ServiceRegistry,
        store: &mut ArticleStore,
    ) -> BatchReport {
        let batch = self.begin_load_more();
        let settled = batch.fetch(services).await;
        self.apply_batch(settled, store)
    }
}
