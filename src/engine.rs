use futures::future::join_all;
use std::sync::Arc;

use crate::article::{ActionKind, Article, ArticleId};
use crate::config::{
    DisplayMode, EndpointConfig, LaunchOptions, StorageKeys, TimelineConfig, TimelineOptions,
};
use crate::endpoint::{Endpoint, EndpointId, EndpointStatus, LoadTrigger};
use crate::error::{ActionError, ConfigError, Error, Result};
use crate::notification::{Notification, NotificationLevel, Notifications};
use crate::reconciler::{ActionOutcome, ActionPhase, ActionReconciler, ActionTicket};
use crate::registry::TimelineRegistry;
use crate::service::{ServiceAdapter, ServiceRegistry};
use crate::storage::Storage;
use crate::store::ArticleStore;
use crate::timeline::{BatchReport, LoadBatch, SettledBatch, Timeline, TimelineId};

fn endpoint_key(timeline: TimelineId, endpoint: EndpointId) -> String {
    format!("{timeline}/{endpoint}")
}

/// Builder for configuring an [`Engine`] before opening it.
///
/// Created via [`Engine::builder`]. Register adapters before calling
/// [`open`](EngineBuilder::open): persisted endpoints naming an unregistered
/// service are dropped during hydration.
pub struct EngineBuilder {
    storage: Box<dyn Storage>,
    keys: StorageKeys,
    services: ServiceRegistry,
    launch: LaunchOptions,
    defaults: Vec<TimelineConfig>,
}

impl EngineBuilder {
    /// Derive storage keys from another application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.keys = StorageKeys::new(name);
        self
    }

    pub fn keys(mut self, keys: StorageKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Register a service adapter.
    pub fn service(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.services.register(adapter);
        self
    }

    /// Session-only options such as a forced display mode.
    pub fn launch(mut self, options: LaunchOptions) -> Self {
        self.launch = options;
        self
    }

    /// Timeline to create when storage holds no timelines at all.
    pub fn default_timeline(mut self, config: TimelineConfig) -> Self {
        self.defaults.push(config);
        self
    }

    /// Hydrate the registry and return the engine.
    ///
    /// Malformed configuration never fails this; see
    /// [`Engine::config_errors`]. Only writing the default timelines can.
    pub fn open(self) -> Result<Engine> {
        let mut registry = TimelineRegistry::hydrate(self.storage, self.keys, &self.services);
        registry.apply_launch_options(&self.launch);

        if !self.defaults.is_empty() && !registry.has_persisted_timelines() {
            log::debug!("seeding {} default timelines", self.defaults.len());
            for config in self.defaults {
                registry.add_timeline(config)?;
            }
        }

        Ok(Engine {
            registry,
            store: ArticleStore::new(),
            services: self.services,
            reconciler: ActionReconciler::new(),
            notifications: Notifications::new(),
        })
    }
}

/// The aggregation engine: registry, article store, adapters, pending
/// actions and notifications behind one command surface.
///
/// Loads and actions come in two forms. The async ones (`refresh`,
/// `perform_action`, ...) run to completion while holding the engine. The
/// split ones (`begin_refresh` / [`apply_batch`](Engine::apply_batch),
/// `begin_action` / [`settle_action`](Engine::settle_action)) hand out a
/// batch or ticket that fetches against a clone of
/// [`services`](Engine::services) without borrowing the engine, so a host
/// event loop can keep several network calls in flight and apply each as
/// it settles.
///
/// ```
/// # use soshalthing::*;
/// # use std::sync::Arc;
/// # futures::executor::block_on(async {
/// let mut engine = Engine::builder(MemoryStorage::new())
///     .service(Arc::new(DummyService::new()))
///     .open()?;
/// let home = engine.add_timeline(
///     TimelineConfig::new("Home")
///         .endpoint(EndpointConfig::new(DUMMY_SERVICE, EndpointType::Home)),
/// )?;
/// engine.start().await;
///
/// let services = engine.services().clone();
/// let like = engine.begin_action(&ArticleId::new(DUMMY_SERVICE, "0"), ActionKind::Like)?;
/// let refresh = engine.begin_refresh(home)?;
/// let (liked, refreshed) = futures::join!(like.perform(&services), refresh.fetch(&services));
/// engine.apply_batch(refreshed);
/// engine.settle_action(like, liked);
/// # Ok::<(), Error>(())
/// # }).unwrap();
/// ```
pub struct Engine {
    registry: TimelineRegistry,
    store: ArticleStore,
    services: ServiceRegistry,
    reconciler: ActionReconciler,
    notifications: Notifications,
}

impl Engine {
    pub fn builder(storage: impl Storage + 'static) -> EngineBuilder {
        EngineBuilder {
            storage: Box::new(storage),
            keys: StorageKeys::default(),
            services: ServiceRegistry::new(),
            launch: LaunchOptions::default(),
            defaults: Vec::new(),
        }
    }

    pub fn registry(&self) -> &TimelineRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn config_errors(&self) -> &[ConfigError] {
        self.registry.config_errors()
    }

    // Reads

    pub fn timelines(&self) -> &[Timeline] {
        self.registry.timelines()
    }

    pub fn visible_timelines(&self) -> Vec<&Timeline> {
        self.registry.visible_timelines()
    }

    pub fn timeline(&self, id: TimelineId) -> Option<&Timeline> {
        self.registry.timeline(id)
    }

    pub fn timeline_view(&self, id: TimelineId) -> Option<&[ArticleId]> {
        self.registry.timeline(id).map(Timeline::articles)
    }

    pub fn article(&self, id: &ArticleId) -> Option<&Article> {
        self.store.get(id)
    }

    /// The display mode in effect for this session.
    pub fn display_mode(&self) -> DisplayMode {
        self.registry.effective_display_mode()
    }

    pub fn main_timeline(&self) -> Option<TimelineId> {
        self.registry.main_timeline()
    }

    pub fn action_phase(&self, article: &ArticleId, kind: ActionKind) -> ActionPhase {
        self.reconciler.phase(article, kind)
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn dismiss(&mut self, notification: u64) -> bool {
        self.notifications.dismiss(notification)
    }

    // Registry commands

    pub fn add_timeline(&mut self, config: TimelineConfig) -> Result<TimelineId> {
        self.registry.add_timeline(config)
    }

    pub fn remove_timeline(&mut self, id: TimelineId) -> Result<()> {
        let removed = self.registry.remove_timeline(id)?;
        for endpoint in removed.endpoints() {
            self.notifications.dismiss_key(&endpoint_key(id, endpoint.id()));
        }
        Ok(())
    }

    pub fn set_main(&mut self, id: TimelineId) -> Result<()> {
        self.registry.set_main(id)
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Result<()> {
        self.registry.set_display_mode(mode)
    }

    pub fn set_timeline_options(&mut self, id: TimelineId, options: TimelineOptions) -> Result<()> {
        self.registry.set_options(id, options, &self.store)
    }

    pub fn add_endpoint(&mut self, id: TimelineId, config: EndpointConfig) -> Result<EndpointId> {
        self.registry.add_endpoint(id, config)
    }

    pub fn remove_endpoint(&mut self, id: TimelineId, index: usize) -> Result<Endpoint> {
        let removed = self.registry.remove_endpoint(id, index)?;
        self.notifications.dismiss_key(&endpoint_key(id, removed.id()));
        Ok(removed)
    }

    /// Endpoints whose timed refresh is due at `now` (unix seconds).
    ///
    /// The engine owns no timer; a host polls this, or simply calls
    /// [`auto_refresh`](Engine::auto_refresh) on its own schedule.
    pub fn due_auto_refreshes(&self, now: u64) -> Vec<(TimelineId, EndpointId)> {
        self.registry
            .timelines()
            .iter()
            .flat_map(|timeline| {
                timeline
                    .endpoints()
                    .iter()
                    .filter(move |endpoint| endpoint.auto_refresh_due(now))
                    .map(move |endpoint| (timeline.id(), endpoint.id()))
            })
            .collect()
    }

    // Split-phase loads

    /// Issue the loads `trigger` calls for on one timeline.
    pub fn begin_load(&mut self, id: TimelineId, trigger: LoadTrigger) -> Result<LoadBatch> {
        let timeline = self
            .registry
            .timeline_mut(id)
            .ok_or(Error::TimelineNotFound(id))?;
        Ok(timeline.begin(trigger))
    }

    pub fn begin_refresh(&mut self, id: TimelineId) -> Result<LoadBatch> {
        self.begin_load(id, LoadTrigger::Refresh)
    }

    pub fn begin_load_more(&mut self, id: TimelineId) -> Result<LoadBatch> {
        self.begin_load(id, LoadTrigger::LoadMore)
    }

    /// Issue the loads `trigger` calls for on every timeline.
    pub fn begin_all(&mut self, trigger: LoadTrigger) -> Vec<LoadBatch> {
        self.registry
            .timelines_mut()
            .iter_mut()
            .map(|timeline| timeline.begin(trigger))
            .collect()
    }

    /// Apply a settled batch to its timeline and update endpoint notifications.
    ///
    /// Returns `None` when the timeline was removed while the batch was in
    /// flight.
    pub fn apply_batch(&mut self, batch: SettledBatch) -> Option<BatchReport> {
        let id = batch.timeline();
        let Some(timeline) = self.registry.timeline_mut(id) else {
            log::debug!("{id} was removed before its batch settled");
            return None;
        };
        let report = timeline.apply_batch(batch, &mut self.store);

        // One notification per failing endpoint, cleared once it loads again.
        for endpoint in timeline.endpoints() {
            let key = endpoint_key(id, endpoint.id());
            match endpoint.status() {
                EndpointStatus::Failed(err) => {
                    self.notifications.push_keyed(
                        key,
                        NotificationLevel::Error,
                        format!("{}: {err}", timeline.title()),
                    );
                }
                EndpointStatus::Ok => {
                    self.notifications.dismiss_key(&key);
                }
                EndpointStatus::Idle => {}
            }
        }
        Some(report)
    }

    // Loads

    /// Load the `on_start` endpoints of every timeline.
    pub async fn start(&mut self) -> Vec<(TimelineId, BatchReport)> {
        self.load_all(LoadTrigger::Start).await
    }

    /// Refresh every timeline.
    pub async fn refresh_all(&mut self) -> Vec<(TimelineId, BatchReport)> {
        self.load_all(LoadTrigger::Refresh).await
    }

    pub async fn refresh(&mut self, id: TimelineId) -> Result<BatchReport> {
        self.load_one(id, LoadTrigger::Refresh).await
    }

    pub async fn load_more(&mut self, id: TimelineId) -> Result<BatchReport> {
        self.load_one(id, LoadTrigger::LoadMore).await
    }

    /// Load every `auto_refresh` endpoint whose interval has elapsed.
    pub async fn auto_refresh(&mut self) -> Vec<(TimelineId, BatchReport)> {
        self.load_all(LoadTrigger::AutoRefresh).await
    }

    async fn load_one(&mut self, id: TimelineId, trigger: LoadTrigger) -> Result<BatchReport> {
        let batch = self.begin_load(id, trigger)?;
        let mut reports = self.fetch_and_apply(vec![batch]).await;
        Ok(reports.pop().map(|(_, report)| report).unwrap_or_default())
    }

    async fn load_all(&mut self, trigger: LoadTrigger) -> Vec<(TimelineId, BatchReport)> {
        let batches = self.begin_all(trigger);
        self.fetch_and_apply(batches).await
    }

    async fn fetch_and_apply(&mut self, batches: Vec<LoadBatch>) -> Vec<(TimelineId, BatchReport)> {
        let services = &self.services;
        let settled = join_all(batches.into_iter().map(|batch| batch.fetch(services))).await;

        settled
            .into_iter()
            .filter_map(|batch| {
                let id = batch.timeline();
                self.apply_batch(batch).map(|report| (id, report))
            })
            .collect()
    }

    // Article commands

    /// Flip the flag optimistically and return the ticket to perform.
    ///
    /// Fails with [`ActionError::AlreadyPending`] while the same action on
    /// the same article is still in flight.
    pub fn begin_action(&mut self, article: &ArticleId, kind: ActionKind) -> Result<ActionTicket> {
        let ticket = self.reconciler.begin(&mut self.store, article, kind)?;
        self.registry.recompute_views(&self.store);
        Ok(ticket)
    }

    /// Confirm or roll back a ticket from [`begin_action`](Engine::begin_action).
    ///
    /// A rollback queues a notification. A ticket that is no longer the one
    /// in flight is discarded.
    pub fn settle_action(
        &mut self,
        ticket: ActionTicket,
        result: std::result::Result<(), ActionError>,
    ) -> ActionOutcome {
        let outcome = self.reconciler.settle(&mut self.store, ticket, result);
        if let ActionOutcome::RolledBack { article, kind, error } = &outcome {
            self.notifications.push(
                NotificationLevel::Error,
                format!("{kind} on {article} failed: {error}"),
            );
        }
        self.registry.recompute_views(&self.store);
        outcome
    }

    /// Like/unlike or repost/un-repost, optimistically.
    ///
    /// The flag flips before the adapter is called. On failure it is restored
    /// and a notification is queued.
    pub async fn perform_action(
        &mut self,
        article: &ArticleId,
        kind: ActionKind,
    ) -> Result<ActionOutcome> {
        let ticket = self.begin_action(article, kind)?;
        let result = ticket.perform(&self.services).await;
        Ok(self.settle_action(ticket, result))
    }

    pub fn toggle_marked_as_read(&mut self, article: &ArticleId) -> Option<bool> {
        let value = self.store.toggle_marked_as_read(article)?;
        self.registry.recompute_views(&self.store);
        Some(value)
    }

    pub fn toggle_hidden(&mut self, article: &ArticleId) -> Option<bool> {
        let value = self.store.toggle_hidden(article)?;
        self.registry.recompute_views(&self.store);
        Some(value)
    }
}
