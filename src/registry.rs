//! The ordered list of timelines, the main-timeline designation and the
//! display mode, persisted write-through.
//!
//! Order is independent of main-ness: [`TimelineRegistry::set_main`] never
//! moves a timeline and [`TimelineRegistry::remove_timeline`] never shuffles
//! the survivors.

use serde_json::Value;

use crate::article::ArticleId;
use crate::config::{
    AppSettings, DisplayMode, EndpointConfig, LaunchOptions, StorageKeys, TimelineConfig,
    TimelineOptions, parse_settings, parse_timelines_detached,
};
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::{ConfigError, Error, Result, StorageError};
use crate::service::ServiceRegistry;
use crate::storage::Storage;
use crate::store::ArticleStore;
use crate::timeline::{Timeline, TimelineId};

pub struct TimelineRegistry {
    storage: Box<dyn Storage>,
    keys: StorageKeys,
    timelines: Vec<Timeline>,
    main: Option<TimelineId>,
    display_mode: DisplayMode,
    session_display_mode: Option<DisplayMode>,
    next_id: u32,
    config_errors: Vec<ConfigError>,
}

impl std::fmt::Debug for TimelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineRegistry")
            .field("keys", &self.keys)
            .field("timelines", &self.timelines.len())
            .field("main", &self.main)
            .field("display_mode", &self.display_mode)
            .field("session_display_mode", &self.session_display_mode)
            .finish()
    }
}

impl TimelineRegistry {
    /// Load the registry from storage.
    ///
    /// Never fails. Unreadable keys and malformed entries are logged, kept in
    /// [`config_errors`](Self::config_errors) and replaced by defaults.
    pub fn hydrate(
        storage: Box<dyn Storage>,
        keys: StorageKeys,
        services: &ServiceRegistry,
    ) -> Self {
        let mut registry = TimelineRegistry {
            storage,
            keys,
            timelines: Vec::new(),
            main: None,
            display_mode: DisplayMode::default(),
            session_display_mode: None,
            next_id: 0,
            config_errors: Vec::new(),
        };

        let timelines_key = registry.keys.timelines();
        if let Some(value) = registry.read_key(&timelines_key) {
            let (parsed, errors) = parse_timelines_detached(value, &timelines_key, services);
            registry.config_errors.extend(errors);
            for timeline in parsed {
                let id = registry.insert(timeline.config);
                if let Some(inserted) = registry.timeline_mut(id) {
                    inserted.set_detached(timeline.detached);
                }
            }
        }

        let settings_key = registry.keys.settings();
        if let Some(value) = registry.read_key(&settings_key) {
            match parse_settings(value, &settings_key) {
                Ok(settings) => registry.display_mode = settings.display_mode,
                Err(e) => {
                    log::warn!("falling back to default settings: {e}");
                    registry.config_errors.push(e);
                }
            }
        }

        log::debug!(
            "hydrated {} timelines, display mode {:?}",
            registry.timelines.len(),
            registry.display_mode
        );
        registry
    }

    fn read_key(&mut self, key: &str) -> Option<Value> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("could not read '{key}': {e}");
                self.config_errors.push(ConfigError::Malformed {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Whether storage held no timeline array at all.
    pub(crate) fn has_persisted_timelines(&self) -> bool {
        matches!(self.storage.get(&self.keys.timelines()), Ok(Some(_)))
    }

    /// Write both keys. Only the persisted display mode is written; a session
    /// override never reaches storage. Endpoint entries without an adapter in
    /// this session are written back after the live ones.
    pub fn flush(&mut self) -> std::result::Result<(), StorageError> {
        let timelines = self
            .timelines
            .iter()
            .map(persisted_timeline)
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        self.storage.set(&self.keys.timelines(), &Value::Array(timelines))?;

        let settings = serde_json::to_value(AppSettings {
            display_mode: self.display_mode,
        })?;
        self.storage.set(&self.keys.settings(), &settings)?;
        Ok(())
    }

    fn insert(&mut self, config: TimelineConfig) -> TimelineId {
        let id = TimelineId(self.next_id);
        self.next_id += 1;
        self.timelines.push(Timeline::new(id, config));
        id
    }

    fn position(&self, id: TimelineId) -> Result<usize> {
        self.timelines
            .iter()
            .position(|t| t.id() == id)
            .ok_or(Error::TimelineNotFound(id))
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Problems met while hydrating.
    pub fn config_errors(&self) -> &[ConfigError] {
        &self.config_errors
    }

    /// Timelines in registry order.
    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    pub(crate) fn timelines_mut(&mut self) -> &mut [Timeline] {
        &mut self.timelines
    }

    pub fn timeline(&self, id: TimelineId) -> Option<&Timeline> {
        self.timelines.iter().find(|t| t.id() == id)
    }

    pub fn timeline_mut(&mut self, id: TimelineId) -> Option<&mut Timeline> {
        self.timelines.iter_mut().find(|t| t.id() == id)
    }

    /// Append a timeline at the end of the list.
    pub fn add_timeline(&mut self, config: TimelineConfig) -> Result<TimelineId> {
        let id = self.insert(config);
        self.flush()?;
        Ok(id)
    }

    /// Remove a timeline. If it was main, no timeline is main afterwards.
    pub fn remove_timeline(&mut self, id: TimelineId) -> Result<Timeline> {
        let index = self.position(id)?;
        let removed = self.timelines.remove(index);
        if self.main == Some(id) {
            self.main = None;
        }
        self.flush()?;
        Ok(removed)
    }

    /// Make `id` the main timeline. The list order does not change.
    pub fn set_main(&mut self, id: TimelineId) -> Result<()> {
        self.position(id)?;
        self.main = Some(id);
        self.flush()?;
        Ok(())
    }

    pub fn clear_main(&mut self) -> Result<()> {
        self.main = None;
        self.flush()?;
        Ok(())
    }

    pub fn is_main(&self, id: TimelineId) -> bool {
        self.main == Some(id)
    }

    /// The explicitly designated main timeline.
    pub fn main_timeline(&self) -> Option<TimelineId> {
        self.main
    }

    /// Persist a new display mode. Also drops any session override.
    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Result<()> {
        self.display_mode = mode;
        self.session_display_mode = None;
        self.flush()?;
        Ok(())
    }

    /// Apply session-only options. Nothing is written to storage.
    pub fn apply_launch_options(&mut self, options: &LaunchOptions) {
        if let Some(mode) = options.display_mode {
            log::debug!("session display mode {mode:?}");
            self.session_display_mode = Some(mode);
        }
    }

    /// The display mode as persisted.
    pub fn persisted_display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    /// The display mode in effect: the session override, else the persisted one.
    pub fn effective_display_mode(&self) -> DisplayMode {
        self.session_display_mode.unwrap_or(self.display_mode)
    }

    /// The timeline shown in single mode: the main one, else the first.
    pub fn single_timeline(&self) -> Option<&Timeline> {
        self.main
            .and_then(|id| self.timeline(id))
            .or_else(|| self.timelines.first())
    }

    /// Timelines to render under the effective display mode.
    pub fn visible_timelines(&self) -> Vec<&Timeline> {
        match self.effective_display_mode() {
            DisplayMode::Single { .. } => self.single_timeline().into_iter().collect(),
            DisplayMode::Multiple => self.timelines.iter().collect(),
        }
    }

    pub fn add_endpoint(&mut self, id: TimelineId, config: EndpointConfig) -> Result<EndpointId> {
        let index = self.position(id)?;
        let endpoint = self.timelines[index].add_endpoint(config);
        self.flush()?;
        Ok(endpoint)
    }

    pub fn remove_endpoint(&mut self, id: TimelineId, index: usize) -> Result<Endpoint> {
        let position = self.position(id)?;
        let removed = self.timelines[position]
            .remove_endpoint(index)
            .ok_or(Error::EndpointIndexOutOfRange { timeline: id, index })?;
        self.flush()?;
        Ok(removed)
    }

    /// Replace a timeline's display options and rebuild its view.
    pub fn set_options(
        &mut self,
        id: TimelineId,
        options: TimelineOptions,
        store: &ArticleStore,
    ) -> Result<()> {
        let position = self.position(id)?;
        let timeline = &mut self.timelines[position];
        timeline.set_options(options);
        timeline.recompute(store);
        self.flush()?;
        Ok(())
    }

    /// Rebuild every view, e.g. after a flag change that filters depend on.
    pub fn recompute_views(&mut self, store: &ArticleStore) {
        for timeline in &mut self.timelines {
            timeline.recompute(store);
        }
    }

    /// Timelines whose view contains `article`.
    pub fn timelines_showing(&self, article: &ArticleId) -> Vec<TimelineId> {
        self.timelines
            .iter()
            .filter(|t| t.articles().contains(article))
            .map(|t| t.id())
            .collect()
    }
}

fn persisted_timeline(timeline: &Timeline) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(timeline.to_config())?;
    if let Some(Value::Array(endpoints)) = value.get_mut("endpoints") {
        endpoints.extend(timeline.detached_endpoints().iter().cloned());
    }
    Ok(value)
}
