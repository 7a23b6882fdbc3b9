//! Persisted configuration: timelines, endpoints, display mode, launch options.
//!
//! Persisted entries are parsed one at a time. A malformed timeline or
//! endpoint entry is dropped with a warning and the rest of the configuration
//! still loads; nothing in here ever fails startup.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::endpoint::EndpointType;
use crate::error::ConfigError;
use crate::filter::Filter;
use crate::service::ServiceRegistry;
use crate::sort::SortOption;

/// Default application name used to derive storage keys.
pub const DEFAULT_APP_NAME: &str = "SoshalThingYew";

/// Seconds between two automatic refreshes of an endpoint unless configured.
pub const DEFAULT_REFRESH_INTERVAL: u64 = 90;

/// Storage keys derived from the application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub app: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        StorageKeys::new(DEFAULT_APP_NAME)
    }
}

impl StorageKeys {
    pub fn new(app: impl Into<String>) -> Self {
        StorageKeys { app: app.into() }
    }

    /// Key of the ordered timeline array, `"<App> Timelines"`.
    pub fn timelines(&self) -> String {
        format!("{} Timelines", self.app)
    }

    /// Key of the app settings object, `"<App>"`.
    pub fn settings(&self) -> String {
        self.app.clone()
    }
}

/// Layout of a timeline's articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Container {
    #[default]
    Column,
    Row,
    Masonry,
}

impl FromStr for Container {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Column" => Ok(Container::Column),
            "Row" => Ok(Container::Row),
            "Masonry" => Ok(Container::Masonry),
            other => Err(ConfigError::InvalidQuery(format!("unknown container '{other}'"))),
        }
    }
}

/// How the registry's timelines are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DisplayMode {
    /// Only the main timeline, full width.
    Single {
        #[serde(default)]
        container: Container,
        #[serde(default = "default_1")]
        column_count: u8,
    },
    /// Every timeline, in registry order.
    #[default]
    #[serde(alias = "Default")]
    Multiple,
}

/// The `"<App>"` settings object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub display_mode: DisplayMode,
}

/// Configuration of one endpoint, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointConfig {
    pub service: String,
    pub endpoint_type: EndpointType,
    pub params: BTreeMap<String, String>,
    pub on_start: bool,
    pub on_refresh: bool,
    /// Refresh on a timer, every `refresh_interval` seconds.
    pub auto_refresh: bool,
    pub refresh_interval: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

impl EndpointConfig {
    /// A new endpoint config that is active both on start and on refresh.
    pub fn new(service: impl Into<String>, endpoint_type: EndpointType) -> Self {
        EndpointConfig {
            service: service.into(),
            endpoint_type,
            params: BTreeMap::new(),
            on_start: true,
            on_refresh: true,
            auto_refresh: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            filters: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn on_start(mut self, on_start: bool) -> Self {
        self.on_start = on_start;
        self
    }

    pub fn on_refresh(mut self, on_refresh: bool) -> Self {
        self.on_refresh = on_refresh;
        self
    }

    /// Turn on timed refreshes every `interval` seconds.
    pub fn auto_refresh(mut self, interval: u64) -> Self {
        self.auto_refresh = true;
        self.refresh_interval = interval;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether `other` names the same data source (service, type and params).
    pub fn same_source(&self, other: &EndpointConfig) -> bool {
        self.service == other.service
            && self.endpoint_type == other.endpoint_type
            && self.params == other.params
    }
}

/// Display options of a timeline. Every field has a default so older
/// persisted entries that only carry a title still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineOptions {
    #[serde(default)]
    pub container: Container,
    #[serde(default = "default_1")]
    pub column_count: u8,
    #[serde(default = "default_1")]
    pub width: u8,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOption>,
    #[serde(default)]
    pub compact: bool,
    #[serde(default)]
    pub hide_text: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        TimelineOptions {
            container: Container::default(),
            column_count: 1,
            width: 1,
            filters: Vec::new(),
            sort: None,
            compact: false,
            hide_text: false,
        }
    }
}

/// Configuration of one timeline, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineConfig {
    pub title: String,
    pub endpoints: Vec<EndpointConfig>,
    #[serde(flatten)]
    pub options: TimelineOptions,
}

impl TimelineConfig {
    pub fn new(title: impl Into<String>) -> Self {
        TimelineConfig {
            title: title.into(),
            endpoints: Vec::new(),
            options: TimelineOptions::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn options(mut self, options: TimelineOptions) -> Self {
        self.options = options;
        self
    }
}

/// Endpoint type as found in storage: a variant name, or a legacy index into
/// the service's endpoint catalogue.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StoredEndpointType {
    Named(EndpointType),
    Index(usize),
}

#[derive(Debug, Deserialize)]
struct StoredEndpoint {
    service: String,
    endpoint_type: StoredEndpointType,
    #[serde(default, deserialize_with = "stringified_params")]
    params: BTreeMap<String, String>,
    #[serde(default)]
    on_start: bool,
    #[serde(default)]
    on_refresh: bool,
    #[serde(default)]
    auto_refresh: bool,
    #[serde(default = "default_refresh_interval")]
    refresh_interval: u64,
    #[serde(default)]
    filters: Vec<Filter>,
}

/// Endpoint list as found in storage. Older versions kept two lists, one per
/// trigger, where an endpoint active on both appeared in each.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEndpoints {
    List(Vec<Value>),
    ByTrigger {
        #[serde(default)]
        start: Vec<Value>,
        #[serde(default)]
        refresh: Vec<Value>,
    },
}

impl Default for StoredEndpoints {
    fn default() -> Self {
        StoredEndpoints::List(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct StoredTimeline {
    title: String,
    #[serde(default)]
    endpoints: StoredEndpoints,
    #[serde(flatten)]
    options: TimelineOptions,
}

fn default_1() -> u8 {
    1
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL
}

fn source_of(entry: &Value) -> (Option<&Value>, Option<&Value>, Option<&Value>) {
    (
        entry.get("service"),
        entry.get("endpoint_type"),
        entry.get("params"),
    )
}

fn set_flag(entry: &mut Value, flag: &str) {
    if let Value::Object(fields) = entry {
        fields.insert(flag.to_string(), Value::Bool(true));
    }
}

// Membership in the `start` and `refresh` lists becomes the `on_start` and
// `on_refresh` flags. An entry present in both lists is kept once.
fn flatten_by_trigger(start: Vec<Value>, refresh: Vec<Value>) -> Vec<Value> {
    let mut entries = Vec::with_capacity(start.len() + refresh.len());
    for mut entry in start {
        set_flag(&mut entry, "on_start");
        entries.push(entry);
    }
    for mut entry in refresh {
        let existing = entries
            .iter_mut()
            .find(|known| source_of(known) == source_of(&entry));
        match existing {
            Some(known) => set_flag(known, "on_refresh"),
            None => {
                set_flag(&mut entry, "on_refresh");
                entries.push(entry);
            }
        }
    }
    entries
}

impl StoredEndpoints {
    fn into_entries(self) -> Vec<Value> {
        match self {
            StoredEndpoints::List(entries) => entries,
            StoredEndpoints::ByTrigger { start, refresh } => flatten_by_trigger(start, refresh),
        }
    }
}

// Params were historically free-form JSON; keep strings as-is and stringify the rest.
fn stringified_params<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

fn resolve_endpoint(
    value: Value,
    key: &str,
    services: &ServiceRegistry,
) -> Result<EndpointConfig, ConfigError> {
    let stored: StoredEndpoint =
        serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    if !services.contains(&stored.service) {
        return Err(ConfigError::UnknownService(stored.service));
    }
    let endpoint_type = match stored.endpoint_type {
        StoredEndpointType::Named(endpoint_type) => endpoint_type,
        StoredEndpointType::Index(index) => services.endpoint_type_at(&stored.service, index)?,
    };

    Ok(EndpointConfig {
        service: stored.service,
        endpoint_type,
        params: stored.params,
        on_start: stored.on_start,
        on_refresh: stored.on_refresh,
        auto_refresh: stored.auto_refresh,
        refresh_interval: stored.refresh_interval,
        filters: stored.filters,
    })
}

/// A persisted timeline after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTimeline {
    pub config: TimelineConfig,
    /// Well-formed endpoint entries whose service or endpoint type is not
    /// available in this session. They are written back untouched so a later
    /// session with the adapter registered picks them up again.
    pub detached: Vec<Value>,
}

/// Parse the persisted timeline array.
///
/// Returns the usable timelines in stored order plus every problem met on the
/// way. Entries that fail to parse are dropped, not repaired.
pub fn parse_timelines(
    value: Value,
    key: &str,
    services: &ServiceRegistry,
) -> (Vec<TimelineConfig>, Vec<ConfigError>) {
    let (parsed, errors) = parse_timelines_detached(value, key, services);
    (parsed.into_iter().map(|p| p.config).collect(), errors)
}

/// Like [`parse_timelines`], also keeping the endpoint entries that only
/// failed because their adapter is missing.
pub fn parse_timelines_detached(
    value: Value,
    key: &str,
    services: &ServiceRegistry,
) -> (Vec<ParsedTimeline>, Vec<ConfigError>) {
    let mut errors = Vec::new();
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            errors.push(ConfigError::Malformed {
                key: key.to_string(),
                reason: format!("expected an array, found {other}"),
            });
            return (Vec::new(), errors);
        }
    };

    let mut timelines = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let stored: StoredTimeline = match serde_json::from_value(entry) {
            Ok(stored) => stored,
            Err(e) => {
                errors.push(ConfigError::Malformed {
                    key: key.to_string(),
                    reason: format!("timeline {index}: {e}"),
                });
                continue;
            }
        };

        let entries = stored.endpoints.into_entries();
        let mut endpoints = Vec::with_capacity(entries.len());
        let mut detached = Vec::new();
        for entry in entries {
            match resolve_endpoint(entry.clone(), key, services) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => {
                    if matches!(
                        e,
                        ConfigError::UnknownService(_) | ConfigError::UnknownEndpointIndex { .. }
                    ) {
                        detached.push(entry);
                    }
                    errors.push(e);
                }
            }
        }

        timelines.push(ParsedTimeline {
            config: TimelineConfig {
                title: stored.title,
                endpoints,
                options: stored.options,
            },
            detached,
        });
    }

    for error in &errors {
        log::warn!("dropping persisted configuration entry: {error}");
    }
    (timelines, errors)
}

/// Parse the persisted settings object, falling back to defaults.
pub fn parse_settings(value: Value, key: &str) -> Result<AppSettings, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Session-only options read from the page's query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchOptions {
    /// Forces this display mode for the session without persisting it.
    pub display_mode: Option<DisplayMode>,
}

impl LaunchOptions {
    /// Parse a query string such as `?single_timeline=true&column_count=2`.
    ///
    /// `single_timeline=true` selects [`DisplayMode::Single`] with
    /// `container` (default `Masonry`) and `column_count` (default 4).
    /// Unknown keys are ignored and bad values fall back to defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use soshalthing::{Container, DisplayMode, LaunchOptions};
    ///
    /// let options = LaunchOptions::from_query("?single_timeline=true&container=Column");
    /// assert_eq!(
    ///     options.display_mode,
    ///     Some(DisplayMode::Single { container: Container::Column, column_count: 4 })
    /// );
    /// assert_eq!(LaunchOptions::from_query("").display_mode, None);
    /// ```
    pub fn from_query(query: &str) -> Self {
        let mut single_timeline = false;
        let mut container = Container::Masonry;
        let mut column_count = 4;

        let pairs = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")));

        for (key, value) in pairs {
            match key {
                "single_timeline" => match value.parse() {
                    Ok(parsed) => single_timeline = parsed,
                    Err(_) => log::warn!("ignoring single_timeline={value}"),
                },
                "container" => match value.parse() {
                    Ok(parsed) => container = parsed,
                    Err(e) => log::warn!("{e}"),
                },
                "column_count" => match value.parse() {
                    Ok(parsed) => column_count = parsed,
                    Err(_) => log::warn!("ignoring column_count={value}"),
                },
                _ => {}
            }
        }

        LaunchOptions {
            display_mode: single_timeline.then_some(DisplayMode::Single {
                container,
                column_count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multiple_accepts_legacy_default_tag() {
        let settings: AppSettings =
            serde_json::from_value(json!({"display_mode": {"type": "Default"}})).unwrap();
        assert_eq!(settings.display_mode, DisplayMode::Multiple);
    }

    #[test]
    fn test_single_defaults() {
        let settings: AppSettings =
            serde_json::from_value(json!({"display_mode": {"type": "Single"}})).unwrap();
        assert_eq!(
            settings.display_mode,
            DisplayMode::Single {
                container: Container::Column,
                column_count: 1
            }
        );
    }

    #[test]
    fn test_query_bad_values_fall_back() {
        let options =
            LaunchOptions::from_query("single_timeline=true&container=Grid&column_count=x");
        assert_eq!(
            options.display_mode,
            Some(DisplayMode::Single {
                container: Container::Masonry,
                column_count: 4
            })
        );
    }

    #[test]
    fn test_query_false_is_none() {
        assert_eq!(LaunchOptions::from_query("single_timeline=false").display_mode, None);
        assert_eq!(LaunchOptions::from_query("foo=bar&baz").display_mode, None);
    }

    #[test]
    fn test_stringified_params() {
        let stored: StoredEndpoint = serde_json::from_value(json!({
            "service": "Twitter",
            "endpoint_type": 4,
            "params": {"id": "12", "include_retweets": true, "count": 20},
        }))
        .unwrap();
        assert_eq!(stored.params["id"], "12");
        assert_eq!(stored.params["include_retweets"], "true");
        assert_eq!(stored.params["count"], "20");
        assert!(matches!(stored.endpoint_type, StoredEndpointType::Index(4)));
        assert!(!stored.auto_refresh);
        assert_eq!(stored.refresh_interval, DEFAULT_REFRESH_INTERVAL);
    }

    #[test]
    fn test_by_trigger_lists_merge_shared_endpoint() {
        let stored: StoredTimeline = serde_json::from_value(json!({
            "title": "Home",
            "endpoints": {
                "start": [{"service": "Twitter", "endpoint_type": 0, "params": {}}],
                "refresh": [
                    {"service": "Twitter", "endpoint_type": 0, "params": {}},
                    {"service": "Twitter", "endpoint_type": 2, "params": {"query": "cats"}},
                ],
            },
        }))
        .unwrap();

        let entries = stored.endpoints.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["on_start"], json!(true));
        assert_eq!(entries[0]["on_refresh"], json!(true));
        assert_eq!(entries[1].get("on_start"), None);
        assert_eq!(entries[1]["on_refresh"], json!(true));
    }

    #[test]
    fn test_same_source_ignores_flags() {
        let a = EndpointConfig::new("Twitter", EndpointType::Home).on_start(false);
        let b = EndpointConfig::new("Twitter", EndpointType::Home).auto_refresh(30);
        assert!(a.same_source(&b));
        assert!(!a.same_source(&b.clone().param("id", "1")));
    }
}
