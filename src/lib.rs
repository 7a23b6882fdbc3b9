mod article;
mod config;
pub mod dummy;
mod endpoint;
mod engine;
mod error;
mod filter;
mod merge;
mod notification;
mod ratelimit;
mod reconciler;
mod registry;
mod service;
mod sort;
pub mod storage;
mod store;
mod timeline;

pub use article::{
    ActionKind, Article, ArticleContent, ArticleId, ArticleMedia, ArticleRef, FetchedArticle,
};
pub use config::{
    AppSettings, Container, DEFAULT_APP_NAME, DEFAULT_REFRESH_INTERVAL, DisplayMode,
    EndpointConfig, LaunchOptions, ParsedTimeline, StorageKeys, TimelineConfig, TimelineOptions,
    parse_settings, parse_timelines, parse_timelines_detached,
};
pub use dummy::{DUMMY_SERVICE, DummyService};
pub use endpoint::{
    ApplyOutcome, Endpoint, EndpointId, EndpointStatus, EndpointType, FetchedTicket, LoadTicket,
    LoadTrigger,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{ActionError, ConfigError, Error, FetchError, Result, StorageError};
pub use filter::{Filter, FilterKind, passes_all};
pub use merge::merge_refs;
pub use notification::{Notification, NotificationLevel, Notifications};
pub use ratelimit::RateLimit;
pub use reconciler::{
    ActionOutcome, ActionPhase, ActionReconciler, ActionTicket, DEFAULT_SETTLED_HISTORY,
};
pub use registry::TimelineRegistry;
pub use service::{
    ActionRequest, Cursor, Direction, Page, PageQuery, ServiceAdapter, ServiceRegistry,
};
pub use sort::{SortMethod, SortOption};
pub use storage::{FileStorage, LockMode, MemoryStorage, Storage};
pub use store::ArticleStore;
pub use timeline::{BatchReport, LoadBatch, SettledBatch, Timeline, TimelineId};
