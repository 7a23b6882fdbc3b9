#![allow(dead_code)]

use serde_json::{Value, json};
use soshalthing::{
    DUMMY_SERVICE, DummyService, EndpointConfig, EndpointType, Engine, FetchedArticle,
    MemoryStorage, ServiceRegistry, StorageKeys, TimelineConfig, TimelineRegistry,
};
use std::sync::Arc;

pub fn dummy() -> Arc<DummyService> {
    Arc::new(DummyService::new())
}

pub fn services(dummy: &Arc<DummyService>) -> ServiceRegistry {
    let mut services = ServiceRegistry::new();
    services.register(dummy.clone());
    services
}

pub fn engine(storage: &MemoryStorage, dummy: &Arc<DummyService>) -> Engine {
    Engine::builder(storage.clone())
        .service(dummy.clone())
        .open()
        .unwrap()
}

pub fn registry(storage: &MemoryStorage) -> TimelineRegistry {
    TimelineRegistry::hydrate(
        Box::new(storage.clone()),
        StorageKeys::default(),
        &ServiceRegistry::new(),
    )
}

pub fn endpoint(endpoint_type: EndpointType) -> EndpointConfig {
    EndpointConfig::new(DUMMY_SERVICE, endpoint_type)
}

pub fn timeline(title: &str, endpoints: Vec<EndpointConfig>) -> TimelineConfig {
    endpoints
        .into_iter()
        .fold(TimelineConfig::new(title), |config, endpoint| config.endpoint(endpoint))
}

pub fn article(id: &str) -> FetchedArticle {
    DummyService::article_for(DUMMY_SERVICE, id, None)
}

pub fn dated(id: &str, created_at: u64) -> FetchedArticle {
    DummyService::article_for(DUMMY_SERVICE, id, Some(created_at))
}

pub fn ids(articles: &[soshalthing::ArticleId]) -> Vec<&str> {
    articles.iter().map(|a| a.id.as_str()).collect()
}

pub fn stored(storage: &MemoryStorage, key: &str) -> Option<Value> {
    storage
        .get_raw(key)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

pub fn seed_timelines(storage: &MemoryStorage, timelines: Value) {
    storage.set_raw("SoshalThingYew Timelines", timelines.to_string());
}

pub fn home_only() -> Value {
    json!([{"title": "Home"}])
}
