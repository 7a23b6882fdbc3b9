mod common;

use common::{article, dated, dummy, endpoint, engine, ids, registry, services, timeline};
use soshalthing::{
    ArticleStore, DUMMY_SERVICE, EndpointStatus, EndpointType, FetchError, Filter, FilterKind,
    MemoryStorage, RateLimit, SortMethod, SortOption, TimelineOptions,
};

#[tokio::test]
async fn test_start_loads_on_start_endpoints() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("1"), article("2")]]);
    dummy.set_pages(EndpointType::Search, vec![vec![article("3")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Mixed",
            vec![
                endpoint(EndpointType::Home),
                endpoint(EndpointType::Search).on_start(false),
            ],
        ))
        .unwrap();

    let reports = engine.start().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.applied, 1);

    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1", "2"]);
    assert_eq!(dummy.fetch_log().len(), 1);
}

#[tokio::test]
async fn test_empty_timeline_has_empty_view() {
    let dummy = dummy();
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine.add_timeline(timeline("Home", vec![])).unwrap();

    let report = engine.refresh(id).await.unwrap();
    assert_eq!(report.applied, 0);
    assert!(report.is_ok());
    assert!(engine.timeline_view(id).unwrap().is_empty());
    assert!(dummy.fetch_log().is_empty());
}

#[tokio::test]
async fn test_partial_failure_isolation() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("1")]]);
    dummy.set_pages(EndpointType::Search, vec![vec![article("2"), article("3")]]);
    dummy.set_fetch_failure(
        EndpointType::Home,
        Some(FetchError::Network("connection reset".to_string())),
    );

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![endpoint(EndpointType::Home), endpoint(EndpointType::Search)],
        ))
        .unwrap();

    let report = engine.refresh(id).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed.len(), 1);

    let timeline = engine.timeline(id).unwrap();
    assert_eq!(ids(timeline.articles()), vec!["2", "3"]);
    let errors = timeline.endpoint_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, timeline.endpoints()[0].id());
    assert_eq!(timeline.endpoints()[1].status(), &EndpointStatus::Ok);

    let notifications: Vec<_> = engine.notifications().collect();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("connection reset"));
}

#[tokio::test]
async fn test_repeated_failures_keep_one_notification() {
    let dummy = dummy();
    dummy.set_fetch_failure(EndpointType::Home, Some(FetchError::Network("down".to_string())));

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();

    engine.refresh(id).await.unwrap();
    engine.refresh(id).await.unwrap();
    assert_eq!(engine.notifications().count(), 1);

    dummy.set_fetch_failure(EndpointType::Home, None);
    engine.refresh(id).await.unwrap();
    assert_eq!(engine.notifications().count(), 0);
}

#[tokio::test]
async fn test_unknown_service_is_a_per_endpoint_error() {
    let dummy = dummy();
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![
                soshalthing::EndpointConfig::new("Nowhere", EndpointType::Home),
                endpoint(EndpointType::Home),
            ],
        ))
        .unwrap();

    let report = engine.refresh(id).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(
        report.failed[0].1,
        FetchError::UnknownService("Nowhere".to_string())
    );
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["0"]);
}

#[tokio::test]
async fn test_unsupported_endpoint_type() {
    let dummy = dummy();
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline("Likes", vec![endpoint(EndpointType::Likes)]))
        .unwrap();

    let report = engine.refresh(id).await.unwrap();
    assert!(matches!(
        report.failed[0].1,
        FetchError::UnsupportedEndpoint {
            endpoint_type: EndpointType::Likes,
            ..
        }
    ));
}

#[tokio::test]
async fn test_load_more_appends_older_pages() {
    let dummy = dummy();
    dummy.set_pages(
        EndpointType::Home,
        vec![
            vec![article("1"), article("2")],
            vec![article("3"), article("2")],
            vec![article("4")],
        ],
    );

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();

    engine.start().await;
    assert!(engine.timeline(id).unwrap().can_load_more());

    engine.load_more(id).await.unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1", "2", "3"]);

    engine.load_more(id).await.unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1", "2", "3", "4"]);
    assert!(!engine.timeline(id).unwrap().can_load_more());

    // Exhausted cursor: no request is issued.
    let fetches = dummy.fetch_log().len();
    let report = engine.load_more(id).await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(dummy.fetch_log().len(), fetches);
}

#[tokio::test]
async fn test_refresh_prepends_without_moving_older_cursor() {
    let dummy = dummy();
    dummy.set_pages(
        EndpointType::Home,
        vec![vec![article("5"), article("4")], vec![article("3")]],
    );

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();
    engine.start().await;

    dummy.push_newer(EndpointType::Home, vec![article("7"), article("6"), article("5")]);
    engine.refresh(id).await.unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["7", "6", "5", "4"]);

    let cursor = engine.timeline(id).unwrap().endpoints()[0].cursor().clone();
    assert_eq!(cursor, soshalthing::Cursor::Next("1".to_string()));

    engine.load_more(id).await.unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["7", "6", "5", "4", "3"]);
}

#[tokio::test]
async fn test_refresh_skips_passive_endpoints() {
    let dummy = dummy();
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Home",
            vec![endpoint(EndpointType::Home).on_refresh(false)],
        ))
        .unwrap();

    engine.start().await;
    assert_eq!(dummy.fetch_log().len(), 1);

    engine.refresh(id).await.unwrap();
    assert_eq!(dummy.fetch_log().len(), 1);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("1")]]);
    let services = services(&dummy);
    let mut store = ArticleStore::new();

    let storage = MemoryStorage::new();
    let mut registry = registry(&storage);
    let id = registry
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();
    let timeline = registry.timeline_mut(id).unwrap();

    let first = timeline.begin_refresh();
    let second = timeline.begin_refresh();
    let first = first.fetch(&services).await;
    let second = second.fetch(&services).await;

    // The later request settles first; the earlier one must not regress it.
    let report = timeline.apply_batch(second, &mut store);
    assert_eq!(report.applied, 1);
    let report = timeline.apply_batch(first, &mut store);
    assert_eq!(report.applied, 0);
    assert_eq!(report.discarded, 1);
    assert_eq!(ids(timeline.articles()), vec!["1"]);
}

#[tokio::test]
async fn test_response_for_removed_endpoint_is_discarded() {
    let dummy = dummy();
    let services = services(&dummy);
    let mut store = ArticleStore::new();

    let storage = MemoryStorage::new();
    let mut registry = registry(&storage);
    let id = registry
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();

    let batch = registry.timeline_mut(id).unwrap().begin_start();
    let settled = batch.fetch(&services).await;
    registry.remove_endpoint(id, 0).unwrap();

    let report = registry.timeline_mut(id).unwrap().apply_batch(settled, &mut store);
    assert_eq!(report.discarded, 1);
    assert!(registry.timeline(id).unwrap().articles().is_empty());
}

#[tokio::test]
async fn test_interleaves_endpoints_by_recency() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![dated("a", 40), dated("b", 10)]]);
    dummy.set_pages(EndpointType::Search, vec![vec![dated("c", 30), dated("a", 40)]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![endpoint(EndpointType::Home), endpoint(EndpointType::Search)],
        ))
        .unwrap();
    engine.start().await;

    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_concatenates_without_timestamps() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("b"), article("a")]]);
    dummy.set_pages(EndpointType::Search, vec![vec![article("c"), article("b")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![endpoint(EndpointType::Home), endpoint(EndpointType::Search)],
        ))
        .unwrap();
    engine.start().await;

    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn test_shared_article_is_stored_once() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("1"), article("2")]]);
    dummy.set_pages(EndpointType::Search, vec![vec![article("2")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let home = engine
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();
    let search = engine
        .add_timeline(timeline("Search", vec![endpoint(EndpointType::Search)]))
        .unwrap();
    engine.start().await;

    assert_eq!(engine.store().len(), 2);
    assert_eq!(ids(engine.timeline_view(home).unwrap()), vec!["1", "2"]);
    assert_eq!(ids(engine.timeline_view(search).unwrap()), vec!["2"]);
}

#[tokio::test]
async fn test_timeline_filters_and_sort() {
    let dummy = dummy();
    let liked = article("3").with_liked(true);
    let mut popular = article("2");
    popular.content.like_count = 50;
    let mut quiet = article("1");
    quiet.content.like_count = 5;
    dummy.set_pages(EndpointType::Home, vec![vec![liked, popular, quiet]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
        .unwrap();
    engine.start().await;
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["3", "2", "1"]);

    let options = TimelineOptions {
        filters: vec![Filter::new(FilterKind::Liked).inverted()],
        sort: Some(SortOption {
            method: SortMethod::Likes,
            reversed: false,
        }),
        ..TimelineOptions::default()
    };
    engine.set_timeline_options(id, options).unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1", "2"]);

    // Hiding is local and filters apply on the next recompute.
    let hidden = soshalthing::ArticleId::new(DUMMY_SERVICE, "1");
    let mut options = engine.timeline(id).unwrap().options().clone();
    options.filters.push(Filter::new(FilterKind::NotHidden));
    engine.set_timeline_options(id, options).unwrap();
    assert_eq!(engine.toggle_hidden(&hidden), Some(true));
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["2"]);
}

#[tokio::test]
async fn test_endpoint_filters_gate_refs() {
    let dummy = dummy();
    let mut with_media = article("1");
    with_media
        .content
        .media
        .push(soshalthing::ArticleMedia::Image("https://example.com/1.png".to_string()));
    dummy.set_pages(EndpointType::Home, vec![vec![with_media, article("2")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Media",
            vec![endpoint(EndpointType::Home).filter(Filter::new(FilterKind::Media))],
        ))
        .unwrap();
    engine.start().await;

    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1"]);
}

#[tokio::test]
async fn test_remove_endpoint_drops_its_articles() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Home, vec![vec![article("1"), article("2")]]);
    dummy.set_pages(EndpointType::Search, vec![vec![article("2"), article("3")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![endpoint(EndpointType::Home), endpoint(EndpointType::Search)],
        ))
        .unwrap();
    engine.start().await;
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["1", "2", "3"]);

    let removed = engine.remove_endpoint(id, 0).unwrap();
    assert_eq!(removed.config().endpoint_type, EndpointType::Home);
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["2", "3"]);

    assert!(matches!(
        engine.remove_endpoint(id, 5),
        Err(soshalthing::Error::EndpointIndexOutOfRange { index: 5, .. })
    ));
}

#[tokio::test]
async fn test_added_endpoint_loads_on_next_refresh() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Search, vec![vec![article("9")]]);

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine.add_timeline(timeline("Home", vec![])).unwrap();
    engine.add_endpoint(id, endpoint(EndpointType::Search)).unwrap();

    engine.refresh(id).await.unwrap();
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["9"]);
}

#[tokio::test]
async fn test_rate_limited_endpoint_is_skipped() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Search, vec![vec![article("1")]]);
    dummy.set_ratelimit(
        EndpointType::Home,
        Some(RateLimit {
            limit: 15,
            remaining: 0,
            reset: u64::MAX,
        }),
    );

    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Both",
            vec![endpoint(EndpointType::Home), endpoint(EndpointType::Search)],
        ))
        .unwrap();
    engine.start().await;
    assert_eq!(dummy.fetch_log().len(), 2);

    dummy.push_newer(EndpointType::Search, vec![article("2")]);
    engine.refresh(id).await.unwrap();

    // Only the search endpoint was asked again.
    let log = dummy.fetch_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[2].endpoint_type, EndpointType::Search);

    let timeline = engine.timeline(id).unwrap();
    assert!(matches!(
        timeline.endpoints()[0].status(),
        EndpointStatus::Failed(FetchError::RateLimited { reset: u64::MAX })
    ));
    assert!(ids(timeline.articles()).contains(&"2"));
}

#[tokio::test]
async fn test_auto_refresh_loads_due_endpoints_only() {
    let dummy = dummy();
    dummy.set_pages(EndpointType::Search, vec![vec![article("s")]]);
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let id = engine
        .add_timeline(timeline(
            "Home",
            vec![
                endpoint(EndpointType::Home).on_start(false).auto_refresh(60),
                endpoint(EndpointType::Search).on_start(false),
            ],
        ))
        .unwrap();
    let home = engine.timeline(id).unwrap().endpoints()[0].id();

    // Never loaded, so due at any time.
    assert_eq!(engine.due_auto_refreshes(0), vec![(id, home)]);

    let reports = engine.auto_refresh().await;
    assert_eq!(reports[0].1.applied, 1);
    assert_eq!(ids(engine.timeline_view(id).unwrap()), vec!["0"]);
    let log = dummy.fetch_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].endpoint_type, EndpointType::Home);

    // Loaded just now: not due again until the interval has elapsed.
    assert!(engine.due_auto_refreshes(0).is_empty());
    assert_eq!(engine.due_auto_refreshes(u64::MAX), vec![(id, home)]);
    engine.auto_refresh().await;
    assert_eq!(dummy.fetch_log().len(), 1);
}

#[tokio::test]
async fn test_removing_failed_endpoint_dismisses_its_notification() {
    let dummy = dummy();
    dummy.set_fetch_failure(EndpointType::Home, Some(FetchError::Network("down".to_string())));
    let storage = MemoryStorage::new();
    let mut engine = engine(&storage, &dummy);
    let first = engine
        .add_timeline(timeline("First", vec![endpoint(EndpointType::Home)]))
        .unwrap();
    let second = engine
        .add_timeline(timeline("Second", vec![endpoint(EndpointType::Home)]))
        .unwrap();

    engine.refresh_all().await;
    assert_eq!(engine.notifications().count(), 2);

    engine.remove_endpoint(first, 0).unwrap();
    let remaining: Vec<_> = engine.notifications().collect();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].message.starts_with("Second"));

    engine.remove_timeline(second).unwrap();
    assert_eq!(engine.notifications().count(), 0);
}
