//! Two timelines over the dummy service, persisted to a directory.
//!
//! Starts the engine, likes an article shown on both timelines, then reopens
//! the storage to show that the configuration survived.

use futures::executor::block_on;
use soshalthing::{
    ActionKind, ArticleId, DUMMY_SERVICE, DummyService, EndpointConfig, EndpointType, Engine,
    FileStorage, TimelineConfig,
};
use std::sync::Arc;

fn print_views(engine: &Engine) {
    for timeline in engine.visible_timelines() {
        println!("== {} ==", timeline.title());
        for id in timeline.articles() {
            if let Some(article) = engine.article(id) {
                let liked = if article.liked() { "♥" } else { " " };
                println!("  {liked} {id}  {}", article.content().text);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let dummy = Arc::new(DummyService::new());
    dummy.set_pages(
        EndpointType::Home,
        vec![
            vec![dummy.article("3", Some(3_000)), dummy.article("2", Some(2_000))],
            vec![dummy.article("1", Some(1_000))],
        ],
    );
    dummy.set_pages(
        EndpointType::Search,
        vec![vec![dummy.article("2", Some(2_000)), dummy.article("s", Some(2_500))]],
    );

    let mut engine = Engine::builder(FileStorage::open(dir.path())?)
        .service(dummy.clone())
        .default_timeline(
            TimelineConfig::new("Home")
                .endpoint(EndpointConfig::new(DUMMY_SERVICE, EndpointType::Home)),
        )
        .open()?;
    let search_endpoint =
        EndpointConfig::new(DUMMY_SERVICE, EndpointType::Search).param("query", "cats");
    let search = engine.add_timeline(TimelineConfig::new("Search").endpoint(search_endpoint))?;

    block_on(engine.start());
    println!("--- after start");
    print_views(&engine);

    let shared = ArticleId::new(DUMMY_SERVICE, "2");
    let outcome = block_on(engine.perform_action(&shared, ActionKind::Like))?;
    println!("--- {outcome:?}");
    print_views(&engine);

    let home = engine.timelines()[0].id();
    block_on(engine.load_more(home))?;
    engine.set_main(search)?;
    println!("--- after load more");
    print_views(&engine);

    drop(engine);
    let reopened = Engine::builder(FileStorage::open(dir.path())?)
        .service(dummy)
        .open()?;
    println!("--- reopened");
    for timeline in reopened.timelines() {
        println!("{}: {} endpoints", timeline.title(), timeline.endpoints().len());
    }

    Ok(())
}
