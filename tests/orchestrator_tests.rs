mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use arriendos::db::PropertyFilter;
use arriendos::domain::{PriceRange, PropertyRecord, SourceSelector};
use arriendos::scrapers::{ScraperRegistry, SiteScraper};
use arriendos::services::{Orchestrator, ScrapeRequest, SourceOutcome};
use arriendos::state::SharedState;

use common::{
    FakeLauncher, FakeScraper, FakeWeb, FlakyLauncher, SOURCE, default_range, search_url,
    test_config, test_state,
};

#[tokio::test]
async fn test_failed_detail_page_is_skipped() {
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/ok", "https://fake.test/broken"])
            .page("https://fake.test/ok", "Casa|3100000")
            .failing("https://fake.test/broken"),
    );
    let state = test_state(Arc::clone(&web)).await;

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    match &outcome.sources[0] {
        SourceOutcome::Completed {
            found,
            new_properties,
            skipped,
            ..
        } => {
            assert_eq!(*found, 1);
            assert_eq!(*new_properties, 1);
            assert_eq!(*skipped, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        state.store.count_properties(&PropertyFilter::default()).await.unwrap(),
        1
    );

    let run = state.store.get_scrape_run(SOURCE).await.unwrap().unwrap();
    assert_eq!(run.summary["scraped"], 1);
    assert_eq!(run.summary["failed"], 1);
}

#[tokio::test]
async fn test_links_are_deduplicated_across_search_pages() {
    let cheap = PriceRange::new(1_000_000, 2_000_000);
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/1", "https://fake.test/2"])
            .with_search(cheap, &["https://fake.test/2", "https://fake.test/3"])
            .page("https://fake.test/1", "Uno|3000000")
            .page("https://fake.test/2", "Dos|2000000")
            .page("https://fake.test/3", "GONE"),
    );

    let orchestrator = Orchestrator::new(Arc::new(FakeLauncher {
        web: Arc::clone(&web),
    }));
    let report = orchestrator
        .run_source(&FakeScraper::new(), &[default_range(), cheap])
        .await
        .unwrap();

    assert_eq!(report.links.len(), 3);
    assert_eq!(report.scraped, 2);
    assert_eq!(report.missing, 1);
    assert!(report.complete());

    let detail_visits = web
        .visits()
        .iter()
        .filter(|v| v.as_str() == "https://fake.test/2")
        .count();
    assert_eq!(detail_visits, 1);

    let mut records: Vec<PropertyRecord> = report.records;
    records.sort_by(|a, b| a.link.cmp(&b.link));
    assert!(records.iter().all(|r| r.source == SOURCE));
    assert!(records.iter().all(|r| r.location == "La Abadia"));
}

#[tokio::test]
async fn test_recent_run_is_served_from_cache() {
    let web = Arc::new(FakeWeb::default().with_search(default_range(), &[]));
    let state = test_state(Arc::clone(&web)).await;

    state
        .store
        .record_scrape_run(
            SOURCE,
            chrono::Utc::now() - chrono::Duration::minutes(10),
            &serde_json::json!({"scraped": 7}),
        )
        .await
        .unwrap();

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    assert!(outcome.all_cached());
    match &outcome.sources[0] {
        SourceOutcome::Cached { summary, .. } => assert_eq!(summary["scraped"], 7),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(web.visits().is_empty());

    let outcome = state
        .scrape
        .run(ScrapeRequest {
            source: SourceSelector::One(SOURCE.to_string()),
            force: true,
            price_range: None,
        })
        .await
        .unwrap();
    assert!(!outcome.all_cached());
    assert_eq!(web.visits(), vec![search_url(default_range())]);
}

#[tokio::test]
async fn test_stale_run_scrapes_again() {
    let web = Arc::new(FakeWeb::default().with_search(default_range(), &[]));
    let state = test_state(Arc::clone(&web)).await;

    state
        .store
        .record_scrape_run(
            SOURCE,
            chrono::Utc::now() - chrono::Duration::minutes(121),
            &serde_json::json!({}),
        )
        .await
        .unwrap();

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    assert_eq!(outcome.cached, 0);
    assert_eq!(web.visits().len(), 1);
}

#[tokio::test]
async fn test_failed_search_page_keeps_existing_listings() {
    let web = Arc::new(FakeWeb::default().failing(&search_url(default_range())));
    let state = test_state(Arc::clone(&web)).await;

    state
        .store
        .upsert_property(&PropertyRecord::new(SOURCE, "https://fake.test/old"))
        .await
        .unwrap();

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    match &outcome.sources[0] {
        SourceOutcome::Completed {
            removed,
            search_failures,
            ..
        } => {
            assert_eq!(*removed, 0);
            assert_eq!(*search_failures, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(state.store.count_properties_for_source(SOURCE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unseen_listing_is_retired_after_complete_pass() {
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/new"])
            .page("https://fake.test/new", "Nuevo|2900000"),
    );
    let state = test_state(Arc::clone(&web)).await;

    state
        .store
        .upsert_property(&PropertyRecord::new(SOURCE, "https://fake.test/old"))
        .await
        .unwrap();

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    match &outcome.sources[0] {
        SourceOutcome::Completed {
            new_properties,
            removed,
            ..
        } => {
            assert_eq!(*new_properties, 1);
            assert_eq!(*removed, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let live = state
        .store
        .list_properties(&PropertyFilter::default(), Default::default(), Default::default())
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].link, "https://fake.test/new");
}

#[tokio::test]
async fn test_withdrawn_listing_is_retired() {
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/kept", "https://fake.test/gone"])
            .page("https://fake.test/kept", "Sigue|3000000")
            .page("https://fake.test/gone", "GONE"),
    );
    let state = test_state(Arc::clone(&web)).await;

    for link in ["https://fake.test/kept", "https://fake.test/gone"] {
        state
            .store
            .upsert_property(&PropertyRecord::new(SOURCE, link))
            .await
            .unwrap();
    }

    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();
    match &outcome.sources[0] {
        SourceOutcome::Completed { found, removed, .. } => {
            assert_eq!(*found, 1);
            assert_eq!(*removed, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(state.store.count_properties_for_source(SOURCE).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_page_pools_respect_concurrency_limits() {
    let cheap = PriceRange::new(1_000_000, 2_000_000);
    let pricey = PriceRange::new(4_000_000, 5_000_000);
    let links: Vec<String> = (0..8).map(|i| format!("https://fake.test/{i}")).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();

    let mut web = FakeWeb::default()
        .latency(Duration::from_millis(20))
        .with_search(default_range(), &link_refs[..3])
        .with_search(cheap, &link_refs[3..6])
        .with_search(pricey, &link_refs[6..]);
    for link in &links {
        web = web.page(link, "Casa|3000000");
    }
    let web = Arc::new(web);

    let orchestrator = Orchestrator::new(Arc::new(FakeLauncher {
        web: Arc::clone(&web),
    }));
    let report = orchestrator
        .run_source(
            &FakeScraper::new().with_concurrency(2, 2),
            &[default_range(), cheap, pricey],
        )
        .await
        .unwrap();

    assert_eq!(report.scraped, 8);
    assert_eq!(web.visits().len(), 11);
    assert!(web.peak_in_flight() <= 2, "peak was {}", web.peak_in_flight());
    assert!(web.peak_in_flight() >= 2);
}

#[tokio::test]
async fn test_source_scrape_runs_on_spawned_task() {
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/1"])
            .page("https://fake.test/1", "Uno|3000000"),
    );
    let orchestrator = Orchestrator::new(Arc::new(FakeLauncher {
        web: Arc::clone(&web),
    }));
    let scraper: Arc<dyn SiteScraper> = Arc::new(FakeScraper::new());

    let report = tokio::spawn(async move {
        orchestrator
            .run_source(scraper.as_ref(), &[default_range()])
            .await
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.scraped, 1);

    let state = test_state(web).await;
    let outcome = state
        .scrape
        .spawn(ScrapeRequest::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.new_properties, 1);
}

#[tokio::test]
async fn test_failed_launch_is_isolated_to_one_source() {
    let web = Arc::new(
        FakeWeb::default()
            .with_search(default_range(), &["https://fake.test/1"])
            .page("https://fake.test/1", "Uno|3000000"),
    );
    let scrapers: Vec<Arc<dyn SiteScraper>> = vec![
        Arc::new(FakeScraper::new().with_source("fake_north")),
        Arc::new(FakeScraper::new().with_source("fake_south")),
    ];

    let orchestrator = Orchestrator::new(Arc::new(FlakyLauncher {
        web: Arc::clone(&web),
        failures: AtomicUsize::new(1),
    }));
    let results = orchestrator.run_many(&scrapers, &[default_range()]).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|(_, r)| r.is_err()).count(), 1);
    let (_, report) = results.iter().find(|(_, r)| r.is_ok()).unwrap();
    assert_eq!(report.as_ref().unwrap().scraped, 1);

    let state = SharedState::with_parts(
        test_config(),
        Arc::new(FlakyLauncher {
            web,
            failures: AtomicUsize::new(1),
        }),
        ScraperRegistry::new(scrapers),
    )
    .await
    .unwrap();
    let outcome = state.scrape.run(ScrapeRequest::default()).await.unwrap();

    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.failed, 1);
    let failed: Vec<&str> = outcome
        .sources
        .iter()
        .filter(|s| matches!(s, SourceOutcome::Failed { .. }))
        .map(SourceOutcome::source)
        .collect();
    let completed: Vec<&str> = outcome
        .sources
        .iter()
        .filter(|s| matches!(s, SourceOutcome::Completed { .. }))
        .map(SourceOutcome::source)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(completed.len(), 1);
    assert_ne!(failed[0], completed[0]);
    assert_eq!(
        state.store.count_properties(&PropertyFilter::default()).await.unwrap(),
        1
    );
}
