//! In-process fakes for the browser and a site scraper, so the pipeline can
//! be driven end to end without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arriendos::browser::{Browser, BrowserError, BrowserLauncher, LoadState, Page};
use arriendos::config::Config;
use arriendos::domain::{PriceRange, PropertyRecord, SearchInput};
use arriendos::scrapers::{ScrapeError, ScraperRegistry, ScraperSettings, SiteScraper};
use arriendos::state::SharedState;

pub const SOURCE: &str = "fake_agency";
pub const SEARCH_URL: &str = "https://fake.test/search";

/// Canned pages keyed by URL plus a log of every navigation.
#[derive(Default)]
pub struct FakeWeb {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    visits: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeWeb {
    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Holds every navigation open for `latency` so overlapping loads show up.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    /// Most navigations seen in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Search page listing `links`, one per line.
    pub fn with_search(self, range: PriceRange, links: &[&str]) -> Self {
        self.page(&search_url(range), &links.join("\n"))
    }
}

pub fn search_url(range: PriceRange) -> String {
    format!("{SEARCH_URL}?min={}&max={}", range.min, range.max)
}

pub struct FakeLauncher {
    pub web: Arc<FakeWeb>,
}

/// Refuses its first `failures` launches, then behaves like [`FakeLauncher`].
pub struct FlakyLauncher {
    pub web: Arc<FakeWeb>,
    pub failures: AtomicUsize,
}

#[async_trait]
impl BrowserLauncher for FlakyLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BrowserError::Launch("no display available".to_string()));
        }
        Ok(Arc::new(FakeBrowser {
            web: Arc::clone(&self.web),
        }))
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        Ok(Arc::new(FakeBrowser {
            web: Arc::clone(&self.web),
        }))
    }
}

struct FakeBrowser {
    web: Arc<FakeWeb>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        Ok(Box::new(FakePage {
            web: Arc::clone(&self.web),
            current: Mutex::new(None),
        }))
    }
}

struct FakePage {
    web: Arc<FakeWeb>,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _wait: LoadState, _timeout: Duration) -> Result<(), BrowserError> {
        self.web.visits.lock().unwrap().push(url.to_string());
        let now = self.web.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.web.peak.fetch_max(now, Ordering::SeqCst);
        if !self.web.latency.is_zero() {
            tokio::time::sleep(self.web.latency).await;
        }
        self.web.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.web.failing.contains(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        Ok(true)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let current = self.current.lock().unwrap().clone().ok_or(BrowserError::Closed)?;
        Ok(self.web.pages.get(&current).cloned().unwrap_or_default())
    }

    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value, BrowserError> {
        Err(BrowserError::Script("not supported".to_string()))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.current.lock().unwrap().clone().ok_or(BrowserError::Closed)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Search pages list detail links one per line. Detail pages hold
/// `title|price`, or `GONE` for a withdrawn listing.
pub struct FakeScraper {
    source: &'static str,
    settings: ScraperSettings,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self {
            source: SOURCE,
            settings: ScraperSettings {
                page_timeout: Duration::from_secs(2),
                selector_timeout: Duration::from_secs(1),
                ..ScraperSettings::default()
            },
        }
    }

    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    pub fn with_concurrency(mut self, search: usize, detail: usize) -> Self {
        self.settings.search_concurrency = search;
        self.settings.detail_concurrency = detail;
        self
    }
}

#[async_trait]
impl SiteScraper for FakeScraper {
    fn source(&self) -> &'static str {
        self.source
    }

    fn display_name(&self) -> &'static str {
        "Fake Agency"
    }

    fn base_url(&self) -> &'static str {
        "https://fake.test"
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        price_ranges
            .iter()
            .map(|r| SearchInput::new(search_url(*r), "La Abadía"))
            .collect()
    }

    async fn extract_links(&self, page: &dyn Page, search_url: &str) -> Result<Vec<String>, ScrapeError> {
        page.goto(search_url, LoadState::DomContentLoaded, self.settings.page_timeout)
            .await?;
        let body = page.content().await?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    async fn extract_details(
        &self,
        page: &dyn Page,
        link: &str,
        _neighborhood: &str,
    ) -> Result<Option<PropertyRecord>, ScrapeError> {
        page.goto(link, LoadState::DomContentLoaded, self.settings.page_timeout)
            .await?;
        let body = page.content().await?;
        if body.trim() == "GONE" {
            return Ok(None);
        }

        let (title, price) = body.split_once('|').unwrap_or((body.as_str(), ""));
        let mut record = PropertyRecord::new(self.source, link);
        record.title = title.to_string();
        record.price = price.trim().parse().ok();
        record.images = vec![format!("{link}/photo.jpg")];
        Ok(Some(record))
    }
}

/// A fresh SQLite file under the system temp dir.
pub fn temp_database_url() -> String {
    let path = std::env::temp_dir().join(format!("arriendos-test-{}.db", uuid::Uuid::new_v4()));
    format!("sqlite:{}?mode=rwc", path.display())
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = temp_database_url();
    config.general.max_db_connections = 2;
    config.general.min_db_connections = 1;
    config.scheduler.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

pub fn default_range() -> PriceRange {
    test_config().scraper.price_ranges[0]
}

pub async fn test_state(web: Arc<FakeWeb>) -> SharedState {
    let registry = ScraperRegistry::new(vec![Arc::new(FakeScraper::new())]);
    SharedState::with_parts(test_config(), Arc::new(FakeLauncher { web }), registry)
        .await
        .expect("Failed to create test state")
}
