//! Drives site scrapers through their two stages.
//!
//! For one source: every search input is opened to harvest detail links
//! (bounded by the site's search concurrency), links are de-duplicated and
//! capped, then every detail page is scraped (bounded by the site's detail
//! concurrency). A failure on one page never aborts the rest of the pass.

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserError, BrowserLauncher};
use crate::domain::{Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::scrapers::{ScrapeError, ScraperSettings, SiteScraper};

/// Outcome of one pass over one source.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub source: String,
    pub records: Vec<PropertyRecord>,
    /// Every detail link harvested, before `max_links` is applied.
    pub links: Vec<String>,
    pub search_inputs: usize,
    pub search_failures: usize,
    pub scraped: usize,
    /// Detail pages that errored or timed out.
    pub failed: usize,
    /// Detail pages that were not (or no longer) a listing.
    pub missing: usize,
    /// Links behind the `missing` pages; their stored rows are retired.
    pub removed_links: Vec<String>,
    pub duration: Duration,
}

impl SourceReport {
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.failed + self.missing
    }

    /// Every search page loaded, so links not seen are really gone.
    #[must_use]
    pub const fn complete(&self) -> bool {
        self.search_failures == 0
    }

    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.source,
            "search_inputs": self.search_inputs,
            "search_failures": self.search_failures,
            "links_found": self.links.len(),
            "scraped": self.scraped,
            "failed": self.failed,
            "missing": self.missing,
            "skipped": self.skipped(),
            "complete": self.complete(),
            "duration_ms": u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Wall-clock budget for one page task: navigation, selector wait and any
/// script evaluation that follows.
fn operation_budget(settings: &ScraperSettings) -> Duration {
    settings.page_timeout * 2 + settings.selector_timeout
}

#[derive(Clone)]
pub struct Orchestrator {
    launcher: Arc<dyn BrowserLauncher>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    /// Runs every scraper concurrently, each with its own browser and pools.
    pub async fn run_many(
        &self,
        scrapers: &[Arc<dyn SiteScraper>],
        price_ranges: &[PriceRange],
    ) -> Vec<(&'static str, Result<SourceReport, BrowserError>)> {
        join_all(scrapers.iter().map(|scraper| async move {
            let source = scraper.source();
            (source, self.run_source(scraper.as_ref(), price_ranges).await)
        }))
        .await
    }

    /// Fails only when the browser cannot be launched.
    pub async fn run_source(
        &self,
        scraper: &dyn SiteScraper,
        price_ranges: &[PriceRange],
    ) -> Result<SourceReport, BrowserError> {
        let start = Instant::now();
        let source = scraper.source();
        let settings = scraper.settings();
        let budget = operation_budget(settings);
        let inputs = scraper.search_inputs(price_ranges);

        info!(
            event = "scrape_source_started",
            source,
            search_inputs = inputs.len(),
            "Scraping source"
        );

        let browser = self.launcher.launch().await?;

        // `buffered` keeps input order so the first neighborhood to list a
        // link is the one it gets labelled with.
        let harvested: Vec<Result<Vec<String>, ScrapeError>> = stream::iter(inputs.clone())
            .map(|input| {
                let browser = Arc::clone(&browser);
                async move { harvest(browser.as_ref(), scraper, &input, budget).await }
            })
            .buffered(settings.search_concurrency.max(1))
            .collect()
            .await;

        let mut report = SourceReport {
            source: source.to_string(),
            search_inputs: inputs.len(),
            ..SourceReport::default()
        };

        let mut seen = HashSet::new();
        let mut targets: Vec<(String, String)> = Vec::new();
        for (input, result) in inputs.iter().zip(harvested) {
            match result {
                Ok(links) => {
                    debug!(source, neighborhood = %input.neighborhood, links = links.len(), "Harvested links");
                    for link in links {
                        if seen.insert(link.clone()) {
                            report.links.push(link.clone());
                            targets.push((link, input.neighborhood.clone()));
                        }
                    }
                }
                Err(e) => {
                    report.search_failures += 1;
                    warn!(event = "search_failed", source, url = %input.url, error = %e, "Search page failed");
                }
            }
        }

        if let Some(cap) = settings.max_links {
            targets.truncate(cap);
        }

        let details: Vec<(String, Result<Option<PropertyRecord>, ScrapeError>)> =
            stream::iter(targets)
                .map(|(link, neighborhood)| {
                    let browser = Arc::clone(&browser);
                    async move {
                        let result =
                            detail(browser.as_ref(), scraper, &link, &neighborhood, budget).await;
                        let result =
                            result.map(|r| r.map(|rec| finalize(rec, source, &link, &neighborhood)));
                        (link, result)
                    }
                })
                .buffer_unordered(settings.detail_concurrency.max(1))
                .collect()
                .await;

        for (link, result) in details {
            match result {
                Ok(Some(record)) => {
                    report.scraped += 1;
                    report.records.push(record);
                }
                Ok(None) => {
                    report.missing += 1;
                    debug!(source, link = %link, "Detail page is not a listing");
                    report.removed_links.push(link);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(event = "detail_failed", source, link = %link, error = %e, "Detail page failed");
                }
            }
        }

        report.duration = start.elapsed();
        info!(
            event = "scrape_source_finished",
            source,
            links = report.links.len(),
            scraped = report.scraped,
            skipped = report.skipped(),
            search_failures = report.search_failures,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Source scraped"
        );

        Ok(report)
    }
}

async fn harvest(
    browser: &dyn Browser,
    scraper: &dyn SiteScraper,
    input: &SearchInput,
    budget: Duration,
) -> Result<Vec<String>, ScrapeError> {
    let page = browser.new_page().await?;
    let result = tokio::time::timeout(budget, scraper.extract_links(page.as_ref(), &input.url))
        .await
        .unwrap_or_else(|_| Err(BrowserError::timeout("extract_links", budget).into()));

    if let Err(e) = page.close().await {
        debug!(error = %e, "Failed to close page");
    }
    result
}

async fn detail(
    browser: &dyn Browser,
    scraper: &dyn SiteScraper,
    link: &str,
    neighborhood: &str,
    budget: Duration,
) -> Result<Option<PropertyRecord>, ScrapeError> {
    let page = browser.new_page().await?;
    let result = tokio::time::timeout(
        budget,
        scraper.extract_details(page.as_ref(), link, neighborhood),
    )
    .await
    .unwrap_or_else(|_| Err(BrowserError::timeout("extract_details", budget).into()));

    if let Err(e) = page.close().await {
        debug!(error = %e, "Failed to close page");
    }
    result
}

/// Pins the record to the source and link it was scraped from and
/// normalizes the neighborhood label.
fn finalize(
    mut record: PropertyRecord,
    source: &str,
    link: &str,
    neighborhood: &str,
) -> PropertyRecord {
    record.source = source.to_string();
    record.link = link.to_string();

    let location = if record.location.trim().is_empty() {
        neighborhood
    } else {
        record.location.as_str()
    };
    record.location = Neighborhood::label(location);

    let mut unique = HashSet::new();
    record
        .images
        .retain(|url| !url.is_empty() && unique.insert(url.clone()));

    record
}
