//! Entry point for every scrape, whether it comes from the API, the CLI or
//! the scheduler.
//!
//! Sources scraped within the cooldown are answered from their last recorded
//! run. Stale sources go through the orchestrator, then the distance filter,
//! then storage, and finally get a fresh scrape-run record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::cache_gate::{CacheGate, GateDecision};
use super::orchestrator::{Orchestrator, SourceReport};
use crate::config::ScraperConfig;
use crate::db::{SaveSummary, Store};
use crate::domain::{Coordinates, PriceRange, SourceSelector};
use crate::extract::DistanceFilter;
use crate::scrapers::{ScraperRegistry, SiteScraper};

#[derive(Debug, Error)]
pub enum ScrapeRequestError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid price range: {0}")]
    InvalidPriceRange(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for ScrapeRequestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub source: SourceSelector,
    /// Skip the cooldown check.
    pub force: bool,
    /// Replaces the configured price ranges for this request.
    pub price_range: Option<PriceRange>,
}

/// What happened to one source during a request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Cached {
        source: String,
        last_run_at: DateTime<Utc>,
        summary: serde_json::Value,
    },
    Completed {
        source: String,
        found: u64,
        new_properties: u64,
        updated: u64,
        restored: u64,
        removed: u64,
        skipped: u64,
        search_failures: u64,
    },
    Failed {
        source: String,
        error: String,
    },
}

impl SourceOutcome {
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Cached { source, .. }
            | Self::Completed { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeOutcome {
    pub sources: Vec<SourceOutcome>,
    pub new_properties: u64,
    pub total_found: u64,
    /// Sources answered from their last run.
    pub cached: u64,
    pub failed: u64,
}

impl ScrapeOutcome {
    fn push(&mut self, outcome: SourceOutcome) {
        match &outcome {
            SourceOutcome::Cached { .. } => self.cached += 1,
            SourceOutcome::Completed {
                found,
                new_properties,
                ..
            } => {
                self.total_found += found;
                self.new_properties += new_properties;
            }
            SourceOutcome::Failed { .. } => self.failed += 1,
        }
        self.sources.push(outcome);
    }

    /// Every requested source was served from its last run.
    #[must_use]
    pub fn all_cached(&self) -> bool {
        !self.sources.is_empty() && to_u64(self.sources.len()) == self.cached
    }
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[derive(Clone)]
pub struct ScrapeService {
    store: Store,
    registry: ScraperRegistry,
    orchestrator: Orchestrator,
    gate: CacheGate,
    distance: DistanceFilter,
    price_ranges: Vec<PriceRange>,
}

impl ScrapeService {
    #[must_use]
    pub fn new(
        store: Store,
        registry: ScraperRegistry,
        orchestrator: Orchestrator,
        config: &ScraperConfig,
    ) -> Self {
        let cooldown = chrono::Duration::minutes(i64::from(config.cooldown_minutes));
        Self {
            gate: CacheGate::new(store.clone(), cooldown),
            distance: DistanceFilter::new(
                Coordinates::new(config.anchor_latitude, config.anchor_longitude),
                config.max_distance_km,
            ),
            price_ranges: config.price_ranges.clone(),
            store,
            registry,
            orchestrator,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ScraperRegistry {
        &self.registry
    }

    fn resolve(&self, selector: &SourceSelector) -> Result<Vec<Arc<dyn SiteScraper>>, ScrapeRequestError> {
        match selector {
            SourceSelector::All => Ok(self.registry.all().to_vec()),
            SourceSelector::One(slug) => self
                .registry
                .find(slug)
                .map(|s| vec![s])
                .ok_or_else(|| ScrapeRequestError::UnknownSource(slug.clone())),
        }
    }

    fn price_ranges(&self, request: &ScrapeRequest) -> Result<Vec<PriceRange>, ScrapeRequestError> {
        let ranges = request
            .price_range
            .map_or_else(|| self.price_ranges.clone(), |r| vec![r]);

        for range in &ranges {
            range
                .validate()
                .map_err(ScrapeRequestError::InvalidPriceRange)?;
        }
        Ok(ranges)
    }

    /// Checks the request without running it.
    pub fn validate(&self, request: &ScrapeRequest) -> Result<(), ScrapeRequestError> {
        self.resolve(&request.source)?;
        self.price_ranges(request)?;
        Ok(())
    }

    pub async fn run(&self, request: ScrapeRequest) -> Result<ScrapeOutcome, ScrapeRequestError> {
        let scrapers = self.resolve(&request.source)?;
        let price_ranges = self.price_ranges(&request)?;
        let now = Utc::now();

        info!(
            event = "scrape_requested",
            source = %request.source,
            force = request.force,
            "Scrape requested"
        );

        let mut outcome = ScrapeOutcome::default();
        let mut stale = Vec::new();

        for scraper in scrapers {
            match self.gate.check(scraper.source(), request.force, now).await? {
                GateDecision::Fresh {
                    last_run_at,
                    summary,
                } => {
                    info!(
                        event = "scrape_cache_hit",
                        source = scraper.source(),
                        last_run_at = %last_run_at,
                        "Source scraped recently, serving last run"
                    );
                    metrics::counter!("scrape_runs_total", "source" => scraper.source(), "status" => "cached")
                        .increment(1);
                    outcome.push(SourceOutcome::Cached {
                        source: scraper.source().to_string(),
                        last_run_at,
                        summary,
                    });
                }
                GateDecision::Stale => stale.push(scraper),
            }
        }

        if stale.is_empty() {
            return Ok(outcome);
        }

        let results = self.orchestrator.run_many(&stale, &price_ranges).await;
        for (source, result) in results {
            let source_outcome = match result {
                Ok(report) => self.persist(report).await,
                Err(e) => {
                    error!(event = "scrape_source_failed", source, error = %e, "Source could not be scraped");
                    Err(e.to_string())
                }
            };

            let source_outcome = source_outcome.unwrap_or_else(|error| {
                metrics::counter!("scrape_runs_total", "source" => source, "status" => "failed")
                    .increment(1);
                SourceOutcome::Failed {
                    source: source.to_string(),
                    error,
                }
            });
            outcome.push(source_outcome);
        }

        info!(
            event = "scrape_finished",
            new_properties = outcome.new_properties,
            total_found = outcome.total_found,
            cached = outcome.cached,
            failed = outcome.failed,
            "Scrape finished"
        );

        Ok(outcome)
    }

    /// Runs the scrape on its own task so that the caller going away does
    /// not cancel it halfway through saving.
    pub fn spawn(&self, request: ScrapeRequest) -> JoinHandle<Result<ScrapeOutcome, ScrapeRequestError>> {
        let service = self.clone();
        tokio::spawn(async move { service.run(request).await })
    }

    async fn persist(&self, mut report: SourceReport) -> Result<SourceOutcome, String> {
        let source = report.source.clone();

        let mut dropped = 0usize;
        for record in &mut report.records {
            if self.distance.apply(record) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(source = %source, dropped, "Discarded coordinates outside the search radius");
        }

        let harvested: HashSet<String> = report.links.iter().cloned().collect();
        let removed: HashSet<String> = report.removed_links.iter().cloned().collect();
        let saved: SaveSummary = self
            .store
            .save_batch(&source, &report.records, &harvested, &removed, report.complete())
            .await
            .map_err(|e| {
                error!(event = "scrape_save_failed", source = %source, error = %e, "Failed to save listings");
                e.to_string()
            })?;

        if saved.failed > 0 {
            warn!(
                source = %source,
                failed = saved.failed,
                "Some listings could not be saved, keeping unseen listings"
            );
        }
        if !report.complete() {
            warn!(
                source = %source,
                search_failures = report.search_failures,
                "Some search pages failed, keeping unseen listings"
            );
        }

        let mut summary = report.summary();
        summary["saved"] = serde_json::to_value(saved).unwrap_or_default();
        if let Err(e) = self
            .store
            .record_scrape_run(&source, Utc::now(), &summary)
            .await
        {
            error!(event = "scrape_run_record_failed", source = %source, error = %e, "Failed to record scrape run");
        }

        let labels = [("source", source.clone())];
        metrics::counter!("scrape_runs_total", "source" => source.clone(), "status" => "completed")
            .increment(1);
        metrics::counter!("scrape_properties_total", &labels).increment(to_u64(report.scraped));
        metrics::counter!("scrape_items_skipped_total", &labels)
            .increment(to_u64(report.skipped()));
        metrics::counter!("scrape_save_failures_total", &labels).increment(saved.failed);
        metrics::histogram!("scrape_duration_seconds", &labels)
            .record(report.duration.as_secs_f64());

        Ok(SourceOutcome::Completed {
            found: to_u64(report.scraped),
            new_properties: saved.inserted,
            updated: saved.updated,
            restored: saved.restored,
            removed: saved.deleted,
            skipped: to_u64(report.skipped()),
            search_failures: to_u64(report.search_failures),
            source,
        })
    }
}
