//! One scraper per agency behind a common capability interface.
//!
//! A scraper knows how to build search URLs, harvest detail links from a
//! results page and turn a detail page into a [`PropertyRecord`]. Shared
//! parsing (features, images, coordinates) comes from [`Extractors`]
//! injected at construction.

pub mod alberto_alvarez;
pub mod arrendamientos_envigado;
pub mod arrendamientos_las_vegas;
pub mod common;
pub mod escala_inmobiliaria;
pub mod livinmobiliaria;
pub mod proteger;
pub mod uribienes;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::browser::{BrowserError, LoadState, Page};
use crate::config::{ScraperConfig, ScraperOverride};
use crate::domain::{PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Unexpected page structure at {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Per-site tuning. Scrapers start from the defaults, apply their own
/// adjustments, then layer the user's config overrides on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperSettings {
    pub search_concurrency: usize,
    pub detail_concurrency: usize,
    pub page_timeout: Duration,
    pub selector_timeout: Duration,
    pub search_load_state: LoadState,
    pub detail_load_state: LoadState,
    /// Image keywords excluded on top of the global list.
    pub image_exclusions: Vec<String>,
    pub max_images: Option<usize>,
    /// Cap on detail pages visited per run.
    pub max_links: Option<usize>,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            search_concurrency: 5,
            detail_concurrency: 4,
            page_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(10),
            search_load_state: LoadState::DomContentLoaded,
            detail_load_state: LoadState::DomContentLoaded,
            image_exclusions: Vec::new(),
            max_images: None,
            max_links: None,
        }
    }
}

impl ScraperSettings {
    #[must_use]
    pub fn with_override(mut self, overrides: Option<&ScraperOverride>) -> Self {
        let Some(o) = overrides else {
            return self;
        };

        if let Some(n) = o.search_concurrency {
            self.search_concurrency = n.max(1);
        }
        if let Some(n) = o.detail_concurrency {
            self.detail_concurrency = n.max(1);
        }
        if let Some(secs) = o.page_timeout_seconds {
            self.page_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = o.selector_timeout_seconds {
            self.selector_timeout = Duration::from_secs(secs);
        }
        if let Some(state) = o.search_load_state {
            self.search_load_state = state;
        }
        if let Some(state) = o.detail_load_state {
            self.detail_load_state = state;
        }
        if let Some(exclusions) = &o.image_exclusions {
            self.image_exclusions.clone_from(exclusions);
        }
        if o.max_images.is_some() {
            self.max_images = o.max_images;
        }
        if o.max_links.is_some() {
            self.max_links = o.max_links;
        }
        self
    }

    /// Extractors with this site's image exclusions and cap applied.
    #[must_use]
    pub fn site_extractors(&self, shared: &Extractors) -> Extractors {
        Extractors {
            images: shared
                .images
                .with_overrides(&self.image_exclusions, self.max_images),
            ..shared.clone()
        }
    }
}

#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Stable slug stored with every record.
    fn source(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn base_url(&self) -> &'static str;

    fn settings(&self) -> &ScraperSettings;

    /// One entry per price range and neighborhood the site is searched for,
    /// labelled with the canonical neighborhood name.
    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput>;

    /// Absolute, de-duplicated detail links from one results page.
    async fn extract_links(
        &self,
        page: &dyn Page,
        search_url: &str,
    ) -> Result<Vec<String>, ScrapeError>;

    /// `Ok(None)` when the listing is gone or the page is not a listing.
    async fn extract_details(
        &self,
        page: &dyn Page,
        link: &str,
        neighborhood: &str,
    ) -> Result<Option<PropertyRecord>, ScrapeError>;
}

/// Slugs of every agency this build knows how to scrape.
pub const SOURCES: [&str; 7] = [
    arrendamientos_envigado::SOURCE,
    alberto_alvarez::SOURCE,
    uribienes::SOURCE,
    arrendamientos_las_vegas::SOURCE,
    proteger::SOURCE,
    escala_inmobiliaria::SOURCE,
    livinmobiliaria::SOURCE,
];

/// The scrapers enabled for this process, in a stable order.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: Vec<Arc<dyn SiteScraper>>,
}

impl ScraperRegistry {
    #[must_use]
    pub fn new(scrapers: Vec<Arc<dyn SiteScraper>>) -> Self {
        Self { scrapers }
    }

    #[must_use]
    pub fn from_config(config: &ScraperConfig) -> Self {
        let shared = Extractors::from_config(config);
        let enabled = |slug: &str| {
            config
                .overrides
                .get(slug)
                .and_then(|o| o.enabled)
                .unwrap_or(true)
        };
        let overrides = |slug: &str| config.overrides.get(slug);

        let all: Vec<Arc<dyn SiteScraper>> = vec![
            Arc::new(arrendamientos_envigado::ArrendamientosEnvigado::new(
                &shared,
                overrides(arrendamientos_envigado::SOURCE),
            )),
            Arc::new(alberto_alvarez::AlbertoAlvarez::new(
                &shared,
                overrides(alberto_alvarez::SOURCE),
            )),
            Arc::new(uribienes::Uribienes::new(&shared, overrides(uribienes::SOURCE))),
            Arc::new(arrendamientos_las_vegas::ArrendamientosLasVegas::new(
                &shared,
                overrides(arrendamientos_las_vegas::SOURCE),
            )),
            Arc::new(proteger::Proteger::new(&shared, overrides(proteger::SOURCE))),
            Arc::new(escala_inmobiliaria::EscalaInmobiliaria::new(
                &shared,
                overrides(escala_inmobiliaria::SOURCE),
            )),
            Arc::new(livinmobiliaria::Livinmobiliaria::new(
                &shared,
                overrides(livinmobiliaria::SOURCE),
            )),
        ];

        Self::new(all.into_iter().filter(|s| enabled(s.source())).collect())
    }

    #[must_use]
    pub fn all(&self) -> &[Arc<dyn SiteScraper>] {
        &self.scrapers
    }

    #[must_use]
    pub fn find(&self, slug: &str) -> Option<Arc<dyn SiteScraper>> {
        self.scrapers.iter().find(|s| s.source() == slug).cloned()
    }

    #[must_use]
    pub fn slugs(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.source()).collect()
    }
}
