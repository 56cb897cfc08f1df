use std::sync::Arc;

use crate::browser::{BrowserLauncher, launcher_from_config};
use crate::config::Config;
use crate::db::Store;
use crate::scrapers::ScraperRegistry;
use crate::services::{Orchestrator, ScrapeService};

/// Long-lived handles shared by the API, the CLI and the scheduler.
#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub scrape: ScrapeService,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let launcher = launcher_from_config(&config.scraper)?;
        let registry = ScraperRegistry::from_config(&config.scraper);
        Self::with_parts(config, launcher, registry).await
    }

    /// Builds the state around an explicit browser backend and scraper set.
    pub async fn with_parts(
        config: Config,
        launcher: Arc<dyn BrowserLauncher>,
        registry: ScraperRegistry,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let scrape = ScrapeService::new(
            store.clone(),
            registry,
            Orchestrator::new(launcher),
            &config.scraper,
        );

        Ok(Self {
            config,
            store,
            scrape,
        })
    }
}
