use crate::domain::PropertyRecord;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::property::{
    MapPoint, Page, Property, PropertyFilter, SaveSummary, SortOrder, UpsertOutcome,
};
pub use repositories::scrape_run::ScrapeRun;

/// Fixed-width RFC 3339 so stored timestamps also sort as strings.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn property_repo(&self) -> repositories::property::PropertyRepository {
        repositories::property::PropertyRepository::new(self.conn.clone())
    }

    fn scrape_run_repo(&self) -> repositories::scrape_run::ScrapeRunRepository {
        repositories::scrape_run::ScrapeRunRepository::new(self.conn.clone())
    }

    pub async fn upsert_property(&self, record: &PropertyRecord) -> Result<UpsertOutcome> {
        self.property_repo().upsert(record, Utc::now()).await
    }

    pub async fn save_batch(
        &self,
        source: &str,
        records: &[PropertyRecord],
        harvested: &HashSet<String>,
        removed: &HashSet<String>,
        complete: bool,
    ) -> Result<SaveSummary> {
        self.property_repo()
            .save_batch(source, records, harvested, removed, complete, Utc::now())
            .await
    }

    pub async fn soft_delete_missing(
        &self,
        source: &str,
        seen_links: &HashSet<String>,
    ) -> Result<u64> {
        self.property_repo()
            .soft_delete_missing(source, seen_links, Utc::now())
            .await
    }

    pub async fn list_properties(
        &self,
        filter: &PropertyFilter,
        sort: SortOrder,
        page: Page,
    ) -> Result<Vec<Property>> {
        self.property_repo().list(filter, sort, page).await
    }

    pub async fn count_properties(&self, filter: &PropertyFilter) -> Result<u64> {
        self.property_repo().count(filter).await
    }

    pub async fn count_properties_for_source(&self, source: &str) -> Result<u64> {
        self.property_repo().count_by_source(source).await
    }

    pub async fn get_property(&self, id: i32) -> Result<Option<Property>> {
        self.property_repo().get(id).await
    }

    pub async fn list_distinct_locations(&self) -> Result<Vec<String>> {
        self.property_repo().distinct_locations().await
    }

    pub async fn list_map_points(&self) -> Result<Vec<MapPoint>> {
        self.property_repo().map_points().await
    }

    pub async fn get_scrape_run(&self, source: &str) -> Result<Option<ScrapeRun>> {
        self.scrape_run_repo().get(source).await
    }

    pub async fn record_scrape_run(
        &self,
        source: &str,
        at: DateTime<Utc>,
        summary: &serde_json::Value,
    ) -> Result<()> {
        self.scrape_run_repo().record(source, at, summary).await
    }

    pub async fn list_scrape_runs(&self) -> Result<Vec<ScrapeRun>> {
        self.scrape_run_repo().list().await
    }

    /// Wipes every listing and the scrape history, so the next scrape of
    /// every source runs fresh.
    pub async fn reset(&self) -> Result<(u64, u64)> {
        let properties = self.property_repo().delete_all().await?;
        let runs = self.scrape_run_repo().delete_all().await?;
        info!(event = "store_reset", properties, runs, "Store reset");
        Ok((properties, runs))
    }
}
