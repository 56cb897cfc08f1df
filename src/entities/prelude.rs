pub use super::properties::Entity as Properties;
pub use super::scrape_runs::Entity as ScrapeRuns;
