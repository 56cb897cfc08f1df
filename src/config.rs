use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::browser::LoadState;
use crate::domain::PriceRange;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub scraper: ScraperConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/arriendos.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Directory holding the frontend (index.html plus assets).
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    Chrome,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Minutes a source stays fresh after a completed run.
    pub cooldown_minutes: u32,

    pub price_ranges: Vec<PriceRange>,

    pub browser_backend: BrowserBackend,

    pub headless: bool,

    pub user_agent: String,

    /// Extra wait after navigation when a page asks for network idle.
    pub network_idle_settle_ms: u64,

    pub max_images: usize,

    /// Lowercase substrings that disqualify an image URL on every site.
    pub image_exclusions: Vec<String>,

    /// Coordinates farther than this from the anchor are discarded.
    pub max_distance_km: f64,

    pub anchor_latitude: f64,

    pub anchor_longitude: f64,

    /// Keyed by source slug.
    pub overrides: HashMap<String, ScraperOverride>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 120,
            price_ranges: vec![PriceRange::new(2_500_000, 3_500_000)],
            browser_backend: BrowserBackend::Chrome,
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            network_idle_settle_ms: 1500,
            max_images: 15,
            image_exclusions: ["logo", "icon", "whatsapp", "facebook"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_distance_km: 10.0,
            anchor_latitude: 6.170_089,
            anchor_longitude: -75.587_481,
            overrides: HashMap::new(),
        }
    }
}

/// Per-source tuning. Unset fields keep the scraper's own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperOverride {
    pub enabled: Option<bool>,
    pub search_concurrency: Option<usize>,
    pub detail_concurrency: Option<usize>,
    pub page_timeout_seconds: Option<u64>,
    pub selector_timeout_seconds: Option<u64>,
    pub search_load_state: Option<LoadState>,
    pub detail_load_state: Option<LoadState>,
    /// Replaces the site's own image keywords; the global list still applies.
    pub image_exclusions: Option<Vec<String>>,
    pub max_images: Option<usize>,
    pub max_links: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub scrape_interval_minutes: u32,

    pub cron_expression: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scrape_interval_minutes: 180,
            cron_expression: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "arriendos".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("arriendos").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".arriendos").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scraper.price_ranges.is_empty() {
            anyhow::bail!("At least one price range must be configured");
        }

        for range in &self.scraper.price_ranges {
            range.validate().map_err(|e| anyhow::anyhow!(e))?;
        }

        if let Some(unknown) = self
            .scraper
            .overrides
            .keys()
            .find(|slug| !crate::scrapers::SOURCES.contains(&slug.as_str()))
        {
            anyhow::bail!("Unknown source in scraper.overrides: {unknown}");
        }

        if self.scraper.max_distance_km <= 0.0 {
            anyhow::bail!("scraper.max_distance_km must be positive");
        }

        if self.scheduler.enabled
            && self.scheduler.scrape_interval_minutes == 0
            && self.scheduler.cron_expression.is_none()
        {
            anyhow::bail!("Scheduler interval must be > 0 or cron expression must be set");
        }

        Ok(())
    }

    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.scraper.cooldown_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scraper.cooldown_minutes, 120);
        assert_eq!(config.scraper.max_images, 15);
        assert_eq!(
            config.scraper.price_ranges,
            vec![PriceRange::new(2_500_000, 3_500_000)]
        );
        assert!(config.scraper.image_exclusions.contains(&"logo".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[scraper]"));
        assert!(toml_str.contains("[scheduler]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [scraper]
            cooldown_minutes = 30
            browser_backend = "http"

            [scraper.overrides.proteger]
            detail_concurrency = 2
            detail_load_state = "network_idle"
            image_exclusions = ["banner"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.scraper.cooldown_minutes, 30);
        assert_eq!(config.scraper.browser_backend, BrowserBackend::Http);
        assert_eq!(
            config.scraper.overrides["proteger"].detail_concurrency,
            Some(2)
        );
        let proteger = &config.scraper.overrides["proteger"];
        assert_eq!(proteger.detail_load_state, Some(LoadState::NetworkIdle));
        assert_eq!(proteger.search_load_state, None);
        assert_eq!(proteger.image_exclusions, Some(vec!["banner".to_string()]));

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.scraper.max_images, 15);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = Config::default();
        config.scraper.price_ranges = vec![PriceRange::new(3_000_000, 1_000_000)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_override() {
        let mut config = Config::default();
        config
            .scraper
            .overrides
            .insert("fincaraiz".to_string(), ScraperOverride::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fincaraiz"));
    }
}
