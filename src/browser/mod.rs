//! Browser capability used by the scrapers.
//!
//! The core only needs to navigate, wait for a selector, read the rendered
//! HTML and evaluate small scripts. Two backends implement it: headless
//! Chrome for script-heavy agency sites and a plain HTTP fetcher for sites
//! that render server side.

pub mod chrome;
pub mod dom;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use chrome::ChromeLauncher;
pub use dom::Dom;
pub use http::HttpLauncher;

use crate::config::{BrowserBackend, ScraperConfig};

/// How long navigation waits before the page counts as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    DomContentLoaded,
    /// For listings rendered by delayed script execution.
    NetworkIdle,
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Page is closed or was never opened")]
    Closed,
}

impl BrowserError {
    /// Script errors mean "the page has no such data"; everything else is a
    /// failure to talk to the page at all.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        !matches!(self, Self::Script(_))
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, wait: LoadState, timeout: Duration)
    -> Result<(), BrowserError>;

    /// `Ok(false)` when the selector never appeared within `timeout`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
    -> Result<bool, BrowserError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, BrowserError>;

    /// Evaluates a JavaScript expression and returns its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;

    /// Visible text of the document body.
    async fn body_text(&self) -> Result<String, BrowserError> {
        let html = self.content().await?;
        Ok(Dom::parse(&html).body_text())
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError>;
}

/// Builds the launcher selected by `scraper.browser_backend`.
pub fn launcher_from_config(config: &ScraperConfig) -> anyhow::Result<Arc<dyn BrowserLauncher>> {
    let settle = Duration::from_millis(config.network_idle_settle_ms);

    let launcher: Arc<dyn BrowserLauncher> = match config.browser_backend {
        BrowserBackend::Chrome => Arc::new(ChromeLauncher::new(
            config.headless,
            config.user_agent.clone(),
            settle,
        )),
        BrowserBackend::Http => Arc::new(HttpLauncher::new(&config.user_agent)?),
    };

    Ok(launcher)
}
