use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Browser, BrowserError, BrowserLauncher, Dom, LoadState, Page};

/// Static fetcher for sites that render listings on the server.
///
/// Pages share one cookie-aware client. There is no script engine, so
/// `evaluate` always reports a script error, which callers treat as
/// "value not present".
pub struct HttpLauncher {
    client: Client,
}

impl HttpLauncher {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserLauncher for HttpLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        Ok(Arc::new(HttpBrowser {
            client: self.client.clone(),
        }))
    }
}

struct HttpBrowser {
    client: Client,
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            document: RwLock::new(None),
        }))
    }
}

struct Document {
    url: String,
    html: String,
}

struct HttpPage {
    client: Client,
    document: RwLock<Option<Document>>,
}

#[async_trait]
impl Page for HttpPage {
    async fn goto(
        &self,
        url: &str,
        _wait: LoadState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let navigation_error = |e: reqwest::Error| {
            if e.is_timeout() {
                BrowserError::timeout(format!("navigation to {url}"), timeout)
            } else {
                BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(navigation_error)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let html = response.text().await.map_err(navigation_error)?;

        debug!(url, %status, bytes = html.len(), "Fetched page");

        // A 404 is still a loaded page; scrapers decide whether the listing is gone.
        if status.is_server_error() {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        *self.document.write().await = Some(Document {
            url: final_url,
            html,
        });
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let guard = self.document.read().await;
        let document = guard.as_ref().ok_or(BrowserError::Closed)?;
        Ok(Dom::parse(&document.html).exists(selector))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let guard = self.document.read().await;
        guard
            .as_ref()
            .map(|d| d.html.clone())
            .ok_or(BrowserError::Closed)
    }

    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value, BrowserError> {
        Err(BrowserError::Script(
            "script evaluation is not available without a browser engine".to_string(),
        ))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let guard = self.document.read().await;
        guard
            .as_ref()
            .map(|d| d.url.clone())
            .ok_or(BrowserError::Closed)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        *self.document.write().await = None;
        Ok(())
    }
}
