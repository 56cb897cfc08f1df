use async_trait::async_trait;
use headless_chrome::{Browser as ChromeProcess, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Browser, BrowserError, BrowserLauncher, LoadState, Page};

/// Headless Chrome through the DevTools protocol.
///
/// `headless_chrome` is blocking, so every call is moved onto the blocking
/// pool. Network idle has no direct equivalent there and is approximated by
/// a settle delay after navigation finishes.
pub struct ChromeLauncher {
    headless: bool,
    user_agent: String,
    settle: Duration,
}

impl ChromeLauncher {
    #[must_use]
    pub const fn new(headless: bool, user_agent: String, settle: Duration) -> Self {
        Self {
            headless,
            user_agent,
            settle,
        }
    }
}

async fn blocking<T, F>(operation: &str, f: F) -> Result<T, BrowserError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Navigation {
            url: String::new(),
            reason: format!("{operation} task failed: {e}"),
        })?
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, BrowserError> {
        let headless = self.headless;

        let process = blocking("launch", move || {
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .idle_browser_timeout(Duration::from_secs(300))
                .build()
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            ChromeProcess::new(options).map_err(|e| BrowserError::Launch(e.to_string()))
        })
        .await?;

        info!(event = "browser_launched", headless, "Launched headless Chrome");

        Ok(Arc::new(ChromeBrowser {
            process: Arc::new(process),
            user_agent: self.user_agent.clone(),
            settle: self.settle,
        }))
    }
}

/// The Chrome process exits when the last handle is dropped.
struct ChromeBrowser {
    process: Arc<ChromeProcess>,
    user_agent: String,
    settle: Duration,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        let process = Arc::clone(&self.process);
        let user_agent = self.user_agent.clone();

        let tab = blocking("new_tab", move || {
            let tab = process
                .new_tab()
                .map_err(|e| BrowserError::Launch(e.to_string()))?;
            tab.set_user_agent(&user_agent, Some("es-CO,es;q=0.9"), None)
                .map_err(|e| BrowserError::Launch(e.to_string()))?;
            Ok(tab)
        })
        .await?;

        Ok(Box::new(ChromePage {
            tab,
            settle: self.settle,
        }))
    }
}

struct ChromePage {
    tab: Arc<Tab>,
    settle: Duration,
}

/// Wraps an expression so that its value comes back as a JSON string and
/// exceptions come back as data instead of protocol errors.
fn wrap_expression(expression: &str) -> String {
    format!(
        "(() => {{ try {{ const __v = ({expression}); \
         return JSON.stringify({{ ok: __v === undefined ? null : __v }}); }} \
         catch (e) {{ return JSON.stringify({{ error: String(e) }}); }} }})()"
    )
}

fn unwrap_evaluation(raw: Option<serde_json::Value>) -> Result<serde_json::Value, BrowserError> {
    let Some(serde_json::Value::String(encoded)) = raw else {
        return Err(BrowserError::Script("expression produced no value".into()));
    };

    let mut envelope: serde_json::Value =
        serde_json::from_str(&encoded).map_err(|e| BrowserError::Script(e.to_string()))?;

    if let Some(error) = envelope.get("error").and_then(|e| e.as_str()) {
        return Err(BrowserError::Script(error.to_string()));
    }

    Ok(envelope
        .get_mut("ok")
        .map(serde_json::Value::take)
        .unwrap_or_default())
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(
        &self,
        url: &str,
        wait: LoadState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let target = url.to_string();

        let navigation = blocking("navigate", move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target)
                .and_then(|t| t.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation {
                    url: target.clone(),
                    reason: e.to_string(),
                })
        });

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| BrowserError::timeout(format!("navigation to {url}"), timeout))??;

        if wait == LoadState::NetworkIdle {
            debug!(url, settle_ms = self.settle.as_millis(), "Waiting for network to settle");
            tokio::time::sleep(self.settle).await;
        }

        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let selector = selector.to_string();

        blocking("wait_for_selector", move || {
            Ok(tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .is_ok())
        })
        .await
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking("content", move || {
            tab.get_content().map_err(|e| BrowserError::Navigation {
                url: tab.get_url(),
                reason: e.to_string(),
            })
        })
        .await
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let wrapped = wrap_expression(expression);

        let raw = blocking("evaluate", move || {
            tab.evaluate(&wrapped, true)
                .map(|remote| remote.value)
                .map_err(|e| BrowserError::Navigation {
                    url: tab.get_url(),
                    reason: e.to_string(),
                })
        })
        .await?;

        unwrap_evaluation(raw)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.tab.get_url())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking("close", move || {
            tab.close(true)
                .map(|_| ())
                .map_err(|_| BrowserError::Closed)
        })
        .await
    }
}
