//! Headless Chromium implementation of the page extraction seam.
//!
//! One [`BrowserExtractor`] owns the browser process and its CDP event
//! handler task; each [`PageSession`] it opens wraps one page (tab) and a
//! child cancellation token derived from the root token. Cancelling the root
//! makes every in-flight navigation or evaluation fail fast with
//! [`LotScoutError::Cancelled`].

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use lotscout_shared::{LotScoutError, Result};

use crate::{PageExtractor, PageSession};

/// Poll interval for bounded readiness waits.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Options for launching the headless browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Upper bound for navigation, readiness waits, and evaluations.
    pub wait_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// BrowserExtractor
// ---------------------------------------------------------------------------

/// Chromium-backed extractor. Sessions opened from it are independent tabs
/// sharing the one browser process.
pub struct BrowserExtractor {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    cancel: CancellationToken,
    wait_timeout: Duration,
}

impl BrowserExtractor {
    /// Launch a headless browser. `cancel` is the root token for the run;
    /// every session derives a child token from it.
    pub async fn launch(opts: &BrowserOptions, cancel: CancellationToken) -> Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(LotScoutError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LotScoutError::Browser(format!("failed to launch browser: {e}")))?;

        // The CDP event stream must be polled for the browser to make
        // progress; it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            cancel,
            wait_timeout: opts.wait_timeout,
        })
    }

    /// Close the browser process and stop the event handler task.
    /// Safe to call after the root token has been cancelled.
    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser close failed");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "browser process wait failed");
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl PageExtractor for BrowserExtractor {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        let cancel = self.cancel.child_token();
        if cancel.is_cancelled() {
            return Err(LotScoutError::Cancelled);
        }

        let page = {
            let browser = self.browser.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return Err(LotScoutError::Cancelled),
                page = browser.new_page("about:blank") => {
                    page.map_err(|e| LotScoutError::Browser(format!("failed to open page: {e}")))?
                }
            }
        };

        Ok(Box::new(BrowserSession {
            page: Some(page),
            cancel,
            wait_timeout: self.wait_timeout,
        }))
    }
}

// ---------------------------------------------------------------------------
// BrowserSession
// ---------------------------------------------------------------------------

/// One tab plus its child cancellation token.
struct BrowserSession {
    /// `None` once the session has been closed.
    page: Option<Page>,
    cancel: CancellationToken,
    wait_timeout: Duration,
}

impl BrowserSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| LotScoutError::Browser("session already closed".into()))
    }

    /// Race a future against the child token and the wait timeout.
    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LotScoutError::Cancelled),
            result = tokio::time::timeout(self.wait_timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(LotScoutError::Evaluate(format!(
                    "{what} timed out after {:?}",
                    self.wait_timeout
                ))),
            },
        }
    }

    async fn goto(&self, url: &Url) -> Result<()> {
        let page = self.page()?;
        self.bounded("navigation", async {
            page.goto(url.as_str())
                .await
                .map_err(|e| LotScoutError::Evaluate(format!("{url}: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| LotScoutError::Evaluate(format!("{url}: {e}")))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PageSession for BrowserSession {
    async fn wait_for(&mut self, url: &Url, selector: &str) -> Result<()> {
        self.goto(url).await?;
        let page = self.page()?;

        self.bounded("readiness wait", async {
            loop {
                if page.find_element(selector).await.is_ok() {
                    return Ok(());
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        })
        .await
    }

    async fn evaluate(&mut self, url: &Url, script: &str) -> Result<serde_json::Value> {
        self.goto(url).await?;
        let page = self.page()?;

        self.bounded("evaluation", async {
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| LotScoutError::Evaluate(format!("{url}: {e}")))?;
            result
                .into_value::<serde_json::Value>()
                .map_err(|e| LotScoutError::Evaluate(format!("{url}: bad result: {e}")))
        })
        .await
    }

    async fn close(&mut self) {
        // Explicit close releases the CDP target; without it tabs leak
        // until the browser process exits.
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "page close failed");
            }
        }
    }
}
