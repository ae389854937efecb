//! Page extraction seam: browsing sessions and in-page script evaluation.
//!
//! The pipeline talks to the listings site exclusively through the
//! [`PageExtractor`] / [`PageSession`] traits. Extraction scripts are opaque
//! string parameters supplied by the callers; this crate only knows how to
//! run them in a page. The production implementation is
//! [`BrowserExtractor`], a headless Chromium driven over CDP. Tests elsewhere
//! in the workspace substitute scripted in-memory fakes.

mod browser;

use async_trait::async_trait;
use url::Url;

use lotscout_shared::Result;

pub use browser::{BrowserExtractor, BrowserOptions};

/// An owned browsing context bound to one worker's sequence of page visits.
///
/// A session is opened at worker start, used for every task that worker
/// pulls, and closed when the worker's task stream is exhausted or the run
/// is cancelled. Cancellation of the root token must cause in-flight calls
/// to fail fast rather than hang.
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url` and wait until an element matching `selector`
    /// is present. The wait is bounded; timing out is an error.
    async fn wait_for(&mut self, url: &Url, selector: &str) -> Result<()>;

    /// Navigate to `url` and evaluate `script` in the page, returning the
    /// script's JSON result.
    async fn evaluate(&mut self, url: &Url, script: &str) -> Result<serde_json::Value>;

    /// Release the session's resources. Safe to call on every exit path.
    async fn close(&mut self);
}

/// Factory for per-worker sessions, sharing one underlying browser.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Open a fresh session derived from the extractor's root context.
    async fn open_session(&self) -> Result<Box<dyn PageSession>>;
}
