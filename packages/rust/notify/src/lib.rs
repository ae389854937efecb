//! Buy-now digest delivery.
//!
//! The re-enrichment flow can hand its result to a [`Notifier`] instead of
//! persisting it. The production implementation posts a digest to a Telegram
//! chat via the Bot API; the API base is injectable so tests can run against
//! a mock server.

use async_trait::async_trait;
use tracing::info;

use lotscout_shared::{Lot, LotScoutError, Result};

/// Default Telegram Bot API endpoint.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Maximum number of lot links included in one digest message. Telegram
/// caps message text at 4096 characters.
const MAX_DIGEST_LINES: usize = 25;

/// Delivery seam for the re-enrichment flow.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a digest of the enriched lot set.
    async fn notify(&self, lots: &[Lot]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TelegramNotifier
// ---------------------------------------------------------------------------

/// Sends buy-now digests to a Telegram chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier for the given bot and chat.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();
        if bot_token.is_empty() {
            return Err(LotScoutError::config("telegram bot token is empty"));
        }
        if chat_id.is_empty() {
            return Err(LotScoutError::config("telegram chat id is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| LotScoutError::Notify(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Override the API base URL (for tests against a mock server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, lots: &[Lot]) -> Result<()> {
        let text = digest(lots);
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| LotScoutError::Notify(format!("sendMessage: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LotScoutError::Notify(format!(
                "sendMessage: HTTP {status}: {body}"
            )));
        }

        info!(chat_id = %self.chat_id, lots = lots.len(), "digest delivered");
        Ok(())
    }
}

/// Build the digest text: one line per buy-now lot, capped, with a trailing
/// overflow note when the cap is hit.
fn digest(lots: &[Lot]) -> String {
    let buy_now: Vec<&Lot> = lots
        .iter()
        .filter(|lot| lot.buy_now == Some(true))
        .collect();

    if buy_now.is_empty() {
        return "No buy-now lots found.".to_string();
    }

    let mut lines = vec![format!("{} buy-now lots:", buy_now.len())];
    for lot in buy_now.iter().take(MAX_DIGEST_LINES) {
        lines.push(format!(
            "{} {} {}",
            lot.model_year, lot.vin, lot.source_link
        ));
    }
    if buy_now.len() > MAX_DIGEST_LINES {
        lines.push(format!("… and {} more", buy_now.len() - MAX_DIGEST_LINES));
    }
    lines.join("\n")
}
