//! Live-auction discovery from the listings calendar page.
//!
//! Discovery is the hard dependency of the full flow: if the calendar page
//! cannot be reached or its auctions section never renders within the
//! bounded wait, the error propagates and aborts the run. Per-row problems
//! (a calendar row missing its time or link) are skipped, never fatal.

mod parser;

use tracing::{info, instrument};
use url::Url;

use lotscout_extract::PageSession;
use lotscout_shared::{Auction, Result};

pub use parser::parse_calendar_rows;

/// Selector that marks the live-auctions section as rendered.
const CALENDAR_READY_SELECTOR: &str = "#dvListLiveAuctions";

/// In-page script collecting `(time, link)` pairs from the calendar table.
const CALENDAR_SCRIPT: &str = r#"(() => {
    const rows = [];
    document.querySelectorAll(".table-row-inner").forEach(item => {
        const cells = item.querySelectorAll(".table-cell");
        const time = cells[1] ? cells[1].querySelector("li") : null;
        const link = cells[4] ? cells[4].querySelector("a") : null;
        rows.push({
            time: time ? time.textContent : null,
            link: link ? link.href : null,
        });
    });
    return rows;
})();"#;

/// Fetch the calendar page and extract the list of live auctions.
///
/// Waits for the auctions section before evaluating the extraction script,
/// so a slow render is distinguished from a missing section only by the
/// session's wait bound.
#[instrument(skip_all, fields(calendar = %calendar_url))]
pub async fn discover_auctions(
    session: &mut dyn PageSession,
    calendar_url: &Url,
) -> Result<Vec<Auction>> {
    info!("discovering live auctions");

    session
        .wait_for(calendar_url, CALENDAR_READY_SELECTOR)
        .await?;

    let raw = session.evaluate(calendar_url, CALENDAR_SCRIPT).await?;
    let auctions = parse_calendar_rows(&raw)?;

    info!(count = auctions.len(), "auction discovery complete");
    Ok(auctions)
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use lotscout_shared::LotScoutError;

    /// Scripted session: serves a fixed calendar payload, records calls.
    struct FakeSession {
        payload: serde_json::Value,
        fail_wait: bool,
        waited_for: Vec<String>,
    }

    #[async_trait]
    impl PageSession for FakeSession {
        async fn wait_for(&mut self, _url: &Url, selector: &str) -> Result<()> {
            self.waited_for.push(selector.to_string());
            if self.fail_wait {
                return Err(LotScoutError::Evaluate("section never rendered".into()));
            }
            Ok(())
        }

        async fn evaluate(&mut self, _url: &Url, _script: &str) -> Result<serde_json::Value> {
            Ok(self.payload.clone())
        }

        async fn close(&mut self) {}
    }

    fn calendar_url() -> Url {
        Url::parse("https://www.iaai.com/LiveAuctionsCalendar").unwrap()
    }

    #[tokio::test]
    async fn discovers_auctions_after_readiness_wait() {
        let mut session = FakeSession {
            payload: serde_json::json!([
                {"time": "9:00 AM CST", "link": "https://www.iaai.com/Auction/1"},
                {"time": "10:30 AM CST", "link": "https://www.iaai.com/Auction/2"},
            ]),
            fail_wait: false,
            waited_for: vec![],
        };

        let auctions = discover_auctions(&mut session, &calendar_url())
            .await
            .unwrap();

        assert_eq!(auctions.len(), 2);
        assert_eq!(auctions[0].time, "9:00 AM CST");
        assert_eq!(session.waited_for, vec![CALENDAR_READY_SELECTOR.to_string()]);
    }

    #[tokio::test]
    async fn unrendered_section_is_fatal() {
        let mut session = FakeSession {
            payload: serde_json::json!([]),
            fail_wait: true,
            waited_for: vec![],
        };

        let err = discover_auctions(&mut session, &calendar_url())
            .await
            .unwrap_err();
        assert!(matches!(err, LotScoutError::Evaluate(_)));
    }
}
