//! Parsing of raw calendar rows into [`Auction`] records.

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use lotscout_shared::{Auction, LotScoutError, Result};

/// One row as returned by the calendar extraction script. Both fields may
/// be null when the row's cells lack the expected markup.
#[derive(Debug, Deserialize)]
struct CalendarRow {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

/// Convert the calendar script's JSON output into auctions.
///
/// Rows missing a time or a link, and rows whose link is not a valid URL,
/// are skipped. A payload that is not an array is a parse error: it means
/// the page structure changed underneath the script.
pub fn parse_calendar_rows(raw: &serde_json::Value) -> Result<Vec<Auction>> {
    let rows: Vec<CalendarRow> = serde_json::from_value(raw.clone())
        .map_err(|e| LotScoutError::parse(format!("calendar rows: {e}")))?;

    let mut auctions = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(time), Some(link)) = (row.time, row.link) else {
            debug!("calendar row missing time or link, skipping");
            continue;
        };

        let time = time.trim().to_string();
        if time.is_empty() {
            continue;
        }

        match Url::parse(&link) {
            Ok(link) => auctions.push(Auction { time, link }),
            Err(e) => warn!(link, error = %e, "calendar row has invalid link, skipping"),
        }
    }

    Ok(auctions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_rows() {
        let raw = serde_json::json!([
            {"time": " 9:00 AM CST ", "link": "https://www.iaai.com/Auction/123"},
        ]);
        let auctions = parse_calendar_rows(&raw).unwrap();
        assert_eq!(auctions.len(), 1);
        assert_eq!(auctions[0].time, "9:00 AM CST");
        assert_eq!(auctions[0].link.path(), "/Auction/123");
    }

    #[test]
    fn skips_incomplete_rows() {
        let raw = serde_json::json!([
            {"time": null, "link": "https://www.iaai.com/Auction/1"},
            {"time": "9:00 AM", "link": null},
            {"time": "10:00 AM", "link": "https://www.iaai.com/Auction/2"},
            {"time": "", "link": "https://www.iaai.com/Auction/3"},
        ]);
        let auctions = parse_calendar_rows(&raw).unwrap();
        assert_eq!(auctions.len(), 1);
        assert_eq!(auctions[0].time, "10:00 AM");
    }

    #[test]
    fn skips_invalid_links() {
        let raw = serde_json::json!([
            {"time": "9:00 AM", "link": "not a url"},
        ]);
        let auctions = parse_calendar_rows(&raw).unwrap();
        assert!(auctions.is_empty());
    }

    #[test]
    fn non_array_payload_is_parse_error() {
        let raw = serde_json::json!({"unexpected": "shape"});
        assert!(parse_calendar_rows(&raw).is_err());
    }
}
