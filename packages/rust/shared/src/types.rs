//! Core domain types for LotScout auction scraping.

use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// Auction
// ---------------------------------------------------------------------------

/// A scheduled live auction discovered on the calendar page.
///
/// Produced once by discovery, consumed exactly once by the lot
/// extraction pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    /// Scheduled start time as displayed on the calendar.
    pub time: String,
    /// Link to the auction's results page.
    pub link: Url,
}

// ---------------------------------------------------------------------------
// Lot
// ---------------------------------------------------------------------------

/// A single vehicle listing extracted from an auction results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Link to the lot's detail page.
    pub source_link: Url,
    /// Vehicle model year.
    pub model_year: u16,
    /// Vehicle identification number (may be empty when the listing
    /// does not expose one).
    #[serde(default)]
    pub vin: String,
    /// Whether a buy-now offer is active. `None` until the lot has been
    /// through the enrichment pool or loaded with a stored flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_now: Option<bool>,
}

impl Lot {
    /// Create a freshly extracted lot with no buy-now determination yet.
    pub fn new(source_link: Url, model_year: u16, vin: impl Into<String>) -> Self {
        Self {
            source_link,
            model_year,
            vin: vin.into(),
            buy_now: None,
        }
    }
}
