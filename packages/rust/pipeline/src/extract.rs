//! Lot extraction pool: auctions fan out to workers, lot batches fan in.
//!
//! Completion contract: every submitted auction yields exactly one result
//! batch (empty on failure), so the aggregating receive loop terminates
//! after `auctions.len()` batches without extra synchronization. The loop
//! also stops early if the results channel closes (every worker gone), so
//! it can never block indefinitely.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use url::Url;

use lotscout_extract::{PageExtractor, PageSession};
use lotscout_shared::{Auction, Lot, LotScoutError, Result};

use crate::{PoolOptions, Progress};

/// In-page script collecting raw lot rows from an auction results table.
/// Year filtering happens Rust-side, in [`parse_lot_rows`].
const LOTS_SCRIPT: &str = r#"(() => {
    const rows = [];
    document.querySelectorAll("tr").forEach(item => {
        const cells = item.querySelectorAll("td");
        if (!cells.length) {
            return;
        }
        const lotCell = cells[3] ? cells[3].querySelector("a") : null;
        const yearCell = cells[6];
        const vinCell = cells[11] ? cells[11].querySelector("a") : null;
        rows.push({
            lot: lotCell ? lotCell.href : null,
            year: yearCell ? yearCell.textContent.trim() : null,
            vin: vinCell ? vinCell.textContent : null,
        });
    });
    return rows;
})();"#;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Extract candidate lots from every auction's results page.
///
/// Per-auction failures are absorbed: a failed page yields an empty batch
/// and the pool continues. The returned collection is owned by this
/// function's receive loop for the whole run; workers only ever send.
pub async fn extract_lots(
    extractor: &Arc<dyn PageExtractor>,
    auctions: Vec<Auction>,
    opts: &PoolOptions,
    progress: &dyn Progress,
) -> Vec<Lot> {
    let count = auctions.len();
    if count == 0 {
        return Vec::new();
    }

    let worker_count = opts.worker_count.max(1);
    info!(auctions = count, workers = worker_count, "starting lot extraction pool");

    // Task channel sized to the exact task count: the fill loop below never
    // blocks, and dropping the sender is the no-more-work signal.
    let (task_tx, task_rx) = mpsc::channel::<Auction>(count);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (batch_tx, mut batch_rx) = mpsc::channel::<Vec<Lot>>(count);

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let extractor = Arc::clone(extractor);
        let tasks = Arc::clone(&task_rx);
        let results = batch_tx.clone();
        let min_model_year = opts.min_model_year;
        workers.push(tokio::spawn(async move {
            extract_worker(worker_id, extractor, tasks, results, min_model_year).await;
        }));
    }
    drop(batch_tx);

    for auction in auctions {
        if task_tx.send(auction).await.is_err() {
            break;
        }
    }
    drop(task_tx);

    // Aggregate: exactly one batch per auction, single writer.
    let mut lots = Vec::new();
    let mut received = 0usize;
    while received < count {
        match batch_rx.recv().await {
            Some(batch) => {
                received += 1;
                lots.extend(batch);
                progress.unit_done(received, count);
            }
            None => {
                warn!(
                    received,
                    expected = count,
                    "extraction results channel closed early"
                );
                break;
            }
        }
    }

    for worker in workers {
        let _ = worker.await;
    }

    info!(lots = lots.len(), batches = received, "lot extraction complete");
    lots
}

/// One pool worker: owns a single session for its whole task stream.
async fn extract_worker(
    worker_id: usize,
    extractor: Arc<dyn PageExtractor>,
    tasks: Arc<Mutex<mpsc::Receiver<Auction>>>,
    results: mpsc::Sender<Vec<Lot>>,
    min_model_year: u16,
) {
    let mut session = match extractor.open_session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(worker_id, error = %e, "failed to open session, worker exiting");
            return;
        }
    };

    loop {
        let auction = { tasks.lock().await.recv().await };
        let Some(auction) = auction else { break };

        let batch = extract_auction(session.as_mut(), &auction, min_model_year)
            .await
            .unwrap_or_else(|e| {
                warn!(auction = %auction.link, error = %e, "auction extraction failed");
                Vec::new()
            });

        if results.send(batch).await.is_err() {
            break;
        }
    }

    session.close().await;
    debug!(worker_id, "extraction worker done");
}

/// Fetch one auction's results page and parse its lot rows.
async fn extract_auction(
    session: &mut dyn PageSession,
    auction: &Auction,
    min_model_year: u16,
) -> Result<Vec<Lot>> {
    let raw = session.evaluate(&auction.link, LOTS_SCRIPT).await?;
    parse_lot_rows(&raw, min_model_year)
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// One row as returned by the lots script. The year arrives as page text.
#[derive(Debug, Deserialize)]
struct RawLotRow {
    #[serde(default)]
    lot: Option<String>,
    #[serde(default)]
    year: Option<serde_json::Value>,
    #[serde(default)]
    vin: Option<String>,
}

/// Parse raw lot rows, applying the model-year threshold exactly once.
///
/// Rows missing a link, with an unparseable year, or below the threshold
/// are skipped. A non-array payload is a parse error (page structure
/// changed).
pub(crate) fn parse_lot_rows(raw: &serde_json::Value, min_model_year: u16) -> Result<Vec<Lot>> {
    let rows: Vec<RawLotRow> = serde_json::from_value(raw.clone())
        .map_err(|e| LotScoutError::parse(format!("lot rows: {e}")))?;

    let mut lots = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(link) = row.lot else { continue };
        let Ok(source_link) = Url::parse(&link) else {
            debug!(link, "lot row has invalid link, skipping");
            continue;
        };
        let Some(model_year) = row.year.as_ref().and_then(parse_model_year) else {
            continue;
        };
        if model_year < min_model_year {
            continue;
        }

        lots.push(Lot::new(
            source_link,
            model_year,
            row.vin.unwrap_or_default().trim().to_string(),
        ));
    }

    Ok(lots)
}

/// The year cell may come back as text or, with some table skins, a number.
fn parse_model_year(value: &serde_json::Value) -> Option<u16> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    }
}
