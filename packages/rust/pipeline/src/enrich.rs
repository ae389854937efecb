//! Buy-now enrichment pool: lots fan out to workers, surviving lots fan in.
//!
//! Completion contract (drop-on-failure): workers send only successfully
//! checked lots; a lot whose detail page fails or lacks the buy-now
//! indicator is logged and dropped. Every worker holds a clone of the
//! results sender, so once all workers drain the task channel and return,
//! the results channel closes and the aggregating loop terminates. The
//! postcondition is `enriched ⊆ input`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use lotscout_extract::{PageExtractor, PageSession};
use lotscout_shared::{Lot, LotScoutError, Result};

use crate::{PoolOptions, Progress};

/// In-page script returning the product details blob the site embeds on
/// every lot detail page. The indicator itself is matched Rust-side.
const DETAIL_TEXT_SCRIPT: &str = r##"(() => {
    const el = document.querySelector("#ProductDetailsVM");
    return el ? el.textContent : "";
})();"##;

/// Matches the buy-now indicator inside the embedded product JSON.
static BUY_NOW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""BuyNowInd":(\w+),"#).expect("buy-now regex"));

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Revisit each lot's detail page and set its buy-now flag.
///
/// Lots whose check fails are dropped; lots whose check succeeds are kept
/// with `buy_now = Some(flag)`, whether the offer is active or not.
pub async fn enrich_buy_now(
    extractor: &Arc<dyn PageExtractor>,
    lots: Vec<Lot>,
    opts: &PoolOptions,
    progress: &dyn Progress,
) -> Vec<Lot> {
    let count = lots.len();
    if count == 0 {
        return Vec::new();
    }

    let worker_count = opts.worker_count.max(1);
    info!(lots = count, workers = worker_count, "starting buy-now enrichment pool");

    let (task_tx, task_rx) = mpsc::channel::<Lot>(count);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<Lot>(count);

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let extractor = Arc::clone(extractor);
        let tasks = Arc::clone(&task_rx);
        let results = result_tx.clone();
        workers.push(tokio::spawn(async move {
            enrich_worker(worker_id, extractor, tasks, results).await;
        }));
    }
    // The workers' sender clones are now the only ones; the results channel
    // closes when the last worker returns.
    drop(result_tx);

    for lot in lots {
        if task_tx.send(lot).await.is_err() {
            break;
        }
    }
    drop(task_tx);

    // Aggregate until channel closure; dropped lots simply never arrive.
    let mut kept = Vec::with_capacity(count);
    while let Some(lot) = result_rx.recv().await {
        kept.push(lot);
        progress.unit_done(kept.len(), count);
    }

    for worker in workers {
        let _ = worker.await;
    }

    info!(
        kept = kept.len(),
        dropped = count - kept.len(),
        "buy-now enrichment complete"
    );
    kept
}

/// One pool worker: owns a single session for its whole task stream.
async fn enrich_worker(
    worker_id: usize,
    extractor: Arc<dyn PageExtractor>,
    tasks: Arc<Mutex<mpsc::Receiver<Lot>>>,
    results: mpsc::Sender<Lot>,
) {
    let mut session = match extractor.open_session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(worker_id, error = %e, "failed to open session, worker exiting");
            return;
        }
    };

    loop {
        let lot = { tasks.lock().await.recv().await };
        let Some(mut lot) = lot else { break };

        match check_buy_now(session.as_mut(), &lot).await {
            Ok(flag) => {
                lot.buy_now = Some(flag);
                if results.send(lot).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(lot = %lot.source_link, error = %e, "buy-now check failed, lot dropped");
            }
        }
    }

    session.close().await;
    debug!(worker_id, "enrichment worker done");
}

/// Evaluate the detail page and extract the buy-now indicator.
async fn check_buy_now(session: &mut dyn PageSession, lot: &Lot) -> Result<bool> {
    let raw = session.evaluate(&lot.source_link, DETAIL_TEXT_SCRIPT).await?;
    let text = raw
        .as_str()
        .ok_or_else(|| LotScoutError::parse("detail script did not return text"))?;
    parse_buy_now(text)
}

/// Extract the buy-now flag from the product details text.
fn parse_buy_now(text: &str) -> Result<bool> {
    let captures = BUY_NOW_RE
        .captures(text)
        .ok_or_else(|| LotScoutError::parse("buy-now indicator not present"))?;

    match &captures[1] {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(LotScoutError::parse(format!(
            "unexpected buy-now indicator: {other}"
        ))),
    }
}
