//! Pipeline controller: owns the stage wiring for both flows.
//!
//! The full flow discovers auctions, extracts lots, and replaces the stored
//! set. The refresh flow reloads the stored set, re-checks each lot's
//! buy-now offer, and either persists the surviving lots or hands them to a
//! notifier. Each run cancels the pipeline's token on the way out, which
//! tears down any browser sessions still racing on it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use url::Url;

use lotscout_discovery::discover_auctions;
use lotscout_extract::PageExtractor;
use lotscout_notify::Notifier;
use lotscout_shared::{Dispatch, Lot, LotScoutError, Result};
use lotscout_storage::Storage;

use crate::{PoolOptions, Progress, enrich::enrich_buy_now, extract::extract_lots};

/// Everything a [`Pipeline`] needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Live-auctions calendar page.
    pub calendar_url: Url,
    /// Sizing shared by both worker pools.
    pub pool: PoolOptions,
    /// Where the refresh flow sends its result.
    pub dispatch: Dispatch,
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Auctions discovered (full flow) or zero (refresh flow).
    pub auctions: usize,
    /// Lots entering the flow's main pool.
    pub lots_in: usize,
    /// Lots persisted or dispatched.
    pub lots_out: usize,
    pub elapsed: Duration,
}

/// Wires the extractor, storage, and notifier into the two run flows.
pub struct Pipeline {
    extractor: Arc<dyn PageExtractor>,
    storage: Storage,
    notifier: Option<Arc<dyn Notifier>>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        storage: Storage,
        options: PipelineOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            extractor,
            storage,
            notifier: None,
            options,
            cancel,
        }
    }

    /// Attach the notifier the telegram dispatch requires.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Cancel the pipeline's token. Idempotent; also invoked by both run
    /// flows on completion.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Full flow: discover, extract, replace the stored lot set.
    #[instrument(skip_all)]
    pub async fn run_parse(&self, progress: &dyn Progress) -> Result<RunSummary> {
        let started = Instant::now();
        let result = self.parse_flow(progress).await;
        self.cancel.cancel();

        let mut summary = result?;
        summary.elapsed = started.elapsed();
        progress.done(&summary);
        Ok(summary)
    }

    /// Refresh flow: reload stored lots, re-check buy-now, dispatch.
    #[instrument(skip_all)]
    pub async fn run_refresh(&self, progress: &dyn Progress) -> Result<RunSummary> {
        let started = Instant::now();
        let result = self.refresh_flow(progress).await;
        self.cancel.cancel();

        let mut summary = result?;
        summary.elapsed = started.elapsed();
        progress.done(&summary);
        Ok(summary)
    }

    async fn parse_flow(&self, progress: &dyn Progress) -> Result<RunSummary> {
        progress.stage("discovering auctions");
        let mut session = self.extractor.open_session().await?;
        let discovered = discover_auctions(session.as_mut(), &self.options.calendar_url).await;
        session.close().await;
        let auctions = discovered?;

        progress.stage("extracting lots");
        let lots =
            extract_lots(&self.extractor, auctions.clone(), &self.options.pool, progress).await;

        progress.stage("persisting lots");
        self.replace_lots(&lots).await?;

        Ok(RunSummary {
            auctions: auctions.len(),
            lots_in: auctions.len(),
            lots_out: lots.len(),
            elapsed: Duration::ZERO,
        })
    }

    async fn refresh_flow(&self, progress: &dyn Progress) -> Result<RunSummary> {
        progress.stage("loading stored lots");
        let stored = self.storage.load_lots().await?;
        if stored.is_empty() {
            info!("no stored lots, nothing to refresh");
            return Ok(RunSummary {
                auctions: 0,
                lots_in: 0,
                lots_out: 0,
                elapsed: Duration::ZERO,
            });
        }

        progress.stage("checking buy-now offers");
        let lots_in = stored.len();
        let enriched =
            enrich_buy_now(&self.extractor, stored, &self.options.pool, progress).await;

        match self.options.dispatch {
            Dispatch::Store => {
                progress.stage("persisting lots");
                self.replace_lots(&enriched).await?;
            }
            Dispatch::Telegram => {
                progress.stage("sending digest");
                let notifier = self.notifier.as_ref().ok_or_else(|| {
                    LotScoutError::config("telegram dispatch requires a configured notifier")
                })?;
                notifier.notify(&enriched).await?;
            }
        }

        Ok(RunSummary {
            auctions: 0,
            lots_in,
            lots_out: enriched.len(),
            elapsed: Duration::ZERO,
        })
    }

    /// Replace the stored lot set. Not atomic across the clear/insert pair.
    async fn replace_lots(&self, lots: &[Lot]) -> Result<()> {
        self.storage.clear_lots().await?;
        self.storage.insert_lots(lots).await?;
        info!(lots = lots.len(), "stored lot set replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use crate::SilentProgress;
    use crate::fake::{FakeExtractor, detail_text, lot_rows_json};

    const CALENDAR: &str = "https://www.iaai.com/LiveAuctionsCalendar";

    /// Notifier double recording every digest it receives.
    #[derive(Default)]
    struct RecordingNotifier {
        digests: Mutex<Vec<Vec<Lot>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, lots: &[Lot]) -> Result<()> {
            self.digests.lock().unwrap().push(lots.to_vec());
            Ok(())
        }
    }

    async fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(&dir.path().join("lots.db"))
            .await
            .expect("open storage");
        (dir, storage)
    }

    fn options(dispatch: Dispatch) -> PipelineOptions {
        PipelineOptions {
            calendar_url: Url::parse(CALENDAR).unwrap(),
            pool: PoolOptions {
                worker_count: 2,
                min_model_year: 2010,
            },
            dispatch,
        }
    }

    fn calendar_rows() -> serde_json::Value {
        serde_json::json!([
            {"time": "9:00 AM CST", "link": "https://www.iaai.com/Auction/1"},
            {"time": "1:00 PM CST", "link": "https://www.iaai.com/Auction/2"},
        ])
    }

    fn stored_lot(item: u32) -> Lot {
        Lot::new(
            Url::parse(&format!("https://www.iaai.com/Vehicle?itemid={item}")).unwrap(),
            2017,
            format!("VIN{item}"),
        )
    }

    #[tokio::test]
    async fn parse_flow_persists_extracted_lots() {
        let fake = FakeExtractor::new()
            .respond(CALENDAR, calendar_rows())
            .respond("https://www.iaai.com/Auction/1", lot_rows_json(&[(1, 2015), (2, 2019)]))
            .respond("https://www.iaai.com/Auction/2", lot_rows_json(&[(3, 2021)]));
        let (_dir, storage) = temp_storage().await;

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Store),
            CancellationToken::new(),
        );

        let summary = pipeline.run_parse(&SilentProgress).await.unwrap();

        assert_eq!(summary.auctions, 2);
        assert_eq!(summary.lots_out, 3);
        assert_eq!(pipeline.storage.count_lots().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn parse_flow_replaces_previous_lot_set() {
        let fake = FakeExtractor::new()
            .respond(CALENDAR, calendar_rows())
            .respond("https://www.iaai.com/Auction/1", lot_rows_json(&[(10, 2018)]))
            .fail("https://www.iaai.com/Auction/2");
        let (_dir, storage) = temp_storage().await;
        storage
            .insert_lots(&[stored_lot(1), stored_lot(2)])
            .await
            .unwrap();

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Store),
            CancellationToken::new(),
        );
        pipeline.run_parse(&SilentProgress).await.unwrap();

        let loaded = pipeline.storage.load_lots().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].source_link.as_str().ends_with("itemid=10"));
    }

    #[tokio::test]
    async fn failed_discovery_aborts_and_leaves_store_untouched() {
        let fake = FakeExtractor::new().fail(CALENDAR);
        let (_dir, storage) = temp_storage().await;
        storage.insert_lots(&[stored_lot(1)]).await.unwrap();

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Store),
            CancellationToken::new(),
        );

        assert!(pipeline.run_parse(&SilentProgress).await.is_err());
        assert_eq!(pipeline.storage.count_lots().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn refresh_on_empty_store_short_circuits() {
        let fake = Arc::new(FakeExtractor::new());
        let (_dir, storage) = temp_storage().await;
        let notifier = Arc::new(RecordingNotifier::default());

        let pipeline = Pipeline::new(
            fake.clone(),
            storage,
            options(Dispatch::Telegram),
            CancellationToken::new(),
        )
        .with_notifier(notifier.clone());

        let summary = pipeline.run_refresh(&SilentProgress).await.unwrap();

        assert_eq!(summary.lots_in, 0);
        assert_eq!(fake.sessions_opened.load(Ordering::SeqCst), 0);
        assert!(notifier.digests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_store_dispatch_replaces_with_enriched_set() {
        let fake = FakeExtractor::new()
            .respond("https://www.iaai.com/Vehicle?itemid=1", detail_text(true))
            .fail("https://www.iaai.com/Vehicle?itemid=2");
        let (_dir, storage) = temp_storage().await;
        storage
            .insert_lots(&[stored_lot(1), stored_lot(2)])
            .await
            .unwrap();

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Store),
            CancellationToken::new(),
        );
        let summary = pipeline.run_refresh(&SilentProgress).await.unwrap();

        assert_eq!(summary.lots_in, 2);
        assert_eq!(summary.lots_out, 1);
        let loaded = pipeline.storage.load_lots().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].buy_now, Some(true));
    }

    #[tokio::test]
    async fn refresh_telegram_dispatch_notifies_without_persisting() {
        let fake = FakeExtractor::new()
            .respond("https://www.iaai.com/Vehicle?itemid=1", detail_text(true));
        let (_dir, storage) = temp_storage().await;
        storage.insert_lots(&[stored_lot(1)]).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Telegram),
            CancellationToken::new(),
        )
        .with_notifier(notifier.clone());

        pipeline.run_refresh(&SilentProgress).await.unwrap();

        let digests = notifier.digests.lock().unwrap();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0][0].buy_now, Some(true));
        // Telegram dispatch leaves the stored set as it was.
        drop(digests);
        let loaded = pipeline.storage.load_lots().await.unwrap();
        assert_eq!(loaded[0].buy_now, None);
    }

    #[tokio::test]
    async fn telegram_dispatch_without_notifier_is_a_config_error() {
        let fake = FakeExtractor::new()
            .respond("https://www.iaai.com/Vehicle?itemid=1", detail_text(false));
        let (_dir, storage) = temp_storage().await;
        storage.insert_lots(&[stored_lot(1)]).await.unwrap();

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Telegram),
            CancellationToken::new(),
        );

        let err = pipeline.run_refresh(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, LotScoutError::Config { .. }));
    }

    #[tokio::test]
    async fn run_cancels_token_and_shutdown_is_idempotent() {
        let fake = FakeExtractor::new()
            .respond(CALENDAR, serde_json::json!([]));
        let (_dir, storage) = temp_storage().await;
        let cancel = CancellationToken::new();

        let pipeline = Pipeline::new(
            Arc::new(fake),
            storage,
            options(Dispatch::Store),
            cancel.clone(),
        );

        pipeline.run_parse(&SilentProgress).await.unwrap();
        assert!(cancel.is_cancelled());

        pipeline.shutdown();
        pipeline.shutdown();
        assert!(cancel.is_cancelled());
    }
}
