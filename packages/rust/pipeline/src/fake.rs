//! In-memory [`PageExtractor`] double for pool and controller tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use url::Url;

use lotscout_extract::{PageExtractor, PageSession};
use lotscout_shared::{LotScoutError, Result};

use crate::{Progress, controller::RunSummary};

/// Scripted extractor: maps page URLs to canned evaluate results.
pub(crate) struct FakeExtractor {
    responses: Arc<HashMap<String, serde_json::Value>>,
    failures: Arc<HashSet<String>>,
    fail_sessions: bool,
    pub(crate) sessions_opened: AtomicUsize,
    pub(crate) sessions_closed: Arc<AtomicUsize>,
}

impl FakeExtractor {
    pub(crate) fn new() -> Self {
        Self {
            responses: Arc::new(HashMap::new()),
            failures: Arc::new(HashSet::new()),
            fail_sessions: false,
            sessions_opened: AtomicUsize::new(0),
            sessions_closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pages at `url` evaluate to `value`.
    pub(crate) fn respond(mut self, url: &str, value: serde_json::Value) -> Self {
        Arc::get_mut(&mut self.responses)
            .expect("respond() before sharing")
            .insert(url.to_string(), value);
        self
    }

    /// Pages at `url` fail every session call.
    pub(crate) fn fail(mut self, url: &str) -> Self {
        Arc::get_mut(&mut self.failures)
            .expect("fail() before sharing")
            .insert(url.to_string());
        self
    }

    /// Every `open_session` call fails.
    pub(crate) fn fail_sessions(mut self) -> Self {
        self.fail_sessions = true;
        self
    }
}

#[async_trait]
impl PageExtractor for FakeExtractor {
    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        if self.fail_sessions {
            return Err(LotScoutError::Browser("session refused".to_string()));
        }
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            responses: Arc::clone(&self.responses),
            failures: Arc::clone(&self.failures),
            closed: Arc::clone(&self.sessions_closed),
        }))
    }
}

struct FakeSession {
    responses: Arc<HashMap<String, serde_json::Value>>,
    failures: Arc<HashSet<String>>,
    closed: Arc<AtomicUsize>,
}

impl FakeSession {
    fn lookup(&self, url: &Url) -> Result<serde_json::Value> {
        let key = url.as_str();
        if self.failures.contains(key) {
            return Err(LotScoutError::Evaluate(format!("scripted failure: {key}")));
        }
        self.responses
            .get(key)
            .cloned()
            .ok_or_else(|| LotScoutError::Evaluate(format!("no scripted response: {key}")))
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn wait_for(&mut self, url: &Url, _selector: &str) -> Result<()> {
        self.lookup(url).map(|_| ())
    }

    async fn evaluate(&mut self, url: &Url, _script: &str) -> Result<serde_json::Value> {
        self.lookup(url)
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Progress double counting `unit_done` calls.
#[derive(Default)]
pub(crate) struct CountingProgress {
    pub(crate) units: AtomicUsize,
}

impl Progress for CountingProgress {
    fn stage(&self, _name: &str) {}
    fn unit_done(&self, _current: usize, _total: usize) {
        self.units.fetch_add(1, Ordering::SeqCst);
    }
    fn done(&self, _summary: &RunSummary) {}
}

/// Lot rows payload as the in-page extraction script would return it.
pub(crate) fn lot_rows_json(rows: &[(u32, u16)]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|(item, year)| {
            serde_json::json!({
                "lot": format!("https://www.iaai.com/Vehicle?itemid={item}"),
                "year": year.to_string(),
                "vin": format!("VIN{item}"),
            })
        })
        .collect();
    serde_json::Value::Array(rows)
}

/// Detail page text payload containing a buy-now indicator.
pub(crate) fn detail_text(buy_now: bool) -> serde_json::Value {
    serde_json::json!(format!(r#"{{"ItemId":1,"BuyNowInd":{buy_now},"Seller":"x"}}"#))
}
