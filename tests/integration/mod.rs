// Integration tests for store-watcher
// These tests drive full ticks through the scheduler with in-memory adapters
// and notifiers.

pub mod adapter_tests;
pub mod store_tests;
pub mod watch_cycle_tests;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use store_watcher::{
    AppConfig,
    config::HttpConfig,
    core::DigestMessage,
    models::ItemObservation,
    plugins::{
        ItemFilters, PluginManager,
        traits::{NotificationResult, NotifierPlugin, SiteAdapter},
    },
    scheduler::{WatchScheduler, WatchSettings},
    session::HttpSession,
    store::{JsonRecordStore, RecordStore},
    utils::error::{AppError, Result},
};

pub const TARGET_URL: &str = "https://www.store.com/grid?cgid=pins&start=0&sz=200";
pub const HOST: &str = "store.com";

/// Adapter fed from the test: each `fetch` pops the next queued listing, and
/// detail lookups answer from a fixed table.
#[derive(Default)]
pub struct FakeAdapter {
    listings: Mutex<VecDeque<Option<Vec<ItemObservation>>>>,
    details: Mutex<HashMap<String, ItemObservation>>,
    detail_calls: Mutex<Vec<String>>,
}

impl FakeAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_listing(&self, items: Vec<ItemObservation>) {
        self.listings.lock().unwrap().push_back(Some(items));
    }

    /// Queue a listing fetch that fails.
    pub fn push_failure(&self) {
        self.listings.lock().unwrap().push_back(None);
    }

    pub fn set_detail(&self, item: ItemObservation) {
        self.details.lock().unwrap().insert(item.code.clone(), item);
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteAdapter for FakeAdapter {
    fn name(&self) -> &str {
        "Fake Store"
    }

    fn site_key(&self) -> &str {
        "fake"
    }

    fn description(&self) -> &str {
        "Scripted listings for tests"
    }

    async fn fetch(&self, _session: &HttpSession, url: &str, filters: &ItemFilters) -> Result<Vec<ItemObservation>> {
        let next = self.listings.lock().unwrap().pop_front().flatten();
        match next {
            Some(items) => Ok(items.into_iter().filter(|item| filters.allows(&item.url)).collect()),
            None => Err(AppError::HttpStatus {
                status: 503,
                url: url.to_string(),
            }),
        }
    }

    fn supports_details(&self) -> bool {
        true
    }

    async fn fetch_detail(&self, _session: &HttpSession, _url: &str, code: &str) -> Option<ItemObservation> {
        self.detail_calls.lock().unwrap().push(code.to_string());
        self.details.lock().unwrap().get(code).cloned()
    }
}

/// Keeps every digest it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<DigestMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn digests(&self) -> Vec<DigestMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn name(&self) -> &str {
        "Recording Notifier"
    }

    fn plugin_type(&self) -> &str {
        "recording"
    }

    fn description(&self) -> &str {
        "Collects digests in memory"
    }

    async fn send(&self, message: &DigestMessage) -> Result<NotificationResult> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(NotificationResult::sent(None))
    }
}

/// Lets the test keep a handle on a notifier after boxing it into the registry.
pub struct SharedNotifier(pub Arc<RecordingNotifier>);

#[async_trait]
impl NotifierPlugin for SharedNotifier {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn plugin_type(&self) -> &str {
        self.0.plugin_type()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    async fn send(&self, message: &DigestMessage) -> Result<NotificationResult> {
        self.0.send(message).await
    }
}

/// Always errors, like an unreachable SMTP relay.
pub struct FailingNotifier;

#[async_trait]
impl NotifierPlugin for FailingNotifier {
    fn name(&self) -> &str {
        "Failing Notifier"
    }

    fn plugin_type(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Never delivers"
    }

    async fn send(&self, _message: &DigestMessage) -> Result<NotificationResult> {
        Err(AppError::Notification("relay unreachable".to_string()))
    }
}

/// Configuration with every default and no environment or files involved.
pub fn get_test_config() -> AppConfig {
    AppConfig::load_with(None, |_| None).expect("default configuration")
}

pub fn test_http_config() -> HttpConfig {
    HttpConfig {
        user_agent: "store-watcher-test/1.0".to_string(),
        request_timeout_secs: 5,
        retry_attempts: 0,
        retry_delay_ms: 1,
        max_requests_per_minute: 0,
        burst: 0,
    }
}

pub fn test_settings(restock_hours: u64) -> WatchSettings {
    WatchSettings {
        target_url: TARGET_URL.to_string(),
        interval: std::time::Duration::from_secs(60),
        restock_hours,
        filters: ItemFilters::default(),
        detail_recheck: true,
    }
}

pub fn item(code: &str) -> ItemObservation {
    ItemObservation::new(code, format!("https://www.store.com/pin-{}.html", code))
}

pub fn key(code: &str) -> String {
    format!("{}:{}", HOST, code)
}

/// Fixed clock: `hours` after 2025-01-01T00:00:00Z.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn json_store(dir: &Path) -> Box<dyn RecordStore> {
    Box::new(JsonRecordStore::new(dir.join("seen_items.json")))
}

/// Watcher over `adapter` with a recording notifier registered.
pub async fn create_watcher(
    adapter: Arc<FakeAdapter>,
    store: Box<dyn RecordStore>,
    restock_hours: u64,
) -> anyhow::Result<(WatchScheduler, Arc<RecordingNotifier>)> {
    let plugins = PluginManager::new();
    plugins.register_adapter(adapter).await;

    let notifier = RecordingNotifier::new();
    plugins.register_notifier(Box::new(SharedNotifier(notifier.clone()))).await;

    let session = HttpSession::new(&test_http_config())?;
    let watcher = WatchScheduler::new(plugins, "fake", session, store, test_settings(restock_hours)).await?;
    Ok((watcher, notifier))
}
