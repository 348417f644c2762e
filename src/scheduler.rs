//! The polling loop: fetch, reconcile, persist, notify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::core::{DigestMessage, Reconciler, TickOutcome};
use crate::models::RecordMap;
use crate::plugins::manager::SiteAdapterRef;
use crate::plugins::{DispatchSummary, ItemFilters, PluginManager};
use crate::session::HttpSession;
use crate::store::RecordStore;
use crate::utils::error::Result;
use crate::utils::urls::{key_code, managed_host};

/// A century; keeps the restock window representable.
const MAX_RESTOCK_HOURS: u64 = 24 * 365 * 100;

/// Per-run parameters of the watcher.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub target_url: String,
    pub interval: Duration,
    pub restock_hours: u64,
    pub filters: ItemFilters,
    pub detail_recheck: bool,
}

impl WatchSettings {
    pub fn from_config(config: &AppConfig, target_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            target_url: target_url.into(),
            interval: Duration::from_secs(config.watch.interval_secs.max(1)),
            restock_hours: config.watch.restock_hours,
            filters: ItemFilters::new(config.watch.include_re.as_deref(), config.watch.exclude_re.as_deref())?,
            detail_recheck: config.watch.detail_recheck,
        })
    }
}

/// Counts for one completed tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub present: usize,
    pub new: usize,
    pub restocked: usize,
    pub price_changes: usize,
    pub availability_changes: usize,
    pub known: usize,
    pub rechecked: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

impl TickReport {
    fn from_outcome(at: DateTime<Utc>, outcome: &TickOutcome, dispatch: &DispatchSummary) -> Self {
        Self {
            at,
            present: outcome.present_count,
            new: outcome.new_keys.len(),
            restocked: outcome.restocked_keys.len(),
            price_changes: outcome.price_changed_keys.len(),
            availability_changes: outcome.availability_changed_keys.len(),
            known: outcome.total_known(),
            rechecked: outcome.rechecked_count,
            notifications_sent: dispatch.sent,
            notifications_failed: dispatch.failed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherStats {
    pub total_ticks: u64,
    pub failed_ticks: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub known_items: usize,
    pub uptime_seconds: u64,
}

pub struct WatchScheduler {
    plugins: PluginManager,
    adapter: SiteAdapterRef,
    session: HttpSession,
    store: Box<dyn RecordStore>,
    reconciler: Reconciler,
    settings: WatchSettings,
    state: RecordMap,
    stats: WatcherStats,
    start_time: DateTime<Utc>,
}

impl WatchScheduler {
    /// Resolve the adapter and load the persisted state. Fails before any
    /// tick when the site is unknown, the target has no host or the store
    /// cannot be read.
    pub async fn new(
        plugins: PluginManager,
        site: &str,
        session: HttpSession,
        store: Box<dyn RecordStore>,
        settings: WatchSettings,
    ) -> Result<Self> {
        let adapter = plugins.adapter(site).await?;
        let host = managed_host(&settings.target_url)?;
        let window = chrono::Duration::hours(settings.restock_hours.min(MAX_RESTOCK_HOURS) as i64);

        let state = store.load().await?;
        info!(
            site = %adapter.site_key(),
            url = %settings.target_url,
            host = %host,
            store = %store.describe(),
            known = state.len(),
            "Watcher ready"
        );

        let stats = WatcherStats {
            known_items: state.len(),
            ..WatcherStats::default()
        };

        Ok(Self {
            plugins,
            adapter,
            session,
            store,
            reconciler: Reconciler::new(host, window),
            settings,
            state,
            stats,
            start_time: Utc::now(),
        })
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// The last successfully persisted state.
    pub fn state(&self) -> &RecordMap {
        &self.state
    }

    pub fn stats(&self) -> WatcherStats {
        let uptime = Utc::now().signed_duration_since(self.start_time);
        WatcherStats {
            uptime_seconds: uptime.num_seconds().max(0) as u64,
            ..self.stats.clone()
        }
    }

    pub async fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`. On failure nothing is persisted and the
    /// in-memory state is left as it was.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        self.stats.total_ticks += 1;
        self.stats.last_tick = Some(now);

        match self.run_tick(now).await {
            Ok(report) => {
                self.stats.notifications_sent += report.notifications_sent as u64;
                self.stats.notifications_failed += report.notifications_failed as u64;
                self.stats.known_items = report.known;
                self.stats.last_error = None;
                Ok(report)
            }
            Err(e) => {
                self.stats.failed_ticks += 1;
                self.stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let url = self.settings.target_url.clone();
        let observations = self.adapter.fetch(&self.session, &url, &self.settings.filters).await?;
        debug!(count = observations.len(), "Listing fetched");

        let mut reconciliation = self.reconciler.reconcile(self.state.clone(), observations, now);

        if self.settings.detail_recheck && self.adapter.supports_details() {
            let missing = reconciliation.recheck_keys().to_vec();
            for key in missing {
                let detail = self.adapter.fetch_detail(&self.session, &url, key_code(&key)).await;
                if detail.is_none() {
                    debug!(key = %key, "No detail for missing item");
                }
                reconciliation.apply_detail(&key, detail);
            }
        }

        let outcome = reconciliation.finish();
        self.store.save(&outcome.next_state).await?;

        let dispatch = if outcome.has_events() {
            let digest = DigestMessage::from_outcome(&outcome, self.settings.restock_hours);
            self.plugins.dispatch(&digest).await
        } else {
            DispatchSummary::default()
        };

        let report = TickReport::from_outcome(now, &outcome, &dispatch);
        self.state = outcome.next_state;

        info!(
            current = report.present,
            new = report.new,
            restocked = report.restocked,
            price_changes = report.price_changes,
            availability_changes = report.availability_changes,
            rechecked = report.rechecked,
            known = report.known,
            "Tick complete"
        );
        Ok(report)
    }

    /// Tick every `interval` until `shutdown` flips to true or its sender is
    /// dropped. Tick errors are logged and the loop carries on.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.settings.interval.as_secs(), "Watch loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(url = %self.settings.target_url, error = %e, "Tick failed");
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                    }
                    break;
                }
            }
        }

        let stats = self.stats();
        info!(
            ticks = stats.total_ticks,
            failed = stats.failed_ticks,
            known = stats.known_items,
            "Watch loop stopped"
        );
    }
}
