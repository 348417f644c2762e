//! Merges one tick of observations into the persisted record map.
//!
//! Reconciliation runs in two phases so that the caller can perform network
//! I/O in between: [`Reconciler::reconcile`] applies the listing, then the
//! caller looks up each key from [`Reconciliation::recheck_keys`] and feeds
//! the result to [`Reconciliation::apply_detail`], and finally
//! [`Reconciliation::finish`] yields the next state and the tick's events.

use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::core::migration::migrate_legacy_keys;
use crate::core::tracking::apply_tracked_fields;
use crate::models::{ItemObservation, ItemRecord, ItemStatus, RecordMap};
use crate::utils::urls::{key_host, make_key};

#[derive(Debug, Clone)]
pub struct Reconciler {
    managed_host: String,
    restock_window: Duration,
}

impl Reconciler {
    pub fn new(managed_host: impl Into<String>, restock_window: Duration) -> Self {
        Self {
            managed_host: managed_host.into(),
            restock_window,
        }
    }

    pub fn managed_host(&self) -> &str {
        &self.managed_host
    }

    pub fn restock_window(&self) -> Duration {
        self.restock_window
    }

    /// Apply a listing to `prior_state`: migrate legacy keys, sweep missing
    /// items of the managed host to absent and merge every observed item.
    pub fn reconcile<I>(&self, prior_state: RecordMap, observations: I, now: DateTime<Utc>) -> Reconciliation
    where
        I: IntoIterator<Item = ItemObservation>,
    {
        let host = self.managed_host.as_str();
        let mut state = migrate_legacy_keys(prior_state, host);

        let mut order = Vec::new();
        let mut present: HashMap<String, ItemObservation> = HashMap::new();
        for obs in observations {
            let obs = obs.normalized();
            if obs.code.is_empty() {
                continue;
            }
            match present.entry(make_key(host, &obs.code)) {
                Entry::Occupied(mut entry) => entry.get_mut().absorb(obs),
                Entry::Vacant(entry) => {
                    order.push(entry.key().clone());
                    entry.insert(obs);
                }
            }
        }

        let mut prior_status = HashMap::new();
        let mut recheck_keys = Vec::new();
        for (key, record) in state.iter_mut() {
            if key_host(key) != Some(host) {
                continue;
            }
            prior_status.insert(key.clone(), (record.status, record.status_since));
            record.clear_change_flags();

            if !present.contains_key(key) {
                recheck_keys.push(key.clone());
                if record.is_present() {
                    record.mark_absent(now);
                }
            }
        }

        let mut new_keys = Vec::new();
        let mut restocked_keys = Vec::new();
        let mut present_count = 0;

        for key in order {
            let Some(obs) = present.remove(&key) else { continue };
            if obs.counts_as_present() {
                present_count += 1;
            }

            match state.get_mut(&key) {
                None => {
                    state.insert(key.clone(), ItemRecord::observed(&key, host, &obs, now));
                    new_keys.push(key);
                }
                Some(record) => {
                    record.refresh_display(&obs);
                    apply_tracked_fields(record, &obs);
                    let prior = (record.status, record.status_since);
                    if settle_present(record, prior, now, self.restock_window) {
                        restocked_keys.push(key);
                    }
                }
            }
        }

        Reconciliation {
            restock_window: self.restock_window,
            now,
            state,
            prior_status,
            recheck_keys,
            new_keys,
            restocked_keys,
            present_count,
            rechecked_count: 0,
        }
    }
}

/// Mark a re-observed record present. Returns whether the re-appearance
/// counts as a restock, i.e. the item had been absent for at least `window`
/// before this tick.
fn settle_present(
    record: &mut ItemRecord,
    (prior_status, prior_since): (ItemStatus, DateTime<Utc>),
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    match prior_status {
        ItemStatus::Absent => {
            let restocked = now - prior_since >= window;
            record.status = ItemStatus::Present;
            record.status_since = now;
            restocked
        }
        ItemStatus::Present => {
            // Swept this tick but confirmed by a detail lookup: undo the sweep.
            record.status = ItemStatus::Present;
            record.status_since = prior_since;
            false
        }
    }
}

/// A tick in progress: the listing has been applied, detail re-checks may
/// still be pending.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    restock_window: Duration,
    now: DateTime<Utc>,
    state: RecordMap,
    prior_status: HashMap<String, (ItemStatus, DateTime<Utc>)>,
    recheck_keys: Vec<String>,
    new_keys: Vec<String>,
    restocked_keys: Vec<String>,
    present_count: usize,
    rechecked_count: usize,
}

impl Reconciliation {
    /// Keys of the managed host that were not in this tick's listing.
    pub fn recheck_keys(&self) -> &[String] {
        &self.recheck_keys
    }

    pub fn state(&self) -> &RecordMap {
        &self.state
    }

    /// Apply the result of a detail lookup for a key missing from the
    /// listing. `None` (lookup failed) leaves the record untouched. Returns
    /// whether the detail was applied.
    pub fn apply_detail(&mut self, key: &str, detail: Option<ItemObservation>) -> bool {
        let Some(detail) = detail else { return false };
        if !self.recheck_keys.iter().any(|k| k == key) {
            return false;
        }
        let Some(record) = self.state.get_mut(key) else { return false };

        let detail = detail.normalized();
        apply_tracked_fields(record, &detail);

        if detail.available == Some(true) {
            let prior = self
                .prior_status
                .get(key)
                .copied()
                .unwrap_or((record.status, record.status_since));
            if settle_present(record, prior, self.now, self.restock_window) {
                self.restocked_keys.push(key.to_string());
            }
        }

        self.rechecked_count += 1;
        true
    }

    pub fn finish(self) -> TickOutcome {
        let changed = |flag: fn(&ItemRecord) -> bool| -> Vec<String> {
            self.prior_status
                .keys()
                .chain(self.new_keys.iter())
                .filter(|key| self.state.get(*key).is_some_and(flag))
                .cloned()
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        let price_changed_keys = changed(|r| r.price_changed);
        let availability_changed_keys = changed(|r| r.availability_changed);

        TickOutcome {
            next_state: self.state,
            new_keys: self.new_keys,
            restocked_keys: self.restocked_keys,
            price_changed_keys,
            availability_changed_keys,
            present_count: self.present_count,
            rechecked_count: self.rechecked_count,
        }
    }
}

/// Result of one reconciled tick.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub next_state: RecordMap,
    pub new_keys: Vec<String>,
    pub restocked_keys: Vec<String>,
    pub price_changed_keys: Vec<String>,
    pub availability_changed_keys: Vec<String>,
    pub present_count: usize,
    pub rechecked_count: usize,
}

impl TickOutcome {
    /// Whether this tick produced anything worth notifying about.
    pub fn has_events(&self) -> bool {
        !self.new_keys.is_empty() || !self.restocked_keys.is_empty()
    }

    pub fn total_known(&self) -> usize {
        self.next_state.len()
    }
}
