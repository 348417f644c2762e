use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::ItemObservation;
use crate::utils::text::pretty_name_from_url;
use crate::utils::urls::{key_code, short_product_url};

/// Whether an item was present in the most recent listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "StatusRepr")]
pub enum ItemStatus {
    Present,
    Absent,
}

impl ItemStatus {
    pub fn as_flag(&self) -> i64 {
        match self {
            ItemStatus::Present => 1,
            ItemStatus::Absent => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag != 0 {
            ItemStatus::Present
        } else {
            ItemStatus::Absent
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Present => write!(f, "present"),
            ItemStatus::Absent => write!(f, "absent"),
        }
    }
}

/// Older state files store the status as `1`/`0`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Flag(i64),
    Bool(bool),
    Text(String),
}

impl TryFrom<StatusRepr> for ItemStatus {
    type Error = String;

    fn try_from(value: StatusRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            StatusRepr::Flag(flag) => Ok(ItemStatus::from_flag(flag)),
            StatusRepr::Bool(present) => Ok(if present { ItemStatus::Present } else { ItemStatus::Absent }),
            StatusRepr::Text(text) => match text.trim().to_lowercase().as_str() {
                "present" | "1" | "true" => Ok(ItemStatus::Present),
                "absent" | "0" | "false" => Ok(ItemStatus::Absent),
                other => Err(format!("unknown item status: {}", other)),
            },
        }
    }
}

/// Persisted knowledge about one item, keyed by `host:code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_price: Option<String>,
    #[serde(default)]
    pub price_changed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_availability_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_available: Option<bool>,
    #[serde(default)]
    pub availability_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock_allocation: Option<u32>,

    pub status: ItemStatus,
    pub first_seen: DateTime<Utc>,
    pub status_since: DateTime<Utc>,
}

impl ItemRecord {
    /// Record for an item seen for the first time.
    pub fn observed(key: &str, host: &str, obs: &ItemObservation, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            host: Some(host.to_string()),
            url: obs.url.clone(),
            name: display_name(obs.title.as_deref(), &obs.url, &obs.code),
            image: obs.image.clone(),
            price: obs.price.clone(),
            prev_price: None,
            price_changed: false,
            availability_message: obs.availability_message.clone(),
            prev_availability_message: None,
            available: obs.available,
            prev_available: None,
            availability_changed: false,
            in_stock_allocation: obs.in_stock_allocation,
            status: ItemStatus::Present,
            first_seen: now,
            status_since: now,
        }
    }

    /// Build a record from a loosely-typed stored row. Missing timestamps are
    /// filled from whatever older fields exist, falling back to `now`.
    pub fn migrated(key: &str, stored: StoredRecord, now: DateTime<Utc>) -> Self {
        let last_seen = stored.last_seen.as_deref().and_then(parse_timestamp);
        let first_seen = stored
            .first_seen
            .as_deref()
            .and_then(parse_timestamp)
            .or(last_seen)
            .unwrap_or(now);
        let status_since = stored
            .status_since
            .as_deref()
            .and_then(parse_timestamp)
            .or(if stored.status.is_none() { last_seen } else { None })
            .unwrap_or(first_seen);

        let url = stored.url.filter(|u| !u.trim().is_empty()).unwrap_or_default();
        let code = stored.code.unwrap_or_else(|| key_code(key).to_string());
        let name = display_name(stored.name.as_deref(), &url, &code);

        Self {
            key: key.to_string(),
            host: stored.host.filter(|h| !h.trim().is_empty()),
            url,
            name,
            image: non_blank(stored.image),
            price: non_blank(stored.price),
            prev_price: non_blank(stored.prev_price),
            price_changed: stored.price_changed,
            availability_message: non_blank(stored.availability_message),
            prev_availability_message: non_blank(stored.prev_availability_message),
            available: stored.available,
            prev_available: stored.prev_available,
            availability_changed: stored.availability_changed,
            in_stock_allocation: stored.in_stock_allocation,
            status: stored.status.unwrap_or(ItemStatus::Present),
            first_seen,
            status_since,
        }
    }

    /// Move this record under a new composite key.
    pub fn rekeyed(mut self, key: &str, host: &str) -> Self {
        self.key = key.to_string();
        self.host = Some(host.to_string());
        self
    }

    pub fn code(&self) -> &str {
        key_code(&self.key)
    }

    pub fn is_present(&self) -> bool {
        self.status == ItemStatus::Present
    }

    pub fn short_url(&self) -> String {
        if self.url.is_empty() {
            return String::new();
        }
        short_product_url(&self.url, self.code())
    }

    pub fn clear_change_flags(&mut self) {
        self.price_changed = false;
        self.availability_changed = false;
    }

    pub fn mark_absent(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Absent;
        self.status_since = now;
    }

    /// Refresh url and name from a listing observation, keeping the stored
    /// value whenever the observation has nothing better. The image is only
    /// filled in once.
    pub fn refresh_display(&mut self, obs: &ItemObservation) {
        if !obs.url.is_empty() {
            self.url = obs.url.clone();
        }
        if let Some(title) = &obs.title {
            self.name = title.clone();
        } else if self.name.is_empty() {
            self.name = display_name(None, &self.url, &obs.code);
        }
        if self.image.is_none() && obs.image.is_some() {
            self.image = obs.image.clone();
        }
    }
}

fn display_name(title: Option<&str>, url: &str, code: &str) -> String {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or_else(|| pretty_name_from_url(url))
        .unwrap_or_else(|| code.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Loosely-typed record as found in state written by older versions. Every
/// field is optional and booleans may be stored as integers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredRecord {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub prev_price: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub price_changed: bool,
    #[serde(default)]
    pub availability_message: Option<String>,
    #[serde(default)]
    pub prev_availability_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_bool")]
    pub available: Option<bool>,
    #[serde(default, deserialize_with = "lenient_opt_bool")]
    pub prev_available: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub availability_changed: bool,
    #[serde(default)]
    pub in_stock_allocation: Option<u32>,
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub status_since: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl BoolRepr {
    fn into_bool(self) -> Option<bool> {
        match self {
            BoolRepr::Bool(b) => Some(b),
            BoolRepr::Int(i) => Some(i != 0),
            BoolRepr::Text(s) => match s.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
        }
    }
}

fn lenient_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<bool>, D::Error> {
    Ok(Option::<BoolRepr>::deserialize(deserializer)?.and_then(BoolRepr::into_bool))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(lenient_opt_bool(deserializer)?.unwrap_or(false))
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS` one taken as
/// UTC. Blank or malformed input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
