use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

use crate::plugins::adapters::sfcc::build_grid_url;

pub const MULTIPLE_URLS_ERROR: &str = "Only a single URL is supported";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub target: TargetConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub site: String,
    pub target_url: Option<String>,
    pub interval_secs: u64,
    pub restock_hours: u64,
    pub include_re: Option<String>,
    pub exclude_re: Option<String>,
    pub detail_recheck: bool,
}

/// Parts of an SFCC category grid URL, used when no explicit URL is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub scheme: String,
    pub region_slug: String,
    pub locale: String,
    pub category_slug: Option<String>,
    pub start: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: String,
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    pub max_requests_per_minute: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub email: SmtpConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub use_starttls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
}

/// Flat variables understood by older deployments, mapped onto config keys.
/// They only fill in defaults; files and `STORE_WATCHER__*` variables win.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TARGET_URL", "watch.target_url"),
    ("CHECK_EVERY", "watch.interval_secs"),
    ("RESTOCK_WINDOW_HOURS", "watch.restock_hours"),
    ("INCLUDE_RE", "watch.include_re"),
    ("EXCLUDE_RE", "watch.exclude_re"),
    ("TARGET_HOST", "target.host"),
    ("TARGET_SCHEME", "target.scheme"),
    ("TARGET_REGION_SLUG", "target.region_slug"),
    ("TARGET_LOCALE", "target.locale"),
    ("TARGET_CATEGORY_SLUG", "target.category_slug"),
    ("TARGET_START", "target.start"),
    ("TARGET_PAGE_SIZE", "target.page_size"),
    ("STATE_FILE", "store.path"),
    ("STATE_DB", "store.database_url"),
    ("SMTP_HOST", "notifications.email.host"),
    ("SMTP_PORT", "notifications.email.port"),
    ("SMTP_USER", "notifications.email.username"),
    ("SMTP_PASS", "notifications.email.password"),
    ("EMAIL_FROM", "notifications.email.from_address"),
    ("EMAIL_TO", "notifications.email.to_address"),
    ("DISCORD_WEBHOOK_URL", "notifications.discord.webhook_url"),
    ("DISCORD_USERNAME", "notifications.discord.username"),
    ("DISCORD_AVATAR_URL", "notifications.discord.avatar_url"),
];

impl AppConfig {
    /// Load configuration from defaults, `config/` files, an optional
    /// explicit file and the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |name| env::var(name).ok())
    }

    /// Like [`AppConfig::load`], reading legacy variables through `lookup`.
    pub fn load_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let run_mode = lookup("RUN_MODE").unwrap_or_else(|| "development".into());

        let mut builder = legacy_defaults(base_defaults()?, &lookup)?
            // Optional layered files, most specific last
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            // Environment variables like STORE_WATCHER__WATCH__INTERVAL_SECS
            .add_source(Environment::with_prefix("STORE_WATCHER").separator("__").try_parsing(true))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.site.trim().is_empty() {
            return Err(ConfigError::Message("watch.site must not be empty".into()));
        }

        if self.watch.interval_secs == 0 {
            return Err(ConfigError::Message("watch.interval_secs must be greater than 0".into()));
        }

        for (name, pattern) in [("include_re", &self.watch.include_re), ("exclude_re", &self.watch.exclude_re)] {
            if let Some(pattern) = pattern.as_deref().filter(|p| !p.trim().is_empty()) {
                if let Err(e) = Regex::new(pattern) {
                    return Err(ConfigError::Message(format!("Invalid watch.{} pattern: {}", name, e)));
                }
            }
        }

        if let Some(url) = self.watch.target_url.as_deref().filter(|u| !u.trim().is_empty()) {
            normalize_single_url(url)?;
        }

        if self.target.page_size == 0 {
            return Err(ConfigError::Message("target.page_size must be greater than 0".into()));
        }

        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::Message("http.request_timeout_secs must be greater than 0".into()));
        }

        match self.store.backend {
            StoreBackend::Json if self.store.path.trim().is_empty() => {
                return Err(ConfigError::Message("store.path must be set for the json backend".into()));
            }
            StoreBackend::Sqlite if self.store.database_url.trim().is_empty() => {
                return Err(ConfigError::Message("store.database_url must be set for the sqlite backend".into()));
            }
            _ => {}
        }

        let email = &self.notifications.email;
        if email.enabled {
            let missing: Vec<&str> = [
                ("host", &email.host),
                ("username", &email.username),
                ("password", &email.password),
                ("to_address", &email.to_address),
            ]
            .into_iter()
            .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect();

            if !missing.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Email notifications enabled but notifications.email is missing: {}",
                    missing.join(", ")
                )));
            }
            if email.port == 0 {
                return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
            }
        }

        let discord = &self.notifications.discord;
        if discord.enabled && discord.webhook_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            return Err(ConfigError::Message(
                "Discord notifications enabled but notifications.discord.webhook_url is not set".into(),
            ));
        }

        Ok(())
    }

    /// Pick the URL to watch: the CLI override, then `watch.target_url`, then
    /// a grid URL assembled from the `target` section.
    pub fn resolve_target_url(&self, override_url: Option<&str>) -> Result<String, ConfigError> {
        let explicit = override_url
            .or(self.watch.target_url.as_deref())
            .filter(|u| !u.trim().is_empty());
        if let Some(url) = explicit {
            return normalize_single_url(url);
        }

        let target = &self.target;
        match (target.host.as_deref(), target.category_slug.as_deref()) {
            (Some(host), Some(category)) if !host.trim().is_empty() && !category.trim().is_empty() => build_grid_url(
                &target.scheme,
                host.trim(),
                &target.region_slug,
                &target.locale,
                category.trim(),
                target.start,
                target.page_size,
            )
            .map_err(|e| ConfigError::Message(e.to_string())),
            _ => Err(ConfigError::Message(
                "No target URL: pass --url, set watch.target_url (TARGET_URL) or target.host and target.category_slug"
                    .into(),
            )),
        }
    }
}

/// Accept exactly one absolute http(s) URL, rejecting lists.
pub fn normalize_single_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.contains(',') || trimmed.contains(char::is_whitespace) {
        return Err(ConfigError::Message(MULTIPLE_URLS_ERROR.into()));
    }

    let parsed = Url::parse(trimmed).map_err(|e| ConfigError::Message(format!("Invalid target URL {}: {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::Message(format!("Target URL must be http(s): {}", trimmed)));
    }
    Ok(trimmed.to_string())
}

fn base_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("watch.site", "sfcc")?
        .set_default("watch.interval_secs", 300_i64)?
        .set_default("watch.restock_hours", 24_i64)?
        .set_default("watch.detail_recheck", true)?
        .set_default("target.scheme", "https")?
        .set_default("target.region_slug", crate::plugins::adapters::sfcc::DEFAULT_REGION_SLUG)?
        .set_default("target.locale", crate::plugins::adapters::sfcc::DEFAULT_LOCALE)?
        .set_default("target.start", 0_i64)?
        .set_default("target.page_size", 200_i64)?
        .set_default("store.backend", "json")?
        .set_default("store.path", "seen_items.json")?
        .set_default("store.database_url", "sqlite://data/store_watcher.db")?
        .set_default("http.user_agent", "Mozilla/5.0 (compatible; store-watcher/0.1)")?
        .set_default("http.request_timeout_secs", 30_i64)?
        .set_default("http.retry_attempts", 3_i64)?
        .set_default("http.retry_delay_ms", 500_i64)?
        .set_default("http.max_requests_per_minute", 60_i64)?
        .set_default("http.burst", 5_i64)?
        .set_default("notifications.email.enabled", false)?
        .set_default("notifications.email.port", 587_i64)?
        .set_default("notifications.email.use_starttls", true)?
        .set_default("notifications.discord.enabled", false)?
        .set_default("logging.level", "info")
}

fn legacy_defaults<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: &F,
) -> Result<ConfigBuilder<DefaultState>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    for (name, key) in LEGACY_ENV {
        if let Some(v) = value(name) {
            builder = builder.set_default(*key, v)?;
        }
    }

    // Older deployments enabled a channel simply by configuring it.
    if value("SMTP_HOST").is_some() && value("SMTP_USER").is_some() && value("EMAIL_TO").is_some() {
        builder = builder.set_default("notifications.email.enabled", true)?;
        if value("EMAIL_FROM").is_none() {
            if let Some(user) = value("SMTP_USER") {
                builder = builder.set_default("notifications.email.from_address", user)?;
            }
        }
    }
    if value("DISCORD_WEBHOOK_URL").is_some() {
        builder = builder.set_default("notifications.discord.enabled", true)?;
    }

    Ok(builder)
}
