use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::adapters::{DisneyStoreAdapter, SfccGridAdapter};
use super::notifiers::{DiscordNotifier, EmailNotifier};
use super::traits::{NotifierPlugin, SiteAdapter};
use crate::config::NotificationsConfig;
use crate::core::DigestMessage;
use crate::utils::error::{AppError, Result};

pub type SiteAdapterRef = Arc<dyn SiteAdapter>;
pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Outcome of handing one digest to every registered notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Registry of site adapters and notifiers, built once at startup and handed
/// to the scheduler.
#[derive(Clone)]
pub struct PluginManager {
    adapters: Arc<RwLock<HashMap<String, SiteAdapterRef>>>,
    notifiers: Arc<RwLock<BTreeMap<String, NotifierPluginBox>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            adapters: Arc::new(RwLock::new(HashMap::new())),
            notifiers: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Registry with the built-in site adapters and no notifiers.
    pub async fn with_default_adapters() -> Self {
        let manager = Self::new();
        manager.register_adapter(Arc::new(SfccGridAdapter::new())).await;
        manager.register_adapter(Arc::new(DisneyStoreAdapter::new())).await;
        manager
    }

    /// Register a site adapter under its `site_key`, replacing any previous one.
    pub async fn register_adapter(&self, adapter: SiteAdapterRef) {
        let key = adapter.site_key().to_lowercase();
        let mut adapters = self.adapters.write().await;
        adapters.insert(key, adapter);
    }

    /// Register a notifier under its `plugin_type`, replacing any previous one.
    pub async fn register_notifier(&self, plugin: NotifierPluginBox) {
        let plugin_type = plugin.plugin_type().to_string();
        let mut notifiers = self.notifiers.write().await;
        notifiers.insert(plugin_type, plugin);
    }

    /// Build and register every enabled notifier. Returns how many were added.
    pub async fn register_notifiers_from_config(&self, config: &NotificationsConfig) -> Result<usize> {
        let mut registered = 0;

        if config.email.enabled {
            self.register_notifier(Box::new(EmailNotifier::from_config(&config.email)?)).await;
            registered += 1;
        }

        if config.discord.enabled {
            self.register_notifier(Box::new(DiscordNotifier::from_config(&config.discord)?)).await;
            registered += 1;
        }

        if registered == 0 {
            warn!("No notifiers enabled; changes will only be logged");
        }
        Ok(registered)
    }

    pub async fn adapter(&self, site: &str) -> Result<SiteAdapterRef> {
        let adapters = self.adapters.read().await;
        adapters
            .get(&site.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                resource: format!("site adapter '{}'", site),
            })
    }

    pub async fn has_adapter(&self, site: &str) -> bool {
        let adapters = self.adapters.read().await;
        adapters.contains_key(&site.trim().to_lowercase())
    }

    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        let notifiers = self.notifiers.read().await;
        notifiers.contains_key(plugin_type)
    }

    /// List all registered site keys, sorted
    pub async fn list_adapters(&self) -> Vec<String> {
        let adapters = self.adapters.read().await;
        let mut keys: Vec<String> = adapters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// List all registered notifier types
    pub async fn list_notifiers(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().await;
        notifiers.keys().cloned().collect()
    }

    /// Send `digest` through every notifier in turn. A failing notifier is
    /// logged and counted; the rest still run.
    pub async fn dispatch(&self, digest: &DigestMessage) -> DispatchSummary {
        let notifiers = self.notifiers.read().await;
        let mut summary = DispatchSummary::default();

        for (plugin_type, notifier) in notifiers.iter() {
            match notifier.send(digest).await {
                Ok(result) if result.success => {
                    info!(notifier = %plugin_type, subject = %digest.subject, "Notification sent");
                    summary.sent += 1;
                }
                Ok(result) => {
                    let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
                    error!(notifier = %plugin_type, error = %reason, "Notifier reported failure");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(notifier = %plugin_type, error = %e, "Notifier failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
