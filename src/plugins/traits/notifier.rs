use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::DigestMessage;
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn sent(message_id: impl Into<Option<String>>) -> Self {
        Self {
            success: true,
            message_id: message_id.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A channel that delivers change digests (email, Discord, ...).
///
/// Implementations either return `Err` or a result with `success: false`
/// when delivery fails; the dispatcher treats both the same way.
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;
    fn description(&self) -> &str;

    async fn send(&self, message: &DigestMessage) -> Result<NotificationResult>;
}
