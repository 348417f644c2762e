//! Durable storage for the record map.
//!
//! The backend is picked once at startup from [`StoreConfig`]; everything
//! else talks to the [`RecordStore`] trait.

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::models::RecordMap;
use crate::utils::error::Result;

pub mod json;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use json::JsonRecordStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Human readable location, used in logs.
    fn describe(&self) -> String;

    /// Load the full record map. A store that was never written is empty.
    async fn load(&self) -> Result<RecordMap>;

    /// Persist the full record map. Records missing from `records` are not
    /// deleted.
    async fn save(&self, records: &RecordMap) -> Result<()>;

    /// Remove every stored record.
    async fn clear(&self) -> Result<()>;
}

/// Open the configured backend.
pub async fn open(config: &StoreConfig) -> Result<Box<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Json => Ok(Box::new(JsonRecordStore::new(&config.path))),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => Ok(Box::new(SqliteRecordStore::connect(&config.database_url).await?)),
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(crate::utils::error::AppError::Store(
            "sqlite backend requested but the `sqlite` feature is disabled".to_string(),
        )),
    }
}
