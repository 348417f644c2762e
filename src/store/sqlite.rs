use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::debug;

use crate::core::migration::legacy_key_code;
use crate::models::{ItemRecord, ItemStatus, RecordMap, StoredRecord};
use crate::store::RecordStore;
use crate::utils::error::{AppError, Result};
use crate::utils::urls::{make_key, split_key};

/// Record map kept in an SQLite `items` table keyed by `key`.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    database_url: String,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    key: String,
    host: Option<String>,
    code: Option<String>,
    url: Option<String>,
    name: Option<String>,
    image: Option<String>,
    price: Option<String>,
    prev_price: Option<String>,
    price_changed: Option<i64>,
    availability_message: Option<String>,
    prev_availability_message: Option<String>,
    available: Option<i64>,
    prev_available: Option<i64>,
    availability_changed: Option<i64>,
    in_stock_allocation: Option<i64>,
    status: Option<i64>,
    first_seen: Option<String>,
    status_since: Option<String>,
}

impl ItemRow {
    fn into_record(self, now: chrono::DateTime<Utc>) -> ItemRecord {
        let stored = StoredRecord {
            host: self.host,
            code: self.code.filter(|c| !c.is_empty()),
            url: self.url,
            name: self.name,
            image: self.image,
            price: self.price,
            prev_price: self.prev_price,
            price_changed: self.price_changed.unwrap_or(0) != 0,
            availability_message: self.availability_message,
            prev_availability_message: self.prev_availability_message,
            available: self.available.map(|v| v != 0),
            prev_available: self.prev_available.map(|v| v != 0),
            availability_changed: self.availability_changed.unwrap_or(0) != 0,
            in_stock_allocation: self.in_stock_allocation.and_then(|v| u32::try_from(v).ok()),
            status: Some(ItemStatus::from_flag(self.status.unwrap_or(0))),
            first_seen: self.first_seen,
            status_since: self.status_since,
            last_seen: None,
        };
        ItemRecord::migrated(&self.key, stored, now)
    }
}

impl SqliteRecordStore {
    /// Connect (creating the database file if needed) and bring the schema
    /// up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = options.clone().get_filename().parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Store(format!("schema migration failed: {}", e)))?;

        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Whether a legacy-keyed row has been replaced by a `host:code` record in
/// `records`. Rows without a stored host match any host with the same code.
fn superseded_by(key: &str, host: Option<&str>, records: &RecordMap) -> bool {
    if split_key(key).is_some() || records.contains_key(key) {
        return false;
    }
    let Some(code) = legacy_key_code(key) else {
        return false;
    };
    match host.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => records.contains_key(&make_key(host, &code)),
        None => records.keys().any(|k| split_key(k).is_some_and(|(_, c)| c == code)),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn describe(&self) -> String {
        self.database_url.clone()
    }

    async fn load(&self) -> Result<RecordMap> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT key, host, code, url, name, image, price, prev_price, price_changed, \
             availability_message, prev_availability_message, available, prev_available, \
             availability_changed, in_stock_allocation, status, first_seen, status_since \
             FROM items",
        )
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|row| {
                let record = row.into_record(now);
                (record.key.clone(), record)
            })
            .collect())
    }

    async fn save(&self, records: &RecordMap) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records.values() {
            sqlx::query(
                "INSERT INTO items (key, host, code, url, name, image, price, prev_price, price_changed, \
                 availability_message, prev_availability_message, available, prev_available, \
                 availability_changed, in_stock_allocation, status, first_seen, status_since) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET \
                 host = excluded.host, code = excluded.code, url = excluded.url, name = excluded.name, \
                 image = excluded.image, price = excluded.price, prev_price = excluded.prev_price, \
                 price_changed = excluded.price_changed, availability_message = excluded.availability_message, \
                 prev_availability_message = excluded.prev_availability_message, available = excluded.available, \
                 prev_available = excluded.prev_available, availability_changed = excluded.availability_changed, \
                 in_stock_allocation = excluded.in_stock_allocation, status = excluded.status, \
                 first_seen = excluded.first_seen, status_since = excluded.status_since",
            )
            .bind(&record.key)
            .bind(&record.host)
            .bind(record.code())
            .bind(&record.url)
            .bind(&record.name)
            .bind(&record.image)
            .bind(&record.price)
            .bind(&record.prev_price)
            .bind(record.price_changed)
            .bind(&record.availability_message)
            .bind(&record.prev_availability_message)
            .bind(record.available)
            .bind(record.prev_available)
            .bind(record.availability_changed)
            .bind(record.in_stock_allocation.map(i64::from))
            .bind(record.status.as_flag())
            .bind(record.first_seen.to_rfc3339())
            .bind(record.status_since.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        let rows: Vec<(String, Option<String>)> = sqlx::query_as("SELECT key, host FROM items")
            .fetch_all(&mut *tx)
            .await?;
        let mut removed = 0usize;
        for (key, host) in rows {
            if superseded_by(&key, host.as_deref(), records) {
                sqlx::query("DELETE FROM items WHERE key = ?")
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
                removed += 1;
            }
        }

        tx.commit().await?;
        debug!(records = records.len(), removed, "Saved state to sqlite");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM items").execute(&self.pool).await?;
        Ok(())
    }
}
