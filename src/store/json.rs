use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{ItemRecord, RecordMap, StoredRecord};
use crate::store::RecordStore;
use crate::utils::error::{AppError, Result};
use crate::utils::urls::{canonicalize, extract_product_code};

/// Record map kept in a single pretty-printed JSON file.
///
/// Also reads the shapes written by older versions: a plain array of product
/// URLs, and objects keyed by bare codes or URLs.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Decode any supported state file shape into a record map.
pub fn parse_records(raw: &str) -> Result<RecordMap> {
    let value: Value = serde_json::from_str(raw)?;
    let now = Utc::now();

    match value {
        Value::Array(urls) => {
            info!(count = urls.len(), "Migrating legacy URL list state");
            let mut records = RecordMap::new();
            for url in urls.iter().filter_map(Value::as_str) {
                let Ok(canonical) = canonicalize(url) else { continue };
                let Some(code) = extract_product_code(&canonical) else { continue };
                let stored = StoredRecord {
                    url: Some(canonical),
                    ..StoredRecord::default()
                };
                records
                    .entry(code.clone())
                    .or_insert_with(|| ItemRecord::migrated(&code, stored, now));
            }
            Ok(records)
        }
        Value::Object(entries) => {
            let mut records = RecordMap::new();
            for (key, entry) in entries {
                let stored: StoredRecord = match entry {
                    Value::Object(_) => serde_json::from_value(entry)?,
                    _ => StoredRecord::default(),
                };
                let record = ItemRecord::migrated(&key, stored, now);
                records.insert(key, record);
            }
            Ok(records)
        }
        Value::Null => Ok(RecordMap::new()),
        other => Err(AppError::Parse {
            message: format!("unsupported state file shape: {}", type_name(&other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    async fn load(&self) -> Result<RecordMap> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "State file missing, starting empty");
                return Ok(RecordMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(RecordMap::new());
        }
        parse_records(&raw)
    }

    async fn save(&self, records: &RecordMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(records)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), records = records.len(), "Saved state");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
