//! Rewrites record keys written before keys were namespaced by host.

use tracing::{debug, warn};

use crate::models::RecordMap;
use crate::utils::urls::{canonicalize, extract_product_code, make_key, split_key};

/// Rewrite every key lacking a `host:` prefix to `<host>:<code>`, using the
/// record's own host when it has one and `default_host` otherwise.
///
/// Legacy keys that are full product URLs are reduced to their product code;
/// URLs without a code are dropped. When a migrated key collides with an
/// existing prefixed key the prefixed record is kept. Running this on an
/// already migrated map returns it unchanged.
pub fn migrate_legacy_keys(state: RecordMap, default_host: &str) -> RecordMap {
    let (current, legacy): (Vec<_>, Vec<_>) = state.into_iter().partition(|(key, _)| split_key(key).is_some());
    if legacy.is_empty() {
        return current.into_iter().collect();
    }

    let mut migrated: RecordMap = current.into_iter().collect();
    let mut rewritten = 0usize;

    for (key, mut record) in legacy {
        if key.contains("://") && record.url.is_empty() {
            if let Ok(url) = canonicalize(&key) {
                record.url = url;
            }
        }

        let Some(code) = legacy_key_code(&key) else {
            warn!(key = %key, "Dropping legacy record without a product code");
            continue;
        };

        let host = record
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| default_host.to_string());
        let new_key = make_key(&host, &code);

        if migrated.contains_key(&new_key) {
            debug!(legacy = %key, key = %new_key, "Legacy record shadowed by existing key");
            continue;
        }
        migrated.insert(new_key.clone(), record.rekeyed(&new_key, &host));
        rewritten += 1;
    }

    debug!(rewritten, "Migrated legacy record keys");
    migrated
}

/// Product code a legacy key migrates to: the key itself for bare codes, the
/// code found in the URL for URL keys.
pub fn legacy_key_code(key: &str) -> Option<String> {
    if key.contains("://") {
        canonicalize(key).ok().as_deref().and_then(extract_product_code)
    } else {
        Some(key.trim().to_string()).filter(|c| !c.is_empty())
    }
}
