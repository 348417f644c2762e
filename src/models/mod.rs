use std::collections::BTreeMap;

pub mod item;
pub mod observation;

// Re-exports for convenience
pub use item::*;
pub use observation::*;

/// Full persisted state: composite key to latest item record. Ordered so that
/// persisted output and digests are stable.
pub type RecordMap = BTreeMap<String, ItemRecord>;
