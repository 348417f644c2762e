pub mod digest;
pub mod migration;
pub mod reconciler;
pub mod tracking;

pub use digest::DigestMessage;
pub use migration::migrate_legacy_keys;
pub use reconciler::{Reconciliation, Reconciler, TickOutcome};
