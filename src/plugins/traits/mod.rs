pub mod adapter;
pub mod notifier;

pub use adapter::{ItemFilters, SiteAdapter};
pub use notifier::{NotificationResult, NotifierPlugin};
