// Notifier plugin implementations
pub mod discord;
pub mod email;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
