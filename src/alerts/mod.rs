/// Alert manager, cooldown gate and notifier backends
pub mod alert_manager;
pub mod cooldown;
pub mod notifier;

pub use alert_manager::{AlertManager, DeliveryStats};
pub use cooldown::Cooldown;
pub use notifier::{LogNotifier, Notifier, SlackNotifier, DEFAULT_NOTIFY_TIMEOUT};
