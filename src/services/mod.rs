/// Business logic services layer
mod delivery;
mod history;
mod prediction;
mod sweep;

pub use delivery::{EmailNotificationSender, NotificationSender};
pub use history::{SceneHistory, SceneHistoryPair, SceneHistorySource};
pub use prediction::{predict, MIN_SAMPLES};
pub use sweep::{NotificationLedger, NotificationSweeper, SweepConfig, TargetDirectory};
