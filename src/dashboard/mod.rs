pub mod hub;
pub mod metrics;
pub mod notifications;
pub mod protocol;

pub use hub::{BroadcastHub, ChannelObserver, DeliveryError, Observer, ObserverId};
pub use metrics::BuildMetrics;
pub use notifications::{Notification, NotificationCenter, NotificationDraft, NotificationKind};
pub use protocol::{ClientMessage, ServerMessage};
