use crate::constants::{DEFAULT_NOTIFICATION_TIMEOUT_MS, NOTIFICATION_CAPACITY};
use crate::dashboard::hub::BroadcastHub;
use crate::ring::BoundedQueue;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    fn default_title(self) -> &'static str {
        match self {
            Self::Info => "Information",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Zero keeps the notification until it is dismissed
    pub auto_hide_after_ms: u64,
}

/// A notification before it is queued
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub auto_hide_after_ms: Option<u64>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: Some(title.into()),
            message: message.into(),
            auto_hide_after_ms: None,
        }
    }

    pub fn auto_hide_after(mut self, ms: u64) -> Self {
        self.auto_hide_after_ms = Some(ms);
        self
    }

    pub fn sticky(self) -> Self {
        self.auto_hide_after(0)
    }
}

/// Bounded queue of recent notifications, pushed to observers on every change
pub struct NotificationCenter {
    queue: Mutex<BoundedQueue<Notification>>,
    hub: Arc<BroadcastHub>,
}

impl NotificationCenter {
    pub fn new(hub: Arc<BroadcastHub>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(BoundedQueue::new(NOTIFICATION_CAPACITY)),
            hub,
        })
    }

    /// Queue a notification, evicting the oldest when full, and broadcast the list.
    /// Non-sticky notifications are removed again after their timeout.
    pub fn push(self: &Arc<Self>, draft: NotificationDraft) -> String {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind: draft.kind,
            title: draft
                .title
                .unwrap_or_else(|| draft.kind.default_title().to_string()),
            message: draft.message,
            timestamp: Utc::now(),
            auto_hide_after_ms: draft
                .auto_hide_after_ms
                .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT_MS),
        };
        let id = notification.id.clone();
        let hide_after = notification.auto_hide_after_ms;
        tracing::debug!(id = %id, title = %notification.title, "Notification queued");

        {
            let mut queue = self.queue.lock();
            queue.push(notification);
            self.hub.broadcast_notifications(queue.to_vec());
        }

        if hide_after > 0 {
            self.schedule_hide(id.clone(), Duration::from_millis(hide_after));
        }
        id
    }

    pub fn dismiss(&self, id: &str) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|n| n.id != id);
        let removed = queue.len() != before;
        if removed {
            self.hub.broadcast_notifications(queue.to_vec());
        }
        removed
    }

    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        queue.clear();
        self.hub.broadcast_notifications(Vec::new());
    }

    pub fn list(&self) -> Vec<Notification> {
        self.queue.lock().to_vec()
    }

    fn schedule_hide(self: &Arc<Self>, id: String, after: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let center: Weak<Self> = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(center) = center.upgrade() {
                center.dismiss(&id);
            }
        });
    }
}
