use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
}

impl NotifyEvent {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Error,
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Success,
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level: NotificationLevel::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
}

/// Shared queue of dismissible notifications. Clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    queue: Arc<Mutex<Arc<Vec<Notification>>>>,
}

impl NotificationCenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, event: NotifyEvent) -> String {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            title: event.title,
            message: event.message,
            level: event.level,
        };
        debug!(
            id = %notification.id,
            level = notification.level.as_str(),
            title = %notification.title,
            "notification raised"
        );
        let id = notification.id.clone();
        let mut queue = self.lock();
        let mut next = Vec::clone(&queue);
        next.push(notification);
        *queue = Arc::new(next);
        id
    }

    pub fn dismiss(&self, id: &str) -> bool {
        let mut queue = self.lock();
        if !queue.iter().any(|notification| notification.id == id) {
            return false;
        }
        let next = queue
            .iter()
            .filter(|notification| notification.id != id)
            .cloned()
            .collect();
        *queue = Arc::new(next);
        true
    }

    pub fn clear(&self) {
        *self.lock() = Arc::new(Vec::new());
    }

    /// Current queue, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Notification>> {
        Arc::clone(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Notification>>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
