//! In-memory list of album events received from the backend.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    AlbumCreated,
    AlbumUpdated,
    AlbumDeleted,
}

/// One album event. `id` is the album's id; deletions carry no artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub artist_id: Option<i64>,
    pub message: String,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl FeedState {
    fn recount(&mut self) {
        self.unread_count = self.notifications.iter().filter(|n| !n.read).count();
    }
}

#[derive(Clone)]
pub struct NotificationFeed {
    sender: Arc<watch::Sender<FeedState>>,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFeed {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(FeedState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> FeedState {
        self.sender.borrow().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.sender.borrow().unread_count
    }

    /// Prepends a notification as unread.
    pub fn push(&self, mut notification: Notification) {
        notification.read = false;
        self.sender.send_modify(|state| {
            state.notifications.insert(0, notification);
            state.recount();
        });
    }

    /// Decodes a MESSAGE body and pushes it. Bodies that do not decode are dropped.
    pub fn push_json(&self, body: &str) -> bool {
        match serde_json::from_str::<Notification>(body) {
            Ok(notification) => {
                debug!(id = notification.id, kind = ?notification.kind, "notification received");
                self.push(notification);
                true
            }
            Err(e) => {
                warn!(error = %e, "dropping undecodable notification");
                false
            }
        }
    }

    /// Marks the newest unread notification carrying `id`. Several events of
    /// one album share its id, each needs its own call.
    pub fn mark_as_read(&self, id: i64) {
        self.sender.send_if_modified(|state| {
            let Some(notification) = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id && !n.read)
            else {
                return false;
            };
            notification.read = true;
            state.recount();
            true
        });
    }

    pub fn mark_all_as_read(&self) {
        self.sender.send_modify(|state| {
            state.notifications.iter_mut().for_each(|n| n.read = true);
            state.unread_count = 0;
        });
    }

    pub fn clear_all(&self) {
        self.sender.send_replace(FeedState::default());
    }
}
