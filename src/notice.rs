//! Transient user-facing messages.

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// How long a front-end should keep the notice visible.
    pub duration: Duration,
}

/// Fan-out of notices to every subscribed front-end.
#[derive(Clone)]
pub struct Notices {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

impl Notices {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Success, message.into(), Duration::from_millis(3000));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Info, message.into(), Duration::from_millis(3000));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Warning, message.into(), Duration::from_millis(5000));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Error, message.into(), Duration::from_millis(4000));
    }

    fn publish(&self, level: NoticeLevel, message: String, duration: Duration) {
        let notice = Notice {
            level,
            message,
            duration,
        };
        // nobody listening is fine: notices are fire-and-forget
        if let Err(broadcast::error::SendError(notice)) = self.sender.send(notice) {
            trace!(?notice, "notice dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notices() {
        let notices = Notices::new();
        let mut receiver = notices.subscribe();

        notices.warning("Muitas requisições");

        let notice = receiver.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Muitas requisições");
        assert_eq!(notice.duration, Duration::from_millis(5000));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notices = Notices::new();
        notices.success("Artista criado");
    }
}
