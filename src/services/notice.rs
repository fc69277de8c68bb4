use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 给用户的提示（toast）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// 提示通道：界面订阅后展示
#[derive(Debug, Clone)]
pub struct NoticeCenter {
    sender: broadcast::Sender<Notice>,
}

impl NoticeCenter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("Notice: {}", message);
        self.publish(Notice {
            level: NoticeLevel::Success,
            message,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("Error notice: {}", message);
        self.publish(Notice {
            level: NoticeLevel::Error,
            message,
        });
    }

    fn publish(&self, notice: Notice) {
        let _ = self.sender.send(notice);
    }
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}
