use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::models::user::AuthorSummary;

/// 会话列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub users: Vec<AuthorSummary>,
    #[serde(default)]
    pub modified_at_formatted: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// 会话中除自己以外的另一方
    pub fn peer(&self, me: &str) -> Option<&AuthorSummary> {
        self.users.iter().find(|u| u.id != me)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(alias = "message")]
    pub body: String,
    pub created_by: AuthorSummary,
    #[serde(default)]
    pub sent_to: Option<AuthorSummary>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at_formatted: String,
}

impl ChatMessage {
    pub fn sender_id(&self) -> &str {
        &self.created_by.id
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.created_by.id == user_id
    }
}

/// `GET /chat/:id/` 的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub users: Vec<AuthorSummary>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "消息不能为空"))]
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingStatus {
    Typing,
    Idle,
}

/// 实时通道上传递的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RealtimeEvent {
    /// 对方输入状态
    #[serde(rename_all = "camelCase")]
    AwarenessUpdate {
        user_id: String,
        conversation_id: String,
        status: TypingStatus,
    },
    /// 新消息
    #[serde(rename_all = "camelCase")]
    Message {
        conversation_id: String,
        sender_id: String,
        receiver_id: Option<String>,
        body: String,
    },
}
