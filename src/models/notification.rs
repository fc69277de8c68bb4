use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub body: String,
    pub type_of_notification: NotificationType,
    #[serde(default)]
    pub post_id: Option<String>,
    pub created_for_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[serde(rename = "new_friendrequest")]
    NewFriendRequest,
    #[serde(rename = "accepted_friendrequest")]
    AcceptedFriendRequest,
    #[serde(rename = "rejected_friendrequest")]
    RejectedFriendRequest,
    PostLike,
    PostComment,
    CommentLike,
}

impl NotificationType {
    /// 通知类型对应的展示文本
    pub fn label(&self) -> &'static str {
        match self {
            NotificationType::NewFriendRequest => "新的好友请求",
            NotificationType::AcceptedFriendRequest => "好友请求已接受",
            NotificationType::RejectedFriendRequest => "好友请求被拒绝",
            NotificationType::PostLike => "帖子被点赞",
            NotificationType::PostComment => "帖子有新评论",
            NotificationType::CommentLike => "评论被点赞",
        }
    }

    pub fn targets_post(&self) -> bool {
        matches!(
            self,
            NotificationType::PostLike | NotificationType::PostComment | NotificationType::CommentLike
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadAllResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub count: u32,
}

impl ReadAllResponse {
    /// 批量已读后的提示文本
    pub fn summary(&self) -> String {
        if self.count > 0 {
            format!("已将 {} 条通知标记为已读", self.count)
        } else {
            "没有未读通知".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_on_the_wire() {
        let t: NotificationType = serde_json::from_str("\"new_friendrequest\"").unwrap();
        assert_eq!(t, NotificationType::NewFriendRequest);
        let t: NotificationType = serde_json::from_str("\"post_comment\"").unwrap();
        assert_eq!(t.label(), "帖子有新评论");
        assert!(t.targets_post());
        assert_eq!(
            serde_json::to_string(&NotificationType::RejectedFriendRequest).unwrap(),
            "\"rejected_friendrequest\""
        );
    }

    #[test]
    fn test_read_all_summary() {
        let none = ReadAllResponse { message: None, count: 0 };
        assert_eq!(none.summary(), "没有未读通知");
        let some = ReadAllResponse { message: None, count: 4 };
        assert_eq!(some.summary(), "已将 4 条通知标记为已读");
    }
}
