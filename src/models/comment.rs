use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::models::like::{LikeState, Likeable};
use crate::models::user::AuthorSummary;

/// 乐观插入的评论使用的时间标签
pub const JUST_NOW_LABEL: &str = "刚刚";

/// 临时评论ID前缀，服务端返回后会被替换
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub created_by: AuthorSummary,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default, rename = "islike")]
    pub is_liked: bool,
    #[serde(default)]
    pub created_at_formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// 构造一条尚未被服务端确认的占位评论
    pub fn placeholder(body: &str, author: AuthorSummary) -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()),
            body: body.to_string(),
            created_by: author,
            likes_count: 0,
            is_liked: false,
            created_at_formatted: JUST_NOW_LABEL.to_string(),
            created_at: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

impl Likeable for Comment {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn like_state(&self) -> LikeState {
        LikeState::new(self.is_liked, self.likes_count)
    }

    fn set_like_state(&mut self, state: LikeState) {
        self.is_liked = state.liked;
        self.likes_count = state.count;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10000, message = "评论内容不能为空"))]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_for_liked_flag() {
        let comment: Comment = serde_json::from_str(
            r#"{"id":"c1","body":"hi","created_by":{"id":"u1","name":"A","get_avatar":""},"likes_count":2,"islike":true,"created_at_formatted":"1 小时"}"#,
        )
        .unwrap();
        assert!(comment.is_liked);
        assert_eq!(comment.like_state(), LikeState::new(true, 2));

        let value = serde_json::to_value(&comment).unwrap();
        assert_eq!(value["islike"], true);
    }

    #[test]
    fn test_placeholder() {
        let author = AuthorSummary {
            id: "u1".to_string(),
            name: "A".to_string(),
            get_avatar: String::new(),
        };
        let comment = Comment::placeholder("hello", author);
        assert!(comment.is_placeholder());
        assert_eq!(comment.created_at_formatted, JUST_NOW_LABEL);
        assert_eq!(comment.likes_count, 0);
    }
}
