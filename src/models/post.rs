use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::models::comment::Comment;
use crate::models::like::{LikeState, Likeable};
use crate::models::user::AuthorSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub friends_count: u32,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub get_avatar: String,
    #[serde(default)]
    pub bio: Option<String>,
}

impl PostAuthor {
    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            get_avatar: self.get_avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub get_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default, alias = "islike")]
    pub is_liked: bool,
    pub created_by: PostAuthor,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at_formatted: String,
    /// 附件按上传顺序排列
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// 仅详情接口返回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl Likeable for Post {
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

/// `GET /posts/:id/` 的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
}

/// 用户主页帖子列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePosts {
    pub posts: Vec<Post>,
    pub user: PostAuthor,
    #[serde(default)]
    pub can_send_friendship_request: bool,
    #[serde(default)]
    pub is_friend: bool,
}

/// 待上传的图片附件
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 10000, message = "帖子内容不能为空"))]
    pub body: String,
    pub is_private: bool,
    pub attachments: Vec<ImageUpload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportPostRequest {
    #[validate(length(min = 1, max = 500, message = "请填写举报原因"))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostReport {
    pub id: String,
    pub post: Post,
    pub reported_by: AuthorSummary,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at_formatted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPostResponse {
    pub message: String,
    pub report: PostReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub id: i64,
    pub hashtag: String,
    pub occurences: i64,
}
