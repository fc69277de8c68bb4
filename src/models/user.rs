use serde::{Deserialize, Serialize};
use validator::Validate;

use super::post::ImageUpload;

/// 帖子、评论、消息中内嵌的作者信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub get_avatar: String,
}

/// `GET /me/` 返回的当前用户资料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub mbti_result: Option<serde_json::Value>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub show_likes_to_others: Option<bool>,
}

impl Profile {
    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            get_avatar: self.avatar.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, message = "密码不能为空"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, max = 50, message = "用户名不能为空"))]
    pub name: String,
    #[validate(length(min = 8, message = "密码至少需要8个字符"))]
    pub password1: String,
    pub password2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<TokenResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendEmailCodeRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyEmailCodeRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, message = "验证码不能为空"))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailCodeResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub verified: Option<bool>,
}

/// 编辑资料，以 multipart 表单提交
#[derive(Debug, Clone, Validate)]
pub struct EditProfileRequest {
    #[validate(length(min = 1, max = 50, message = "用户名不能为空"))]
    pub name: String,
    pub bio: Option<String>,
    pub avatar: Option<ImageUpload>,
    pub show_likes_to_others: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditProfileResponse {
    #[serde(default)]
    pub message: String,
    pub user: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "请输入旧密码"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "新密码至少需要6个字符"))]
    pub new_password: String,
    pub confirm_password: String,
}

/// MBTI 性格测试结果，各维度得分缺省为 0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MbtiResult {
    pub personality_type: String,
    #[serde(default)]
    pub personality_category: String,
    #[serde(default)]
    pub introversion_score: u32,
    #[serde(default)]
    pub extroversion_score: u32,
    #[serde(default)]
    pub intuition_score: u32,
    #[serde(default)]
    pub sensing_score: u32,
    #[serde(default)]
    pub thinking_score: u32,
    #[serde(default)]
    pub feeling_score: u32,
    #[serde(default)]
    pub judging_score: u32,
    #[serde(default)]
    pub perceiving_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMbtiResponse {
    #[serde(default)]
    pub message: String,
    pub result: MbtiResult,
}
