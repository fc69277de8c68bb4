use serde::{Deserialize, Serialize};

/// 只带提示信息的通用响应，例如 `{"message": "post deleted"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// 带成功标记的响应，例如 `{"success": true, "message": "密码修改成功"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}
