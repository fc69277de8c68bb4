use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// 便利函数，用于创建常见错误
impl ClientError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Authentication(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    /// 校验错误在发出网络请求之前产生，不会触碰缓存
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::ValidatorError(_))
    }

    /// 根据HTTP状态码和响应体构造错误
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = extract_error_message(body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        match status {
            StatusCode::UNAUTHORIZED => Self::Authentication(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            _ => Self::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// 给用户看的提示文本（toast）
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Authentication(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Api { message, .. } => message.clone(),
            Self::ValidatorError(e) => e
                .field_errors()
                .values()
                .flat_map(|errors| errors.iter())
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "输入内容不合法".to_string()),
            Self::Request(e) if e.is_timeout() => "请求超时，请稍后重试".to_string(),
            Self::Request(_) => "网络错误，请检查网络连接".to_string(),
            Self::Token(_) => "登录已过期，请重新登录".to_string(),
            Self::Serialization(_) | Self::Url(_) | Self::Realtime(_) | Self::Internal(_) => {
                "未知错误".to_string()
            }
        }
    }
}

/// 按 detail → message → error → 第一个字段错误 的顺序解析服务端错误信息
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for field in ["detail", "message", "error"] {
        match object.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(inner)) => {
                if let Some(first) = first_field_error(inner) {
                    return Some(first);
                }
            }
            _ => {}
        }
    }

    first_field_error(object)
}

fn first_field_error(object: &serde_json::Map<String, Value>) -> Option<String> {
    object.values().find_map(|v| match v {
        Value::Array(items) => items.first().and_then(|i| i.as_str()).map(str::to_string),
        _ => None,
    })
}
